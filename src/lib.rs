// src/lib.rs

//! Scullery
//!
//! Session-scoped workbench for authoring Spack package recipes.
//!
//! # Architecture
//!
//! - Workspace store: one isolated directory per session, holding a Spack
//!   recipe repository and its configuration scope
//! - Recipe transformer: copies recipes from a pinned upstream checkout and
//!   rewrites them for standalone use, or generates new ones from templates
//! - Streaming executor: runs `spack` and forwards its output line by line
//! - Catalog: `spack list`, `info` and `uninstall` in a session's scope
//! - Workbench: the facade tying these together, served over HTTP

pub mod catalog;
pub mod config;
mod error;
pub mod executor;
pub mod facade;
pub mod recipe;
pub mod workspace;

#[cfg(feature = "server")]
pub mod server;

pub use catalog::{PackageInfo, SearchResult, UninstallResult};
pub use config::{RuntimeConfig, SculleryConfig};
pub use error::{Error, Result};
pub use executor::{EventKind, Executor, ExecutorConfig, StreamEvent};
pub use facade::{CreateAction, CreateOutcome, EventStream, SessionInfo, Workbench};
pub use recipe::{Recipe, RecipeBook, RecipeInfo, RecipeTransformer, Upstream, UpstreamConfig};
pub use workspace::{Session, SessionFiles, StoreConfig, WorkspaceStore};
