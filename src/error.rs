// src/error.rs

//! Error types for the scullery workbench
//!
//! Every component returns [`Error`]; the HTTP layer maps each variant to a
//! problem document via [`Error::kind`].

use thiserror::Error;

/// Errors produced by the workspace store, recipe transformer and executor
#[derive(Error, Debug)]
pub enum Error {
    /// Session or recipe absent
    #[error("{0} not found")]
    NotFound(String),

    /// Workspace creation failed
    #[error("Failed to allocate workspace: {0}")]
    AllocationError(String),

    /// Upstream checkout to the pinned revision failed
    #[error("Failed to pin upstream to {revision}: {reason}")]
    PinningError { revision: String, reason: String },

    /// Package has no definition in the upstream tree
    #[error("Package '{package}' not found upstream (tried: {})", tried.join(", "))]
    PackageNotFound { package: String, tried: Vec<String> },

    /// URL does not match a recognized archive or hosting pattern
    #[error("Unsupported archive URL: {0}")]
    UnsupportedUrl(String),

    /// Another invocation holds the session lock
    #[error("Session {0} is busy")]
    SessionBusy(String),

    /// External process could not be started
    #[error("Failed to spawn '{program}': {reason}")]
    SpawnError { program: String, reason: String },

    /// Build tool ran but reported failure
    #[error("'{command}' failed: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// External process exceeded its time budget
    #[error("Timed out after {0}s")]
    TimeoutError(u64),

    /// Requested path resolves outside the session root
    #[error("Path escapes session root: {0}")]
    PathEscape(String),

    /// Package name cannot be used as a recipe directory
    #[error("Invalid package name '{0}'")]
    InvalidPackageName(String),

    /// Recipe content rejected by local validation
    #[error("Invalid recipe: {0}")]
    InvalidRecipe(String),

    /// Malformed caller input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Git command failed
    #[error("Git error: {0}")]
    GitError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error with context
    #[error("I/O error: {0}")]
    IoError(String),

    /// Raw I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Short machine-readable kind, used in problem document type URIs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AllocationError(_) => "allocation",
            Self::PinningError { .. } => "pinning",
            Self::PackageNotFound { .. } => "package_not_found",
            Self::UnsupportedUrl(_) => "unsupported_url",
            Self::SessionBusy(_) => "session_busy",
            Self::SpawnError { .. } => "spawn",
            Self::CommandFailed { .. } => "command_failed",
            Self::TimeoutError(_) => "timeout",
            Self::PathEscape(_) => "path_escape",
            Self::InvalidPackageName(_) => "invalid_package_name",
            Self::InvalidRecipe(_) => "invalid_recipe",
            Self::InvalidRequest(_) => "invalid_request",
            Self::GitError(_) => "git",
            Self::ConfigError(_) => "config",
            Self::IoError(_) | Self::Io(_) => "io",
        }
    }
}

/// Result type for scullery operations
pub type Result<T> = std::result::Result<T, Error>;
