// src/facade.rs

//! Session facade
//!
//! [`Workbench`] is the one entry point the outside world talks to. It checks
//! that a session exists before touching anything in it, records activity
//! for idle accounting, and hands recipe and build work to the components.

use crate::catalog::{self, PackageInfo, SearchResult, UninstallResult};
use crate::config::RuntimeConfig;
use crate::executor::{self, Executor, StreamEvent};
use crate::recipe::naming::NamingAudit;
use crate::recipe::{
    CopyResult, GitUpdate, Recipe, RecipeBook, RecipeInfo, RecipeTransformer, Upstream,
    ValidationReport, validate_recipe,
};
use crate::workspace::{Session, SessionFiles, StoreConfig, WorkspaceStore};
use crate::{Error, Result};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Event stream of one install or validate invocation
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Session snapshot with its recipe count
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    #[serde(flatten)]
    pub session: Session,
    pub recipe_count: usize,
}

/// What `create_recipe` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateAction {
    /// The session already had the recipe
    Exists,
    /// Copied from upstream
    Copied,
    /// Generated from the blank template
    Created,
}

/// Result of `create_recipe`
#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub action: CreateAction,
    pub recipe: Recipe,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copy: Option<CopyResult>,
}

/// The session workbench
pub struct Workbench {
    store: Arc<WorkspaceStore>,
    transformer: RecipeTransformer,
    executor: Executor,
}

impl Workbench {
    pub fn new(store: Arc<WorkspaceStore>, upstream: Arc<Upstream>, executor: Executor) -> Self {
        Self {
            store,
            transformer: RecipeTransformer::new(upstream),
            executor,
        }
    }

    /// Build every component from runtime settings
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let store = WorkspaceStore::new(config.store.clone())?;
        let upstream = Upstream::new(config.upstream.clone());
        Ok(Self::new(
            Arc::new(store),
            Arc::new(upstream),
            Executor::new(config.executor.clone()),
        ))
    }

    /// Open a store for `store_config`, for callers assembling parts by hand
    pub fn open_store(store_config: StoreConfig) -> Result<Arc<WorkspaceStore>> {
        Ok(Arc::new(WorkspaceStore::new(store_config)?))
    }

    pub fn store(&self) -> &Arc<WorkspaceStore> {
        &self.store
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Check the naming table against the upstream tree
    pub fn audit_naming(&self) -> Option<NamingAudit> {
        let upstream = self.transformer.upstream();
        let packages = upstream.config().packages_dir();
        match upstream.naming().audit(&packages) {
            Ok(audit) => Some(audit),
            Err(e) => {
                warn!("Cannot audit naming table against {}: {}", packages.display(), e);
                None
            }
        }
    }

    fn book(&self, session_id: &str) -> Result<RecipeBook> {
        let root = self.store.resolve(session_id)?;
        self.store.touch(session_id)?;
        Ok(RecipeBook::new(root))
    }

    // Sessions

    pub fn create_session(&self, namespace: Option<&str>) -> Result<Session> {
        self.store.create(namespace)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.store.delete(session_id)
    }

    pub fn session_info(&self, session_id: &str) -> Result<SessionInfo> {
        let session = self.store.get(session_id)?;
        let recipe_count = RecipeBook::new(&session.root).list()?.len();
        Ok(SessionInfo {
            session,
            recipe_count,
        })
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.store.list()
    }

    pub fn session_files(&self, session_id: &str) -> Result<SessionFiles> {
        self.store.touch(session_id)?;
        self.store.list_files(session_id)
    }

    // Recipes

    pub fn list_recipes(&self, session_id: &str) -> Result<Vec<RecipeInfo>> {
        self.book(session_id)?.list()
    }

    pub fn read_recipe(&self, session_id: &str, package: &str) -> Result<Recipe> {
        self.book(session_id)?.read(package)
    }

    /// Write recipe content; content that does not parse is refused
    pub fn write_recipe(&self, session_id: &str, package: &str, content: &str) -> Result<Recipe> {
        let book = self.book(session_id)?;
        let report = validate_recipe(content, package);
        if !report.syntax_valid {
            let detail = report
                .errors()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::InvalidRecipe(detail));
        }

        let recipe = book.write(package, content)?;
        info!(session_id, package, size = recipe.size, "Recipe saved");
        Ok(recipe)
    }

    pub fn delete_recipe(&self, session_id: &str, package: &str) -> Result<()> {
        self.book(session_id)?.delete(package)?;
        info!(session_id, package, "Recipe removed");
        Ok(())
    }

    pub fn recipe_info(&self, session_id: &str, package: &str) -> Result<RecipeInfo> {
        self.book(session_id)?.info(package)
    }

    /// Check `content`, or the stored recipe when none is given
    pub fn validate_recipe(
        &self,
        session_id: &str,
        package: &str,
        content: Option<&str>,
    ) -> Result<ValidationReport> {
        let book = self.book(session_id)?;
        let report = match content {
            Some(content) => {
                crate::recipe::validate_package_name(package)?;
                validate_recipe(content, package)
            }
            None => validate_recipe(&book.read(package)?.content, package),
        };
        debug!(session_id, package, valid = report.is_valid, "Recipe validated");
        Ok(report)
    }

    pub async fn copy_package(&self, session_id: &str, package: &str) -> Result<CopyResult> {
        let book = self.book(session_id)?;
        self.transformer.copy_from_upstream(book.root(), package).await
    }

    /// Keep an existing recipe, else copy from upstream, else start blank
    pub async fn create_recipe(&self, session_id: &str, package: &str) -> Result<CreateOutcome> {
        let book = self.book(session_id)?;
        if book.exists(package)? {
            return Ok(CreateOutcome {
                action: CreateAction::Exists,
                recipe: book.read(package)?,
                copy: None,
            });
        }

        match self.transformer.copy_from_upstream(book.root(), package).await {
            Ok(copy) => Ok(CreateOutcome {
                action: CreateAction::Copied,
                recipe: book.read(package)?,
                copy: Some(copy),
            }),
            Err(Error::PackageNotFound { .. }) => {
                debug!(session_id, package, "Not upstream, using blank template");
                Ok(CreateOutcome {
                    action: CreateAction::Created,
                    recipe: self.transformer.create_blank(book.root(), package)?,
                    copy: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub fn create_from_url(&self, session_id: &str, url: &str) -> Result<Recipe> {
        let book = self.book(session_id)?;
        self.transformer.create_from_url(book.root(), url)
    }

    pub async fn update_from_git(
        &self,
        session_id: &str,
        package: &str,
        repo_url: &str,
    ) -> Result<GitUpdate> {
        let book = self.book(session_id)?;
        self.transformer
            .update_from_git(book.root(), package, repo_url)
            .await
    }

    // Builds

    /// Stream `spack install` for a recipe in the session
    ///
    /// Fails up front with `SessionBusy` while another invocation runs.
    pub fn install_stream(
        &self,
        session_id: &str,
        package: &str,
        version: Option<&str>,
    ) -> Result<EventStream> {
        let session = self.store.get(session_id)?;
        let spec = executor::install_command(self.executor.config(), &session, package, version)?;
        self.start(session_id, spec)
    }

    /// Stream a validation run for an installed package
    pub fn validate_stream(
        &self,
        session_id: &str,
        package: &str,
        install_digest: Option<&str>,
        custom_script: Option<&str>,
    ) -> Result<EventStream> {
        let session = self.store.get(session_id)?;
        let lock = self.store.try_lock(session_id)?;
        let spec = executor::validate_command(
            self.executor.config(),
            &session,
            package,
            install_digest,
            custom_script,
        )?;
        Ok(self.run_locked(session_id, spec, lock))
    }

    // Catalog

    /// Package names matching `query`, at most `limit` of them
    pub async fn search_packages(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<SearchResult> {
        let session = self.store.get(session_id)?;
        self.store.touch(session_id)?;
        let spec = executor::list_command(self.executor.config(), &session, query)?;

        let output = self.executor.run_captured(&spec).await?;
        if !output.success {
            return Err(output.into_error(&spec));
        }

        let mut packages = catalog::parse_list(&output.stdout);
        let total = packages.len();
        packages.truncate(limit);
        debug!(session_id, query, total, "Package search");
        Ok(SearchResult {
            query: query.trim().to_string(),
            total,
            packages,
        })
    }

    /// Structured `spack info` for a package
    pub async fn package_info(
        &self,
        session_id: &str,
        package: &str,
        version: Option<&str>,
    ) -> Result<PackageInfo> {
        let session = self.store.get(session_id)?;
        self.store.touch(session_id)?;
        let spec = executor::info_command(self.executor.config(), &session, package, version)?;

        let output = self.executor.run_captured(&spec).await?;
        if !output.success {
            let diagnostic = output.diagnostic(3);
            let lowered = diagnostic.to_lowercase();
            if lowered.contains("not found") || lowered.contains("unknown package") {
                return Err(Error::NotFound(format!("package {}", package)));
            }
            return Err(output.into_error(&spec));
        }
        Ok(catalog::parse_info(package, version, &output.stdout))
    }

    /// Remove an installed package
    ///
    /// Holds the session lock for the duration, so it cannot overlap an
    /// install stream. A tool failure is reported in the result, not raised.
    pub async fn uninstall_package(
        &self,
        session_id: &str,
        package: &str,
        version: Option<&str>,
        force: bool,
    ) -> Result<UninstallResult> {
        let session = self.store.get(session_id)?;
        let spec =
            executor::uninstall_command(self.executor.config(), &session, package, version, force)?;
        let lock = self.store.try_lock(session_id)?;
        self.store.touch(session_id)?;

        let target = match version {
            Some(version) => format!("{}@{}", package, version),
            None => package.to_string(),
        };
        let output = self.executor.run_captured(&spec).await;
        drop(lock);
        let output = output?;

        let result = if output.success {
            info!(session_id, spec = %target, force, "Package uninstalled");
            UninstallResult {
                success: true,
                message: format!("Successfully uninstalled {}", target),
                spec: target,
                force,
                output: None,
            }
        } else {
            warn!(session_id, spec = %target, exit_code = ?output.exit_code, "Uninstall failed");
            UninstallResult {
                success: false,
                message: format!("Failed to uninstall {}", target),
                spec: target,
                force,
                output: Some(output.diagnostic(20)),
            }
        };
        Ok(result)
    }

    fn start(&self, session_id: &str, spec: executor::CommandSpec) -> Result<EventStream> {
        let lock = self.store.try_lock(session_id)?;
        Ok(self.run_locked(session_id, spec, lock))
    }

    fn run_locked(
        &self,
        session_id: &str,
        spec: executor::CommandSpec,
        lock: crate::workspace::SessionLock,
    ) -> EventStream {
        let _ = self.store.touch(session_id);
        let store = self.store.clone();
        let id = session_id.to_string();

        self.executor
            .spawn(spec, lock)
            .inspect(move |event| {
                if event.is_complete() {
                    let _ = store.touch(&id);
                }
            })
            .boxed()
    }
}
