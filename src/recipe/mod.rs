// src/recipe/mod.rs

//! Recipes inside a session
//!
//! A recipe is the `package.py` of one package in the session's Spack
//! repository:
//!
//! ```text
//! <session>/spack-repo/packages/<package>/package.py
//! ```
//!
//! Everything here reads from disk on every call. Nothing about a recipe is
//! cached, so a write through any path is visible to the next read.
//!
//! Recipes come from three places:
//! - **Upstream copy**: [`transform::RecipeTransformer::copy_from_upstream`]
//! - **Templates**: blank skeletons and URL-seeded skeletons
//! - **Direct writes**: [`RecipeBook::write`]

pub mod naming;
pub mod rewrite;
pub mod source_url;
pub mod template;
pub mod transform;
pub mod upstream;
pub mod validate;

pub use naming::{NamingTable, class_name_for};
pub use rewrite::{RewriteRule, rewrite_recipe};
pub use source_url::{InferredSource, SourceKind, infer_source};
pub use template::{BaseClass, RecipeTemplate};
pub use transform::{CopyResult, FailedFile, GitUpdate, RecipeTransformer};
pub use upstream::{Upstream, UpstreamConfig};
pub use validate::{Diagnostic, Severity, ValidationReport, validate_recipe};

use crate::workspace::{REPO_DIR, guard};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Recipe file name inside a package directory
pub const RECIPE_FILE: &str = "package.py";

/// A recipe and its content
#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub package_name: String,
    pub content: String,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    /// Path relative to the session root
    pub file_path: PathBuf,
}

/// Recipe metadata without content
#[derive(Debug, Clone, Serialize)]
pub struct RecipeInfo {
    pub package_name: String,
    pub file_path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

/// Check a package name before it becomes a path component
///
/// Spack package names are lowercase alphanumerics joined by `-` or `_`.
pub fn validate_package_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidPackageName(name.to_string()))
    }
}

/// Package directory relative to the session root
pub fn package_relpath(package: &str) -> PathBuf {
    Path::new(REPO_DIR).join("packages").join(package)
}

/// Recipe file relative to the session root
pub fn recipe_relpath(package: &str) -> PathBuf {
    package_relpath(package).join(RECIPE_FILE)
}

/// Recipe access for one session directory
#[derive(Debug, Clone)]
pub struct RecipeBook {
    root: PathBuf,
}

impl RecipeBook {
    pub fn new<P: Into<PathBuf>>(session_root: P) -> Self {
        Self {
            root: session_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute, confined package directory
    pub fn package_dir(&self, package: &str) -> Result<PathBuf> {
        validate_package_name(package)?;
        guard::confine(&self.root, &package_relpath(package))
    }

    /// Absolute, confined recipe path
    pub fn recipe_path(&self, package: &str) -> Result<PathBuf> {
        validate_package_name(package)?;
        guard::confine(&self.root, &recipe_relpath(package))
    }

    pub fn exists(&self, package: &str) -> Result<bool> {
        Ok(self.recipe_path(package)?.is_file())
    }

    /// All recipes in the session, sorted by package name
    pub fn list(&self) -> Result<Vec<RecipeInfo>> {
        let packages = guard::confine(&self.root, &Path::new(REPO_DIR).join("packages"))?;
        if !packages.is_dir() {
            return Ok(Vec::new());
        }

        let mut infos = Vec::new();
        for entry in fs::read_dir(&packages)?.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_package_name(&name).is_err() {
                continue;
            }
            let info = self.info(&name)?;
            if info.exists {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.package_name.cmp(&b.package_name));
        Ok(infos)
    }

    pub fn read(&self, package: &str) -> Result<Recipe> {
        let path = self.recipe_path(package)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("recipe {}", package)));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = fs::metadata(&path)?;

        Ok(Recipe {
            package_name: package.to_string(),
            content,
            size: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            file_path: recipe_relpath(package),
        })
    }

    /// Replace the recipe content, creating the package directory if needed
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// a concurrent reader never sees a partial recipe.
    pub fn write(&self, package: &str, content: &str) -> Result<Recipe> {
        let path = self.recipe_path(package)?;
        let dir = path
            .parent()
            .ok_or_else(|| Error::PathEscape(path.display().to_string()))?;
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        debug!(package, bytes = content.len(), "Recipe written");
        self.read(package)
    }

    /// Remove the package directory with the recipe and its patches
    pub fn delete(&self, package: &str) -> Result<()> {
        let dir = self.package_dir(package)?;
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("recipe {}", package)));
        }
        fs::remove_dir_all(&dir)?;
        debug!(package, "Recipe deleted");
        Ok(())
    }

    pub fn info(&self, package: &str) -> Result<RecipeInfo> {
        let path = self.recipe_path(package)?;
        let metadata = fs::metadata(&path).ok().filter(|m| m.is_file());

        Ok(RecipeInfo {
            package_name: package.to_string(),
            file_path: recipe_relpath(package),
            exists: metadata.is_some(),
            size: metadata.as_ref().map(|m| m.len()),
            modified_at: metadata
                .and_then(|m| m.modified().ok())
                .map(DateTime::<Utc>::from),
        })
    }
}
