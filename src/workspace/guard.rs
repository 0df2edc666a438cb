// src/workspace/guard.rs

//! Path confinement for session-relative requests
//!
//! Every path a caller names is resolved against its session root. The
//! request is normalized lexically first, then the deepest existing ancestor
//! is canonicalized so symlinks that point outside the root are caught too.

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Resolve `requested` under `root`, rejecting anything that escapes it
///
/// `requested` must be relative. Components that do not exist yet are
/// appended to the canonical ancestor unchanged, so the result is usable for
/// creating new files.
pub fn confine(root: &Path, requested: &Path) -> Result<PathBuf> {
    let relative = normalize(requested)?;

    let canonical_root = root
        .canonicalize()
        .map_err(|e| Error::NotFound(format!("session root {} ({})", root.display(), e)))?;

    let joined = canonical_root.join(&relative);

    // Walk up to the deepest ancestor that exists on disk
    let mut existing = joined.as_path();
    let mut missing = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    // A dangling symlink cannot be proven to stay inside the root
    let mut resolved = existing
        .canonicalize()
        .map_err(|_| Error::PathEscape(requested.display().to_string()))?;
    if !resolved.starts_with(&canonical_root) {
        return Err(Error::PathEscape(requested.display().to_string()));
    }

    for name in missing.into_iter().rev() {
        resolved.push(name);
    }

    Ok(resolved)
}

/// Lexically normalize a relative path, failing on escapes
fn normalize(requested: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in requested.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Error::PathEscape(requested.display().to_string()));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathEscape(requested.display().to_string()));
            }
        }
    }

    Ok(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plain_relative_path() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("spack-repo/packages")).unwrap();

        let resolved = confine(temp_dir.path(), Path::new("spack-repo/packages/zlib/package.py"))
            .unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        assert_eq!(resolved, root.join("spack-repo/packages/zlib/package.py"));
    }

    #[test]
    fn test_inner_parent_dir_is_allowed() {
        let temp_dir = TempDir::new().unwrap();
        let resolved = confine(temp_dir.path(), Path::new("a/../b")).unwrap();
        assert_eq!(resolved, temp_dir.path().canonicalize().unwrap().join("b"));
    }

    #[test]
    fn test_traversal_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = confine(temp_dir.path(), Path::new("../other/package.py")).unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));

        let err = confine(temp_dir.path(), Path::new("a/../../x")).unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn test_absolute_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let err = confine(temp_dir.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[test]
    fn test_symlink_out_of_root_rejected() {
        let outside = TempDir::new().unwrap();
        let temp_dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("link")).unwrap();

        let err = confine(temp_dir.path(), Path::new("link/secret.txt")).unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }
}
