// src/recipe/transform.rs

//! Recipe creation: upstream copies, templates and git sources
//!
//! Every operation writes into the session's own repository. The upstream
//! checkout is only ever read, and only while pinned.

use crate::recipe::rewrite::{RewriteRule, rewrite_recipe};
use crate::recipe::source_url::infer_source;
use crate::recipe::template::{MAINTAINERS_MARKER, RecipeTemplate, VERSIONS_MARKER};
use crate::recipe::upstream::{Upstream, UpstreamPackage, run_git};
use crate::recipe::{
    RECIPE_FILE, Recipe, RecipeBook, package_relpath, recipe_relpath, validate_package_name,
};
use crate::workspace::guard;
use crate::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PATCH_EXTENSIONS: &[&str] = &["patch", "diff"];

/// A file that could not be copied
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: PathBuf,
    pub reason: String,
}

/// Outcome of copying one package from upstream
#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub success: bool,
    pub package_name: String,
    /// Directory name in the upstream tree
    pub upstream_name: String,
    /// Commit the copy was taken from
    pub upstream_revision: String,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Recipe path relative to the session root
    pub recipe_path: PathBuf,
    /// Every file that landed, relative to the package directory
    pub copied_files: Vec<PathBuf>,
    pub patch_files: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
    pub rewrites_applied: Vec<RewriteRule>,
    pub message: String,
}

/// Outcome of pointing a recipe at a git repository
#[derive(Debug, Clone, Serialize)]
pub struct GitUpdate {
    pub package_name: String,
    pub repository_url: String,
    pub commit_hash: String,
    pub commit_date: String,
    /// Version name added to the recipe
    pub version: String,
    pub recipe: Recipe,
}

/// Creates recipes in session repositories
pub struct RecipeTransformer {
    upstream: Arc<Upstream>,
}

impl RecipeTransformer {
    pub fn new(upstream: Arc<Upstream>) -> Self {
        Self { upstream }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Copy a package from the pinned upstream tree and rewrite its recipe
    ///
    /// Replaces any earlier copy of the package in the session. A file that
    /// fails to copy does not stop the others; the result lists it.
    pub async fn copy_from_upstream(&self, session_root: &Path, package: &str) -> Result<CopyResult> {
        validate_package_name(package)?;
        let destination = RecipeBook::new(session_root).package_dir(package)?;

        let pinned = self.upstream.pinned().await?;
        let source = pinned.locate(package)?;
        let revision = pinned.revision.clone();

        info!(
            package,
            upstream = %source.directory_name,
            revision = %revision,
            "Copying package from upstream"
        );

        // The pin stays held until the files have landed
        let session_root = session_root.to_path_buf();
        let package = package.to_string();
        let result = tokio::task::spawn_blocking(move || {
            copy_package_tree(&session_root, &package, source, destination, revision)
        })
        .await
        .map_err(|e| Error::IoError(format!("copy task failed: {}", e)))?;
        drop(pinned);

        result
    }

    /// Write a blank template, or return the existing recipe untouched
    pub fn create_blank(&self, session_root: &Path, package: &str) -> Result<Recipe> {
        let book = RecipeBook::new(session_root);
        if book.exists(package)? {
            debug!(package, "Recipe exists, not overwriting with template");
            return book.read(package);
        }

        let content = RecipeTemplate::blank(package).render();
        let recipe = book.write(package, &content)?;
        info!(package, "Created blank recipe");
        Ok(recipe)
    }

    /// Write a recipe seeded from a download URL
    pub fn create_from_url(&self, session_root: &Path, url: &str) -> Result<Recipe> {
        let source = infer_source(url)?;
        let book = RecipeBook::new(session_root);
        if book.exists(&source.package_name)? {
            return Err(Error::InvalidRequest(format!(
                "recipe {} already exists",
                source.package_name
            )));
        }

        let content = RecipeTemplate::from_source(&source).render();
        let recipe = book.write(&source.package_name, &content)?;
        info!(
            package = %source.package_name,
            version = %source.version,
            kind = ?source.kind,
            "Created recipe from URL"
        );
        Ok(recipe)
    }

    /// Point a recipe at the HEAD commit of a git repository
    ///
    /// The repository is cloned into a scratch directory inside the session,
    /// removed again when done. A missing recipe starts from the blank
    /// template.
    pub async fn update_from_git(
        &self,
        session_root: &Path,
        package: &str,
        repo_url: &str,
    ) -> Result<GitUpdate> {
        validate_package_name(package)?;
        let repo_url = repo_url.trim();
        if repo_url.is_empty() || repo_url.starts_with('-') {
            return Err(Error::InvalidRequest(format!(
                "'{}' is not a repository URL",
                repo_url
            )));
        }

        let config = self.upstream.config();
        let scratch = tempfile::Builder::new()
            .prefix(".git-clone-")
            .tempdir_in(session_root)?;
        let checkout = scratch.path().join("repo");
        let checkout_arg = checkout.to_string_lossy().into_owned();

        info!(package, repository = repo_url, "Cloning for commit info");
        run_git(
            &config.git,
            &["clone", "--quiet", "--depth", "1", "--", repo_url, checkout_arg.as_str()],
            scratch.path(),
            config.git_timeout,
        )
        .await?;

        let commit_hash = run_git(&config.git, &["log", "-1", "--format=%H"], &checkout, config.git_timeout).await?;
        let commit_date = run_git(
            &config.git,
            &["log", "-1", "--format=%cd", "--date=format:%Y%m%d"],
            &checkout,
            config.git_timeout,
        )
        .await?;
        drop(scratch);

        let book = RecipeBook::new(session_root);
        let current = match book.read(package) {
            Ok(recipe) => recipe.content,
            Err(Error::NotFound(_)) => self.create_blank(session_root, package)?.content,
            Err(e) => return Err(e),
        };

        let content = apply_git_source(&current, repo_url, &commit_hash, &commit_date);
        let recipe = book.write(package, &content)?;

        info!(package, commit = %commit_hash, version = %commit_date, "Recipe points at git source");
        Ok(GitUpdate {
            package_name: package.to_string(),
            repository_url: repo_url.to_string(),
            commit_hash,
            commit_date: commit_date.clone(),
            version: commit_date,
            recipe,
        })
    }
}

/// Copy an upstream package directory into the session and rewrite its recipe
fn copy_package_tree(
    session_root: &Path,
    package: &str,
    source: UpstreamPackage,
    destination: PathBuf,
    revision: String,
) -> Result<CopyResult> {
    let book = RecipeBook::new(session_root);

    if destination.exists() {
        debug!(package, "Replacing previous copy");
        fs::remove_dir_all(&destination)?;
    }
    fs::create_dir_all(&destination)?;

    let mut copied_files = Vec::new();
    let mut patch_files = Vec::new();
    let mut failed_files = Vec::new();

    let walker = WalkDir::new(&source.path)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.file_name() != "__pycache__");

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let file = e
                    .path()
                    .and_then(|p| p.strip_prefix(&source.path).ok())
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                failed_files.push(FailedFile {
                    file,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(&source.path) else {
            continue;
        };

        // Links may point anywhere; the session copy must stand alone
        if entry.path_is_symlink() {
            warn!(package, file = %relative.display(), "Not copying symbolic link");
            failed_files.push(FailedFile {
                file: relative.to_path_buf(),
                reason: "symbolic link not copied".to_string(),
            });
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().is_some_and(|ext| ext == "pyc") {
            continue;
        }

        match copy_one(session_root, package, path, relative) {
            Ok(()) => {
                let is_patch = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| PATCH_EXTENSIONS.contains(&ext));
                if is_patch {
                    patch_files.push(relative.to_path_buf());
                }
                copied_files.push(relative.to_path_buf());
            }
            Err(e) => {
                warn!(package, file = %relative.display(), "Copy failed: {}", e);
                failed_files.push(FailedFile {
                    file: relative.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let recipe_copied = copied_files.iter().any(|f| f == Path::new(RECIPE_FILE));
    let mut rewrites_applied = Vec::new();
    if recipe_copied {
        let rewritten = book
            .read(package)
            .map(|recipe| rewrite_recipe(&recipe.content))
            .and_then(|rewritten| {
                if !rewritten.applied.is_empty() {
                    book.write(package, &rewritten.content)?;
                }
                Ok(rewritten.applied)
            });
        match rewritten {
            Ok(applied) => rewrites_applied = applied,
            Err(e) => {
                warn!(package, "Recipe rewrite failed: {}", e);
                failed_files.push(FailedFile {
                    file: PathBuf::from(RECIPE_FILE),
                    reason: format!("rewrite failed: {}", e),
                });
            }
        }
    }

    let success = recipe_copied && failed_files.is_empty();
    let message = if success {
        format!(
            "Copied {} ({} file(s), {} patch(es)) from upstream {}",
            package,
            copied_files.len(),
            patch_files.len(),
            short_revision(&revision)
        )
    } else if !recipe_copied {
        format!("Upstream {} has no copyable {}", source.directory_name, RECIPE_FILE)
    } else {
        format!(
            "Copied {} with {} failed file(s)",
            package,
            failed_files.len()
        )
    };

    Ok(CopyResult {
        success,
        package_name: package.to_string(),
        upstream_name: source.directory_name,
        upstream_revision: revision,
        source_path: source.path,
        destination_path: destination,
        recipe_path: recipe_relpath(package),
        copied_files,
        patch_files,
        failed_files,
        rewrites_applied,
        message,
    })
}

fn copy_one(session_root: &Path, package: &str, source: &Path, relative: &Path) -> Result<()> {
    let target = guard::confine(session_root, &package_relpath(package).join(relative))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, &target)?;
    Ok(())
}

fn short_revision(revision: &str) -> &str {
    &revision[..revision.len().min(12)]
}

/// Rewrite recipe source lines to fetch `repo_url` at `commit`
///
/// Drops `url =` lines and the template's maintainer and version
/// placeholders, sets `homepage` to the repository, then places `git =` and
/// a `version()` for the commit right after it. Applying it twice gives the
/// same text.
pub fn apply_git_source(content: &str, repo_url: &str, commit: &str, version: &str) -> String {
    let homepage = repo_url.strip_suffix(".git").unwrap_or(repo_url);
    let commit_marker = format!("commit=\"{}\"", commit);

    let mut kept: Vec<&str> = Vec::new();
    let mut skipping_block = false;
    for line in content.lines() {
        let trimmed = line.trim_start();

        if skipping_block {
            if trimmed.starts_with('#') {
                continue;
            }
            skipping_block = false;
        }
        if trimmed.starts_with(MAINTAINERS_MARKER) || trimmed.starts_with(VERSIONS_MARKER) {
            skipping_block = true;
            continue;
        }

        let is_attr = |name: &str| {
            trimmed
                .strip_prefix(name)
                .is_some_and(|rest| rest.trim_start().starts_with('='))
        };
        if is_attr("url") || is_attr("git") {
            continue;
        }
        if trimmed.starts_with("# FIXME: Add a proper url for your package's homepage") {
            continue;
        }
        if trimmed.starts_with("version(") && trimmed.contains(&commit_marker) {
            continue;
        }
        kept.push(line);
    }

    let homepage_at = kept.iter().position(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix("homepage")
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    });

    let (anchor, indent, with_homepage) = match homepage_at {
        Some(idx) => {
            let line = kept[idx];
            let indent = &line[..line.len() - line.trim_start().len()];
            (idx, indent.to_string(), false)
        }
        None => {
            let class_at = kept
                .iter()
                .position(|line| line.trim_start().starts_with("class "));
            match class_at {
                Some(idx) => (idx, "    ".to_string(), true),
                None => (kept.len().saturating_sub(1), "    ".to_string(), true),
            }
        }
    };

    let homepage_line = format!("{}homepage = \"{}\"", indent, homepage);
    let git_line = format!("{}git = \"{}\"", indent, repo_url);
    let version_line = format!("{}version(\"{}\", {})", indent, version, commit_marker);

    let mut out: Vec<String> = Vec::with_capacity(kept.len() + 3);
    for (idx, line) in kept.iter().enumerate() {
        if idx == anchor && !with_homepage {
            out.push(homepage_line.clone());
        } else {
            out.push(line.to_string());
        }
        if idx == anchor {
            if with_homepage {
                out.push(homepage_line.clone());
            }
            out.push(git_line.clone());
            out.push(version_line.clone());
        }
    }
    if kept.is_empty() {
        out.extend([homepage_line, git_line, version_line]);
    }

    let mut text = out.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::upstream::UpstreamConfig;
    use tempfile::TempDir;

    const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

    fn session_root() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("spack-repo/packages")).unwrap();
        temp_dir
    }

    fn transformer(checkout: &Path, pin: &str) -> RecipeTransformer {
        RecipeTransformer::new(Arc::new(Upstream::new(UpstreamConfig::new(checkout, pin))))
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = std::process::Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(out.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    const UPSTREAM_ZLIB: &str = "\
from spack_repo.builtin.build_systems.generic import Package
from spack.package import *


class Zlib(Package, CompilerPackage):
    homepage = \"https://zlib.net\"
    url = \"https://zlib.net/fossils/zlib-1.3.1.tar.gz\"

    license(\"Zlib\", checked_by=\"someone\")

    version(\"1.3.1\", sha256=\"abc\")

    depends_on(\"c\", type=\"build\")
    patch(\"w.patch\")
";

    fn upstream_repo() -> (TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkgs = root.join("repos/spack_repo/builtin/packages");
        fs::create_dir_all(pkgs.join("zlib/__pycache__")).unwrap();
        fs::write(pkgs.join("zlib/package.py"), UPSTREAM_ZLIB).unwrap();
        fs::write(pkgs.join("zlib/w.patch"), "--- a\n+++ b\n").unwrap();
        fs::write(pkgs.join("zlib/__pycache__/package.cpython-311.pyc"), "x").unwrap();
        fs::create_dir_all(pkgs.join("py_six")).unwrap();
        fs::write(pkgs.join("py_six/package.py"), "class PySix(PythonPackage):\n    pass\n").unwrap();

        git(root, &["init", "--quiet"]);
        git(root, &["add", "."]);
        git(root, &["commit", "--quiet", "-m", "packages"]);
        let head = git(root, &["rev-parse", "HEAD"]);
        (temp_dir, head)
    }

    #[tokio::test]
    async fn test_copy_from_upstream_rewrites_recipe() {
        if which::which("git").is_err() {
            return;
        }
        let (upstream, head) = upstream_repo();
        let session = session_root();
        let transformer = transformer(upstream.path(), &head);

        let result = transformer
            .copy_from_upstream(session.path(), "zlib")
            .await
            .unwrap();

        assert!(result.success, "{}", result.message);
        assert_eq!(result.upstream_revision, head);
        assert_eq!(result.patch_files, vec![PathBuf::from("w.patch")]);
        assert_eq!(result.copied_files.len(), 2);
        assert_eq!(result.rewrites_applied, RewriteRule::ORDERED.to_vec());

        let dest = session.path().join("spack-repo/packages/zlib");
        assert!(dest.join("w.patch").is_file());
        assert!(!dest.join("__pycache__").exists());

        let recipe = fs::read_to_string(dest.join("package.py")).unwrap();
        assert!(recipe.contains("class Zlib(Package):"));
        assert!(recipe.contains("    # depends_on(\"c\", type=\"build\")"));
        assert!(recipe.contains("license(\"Zlib\")"));
    }

    /// Upstream checkout with a single `zlib` package built by `populate`
    fn upstream_with(populate: impl FnOnce(&Path)) -> (TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkg = root.join("repos/spack_repo/builtin/packages/zlib");
        fs::create_dir_all(&pkg).unwrap();
        populate(&pkg);

        git(root, &["init", "--quiet"]);
        git(root, &["add", "."]);
        git(root, &["commit", "--quiet", "-m", "packages"]);
        let head = git(root, &["rev-parse", "HEAD"]);
        (temp_dir, head)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partial_copy_lists_skipped_links() {
        if which::which("git").is_err() {
            return;
        }
        let (upstream, head) = upstream_with(|pkg| {
            fs::write(pkg.join("package.py"), UPSTREAM_ZLIB).unwrap();
            fs::write(pkg.join("w.patch"), "--- a\n+++ b\n").unwrap();
            std::os::unix::fs::symlink("/etc/hostname", pkg.join("host.patch")).unwrap();
        });
        let session = session_root();
        let transformer = transformer(upstream.path(), &head);

        let result = transformer
            .copy_from_upstream(session.path(), "zlib")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.failed_files.len(), 1);
        assert_eq!(result.failed_files[0].file, PathBuf::from("host.patch"));
        assert!(result.failed_files[0].reason.contains("symbolic link"));
        assert_eq!(
            result.copied_files,
            vec![PathBuf::from("package.py"), PathBuf::from("w.patch")]
        );
        assert!(result.message.contains("1 failed file"));

        let dest = session.path().join("spack-repo/packages/zlib");
        assert!(dest.join("w.patch").is_file());
        assert!(!dest.join("host.patch").exists());
    }

    #[tokio::test]
    async fn test_rewrite_failure_keeps_copy_report() {
        if which::which("git").is_err() {
            return;
        }
        let (upstream, head) = upstream_with(|pkg| {
            fs::write(pkg.join("package.py"), b"class Zlib(Package):\n    x = '\xff\xfe'\n").unwrap();
            fs::write(pkg.join("w.patch"), "--- a\n+++ b\n").unwrap();
        });
        let session = session_root();
        let transformer = transformer(upstream.path(), &head);

        let result = transformer
            .copy_from_upstream(session.path(), "zlib")
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.copied_files.len(), 2);
        assert_eq!(result.patch_files, vec![PathBuf::from("w.patch")]);
        assert_eq!(result.failed_files.len(), 1);
        assert_eq!(result.failed_files[0].file, PathBuf::from("package.py"));
        assert!(result.failed_files[0].reason.starts_with("rewrite failed"));
        assert!(result.rewrites_applied.is_empty());
    }

    #[tokio::test]
    async fn test_copy_maps_ecosystem_names() {
        if which::which("git").is_err() {
            return;
        }
        let (upstream, head) = upstream_repo();
        let session = session_root();
        let transformer = transformer(upstream.path(), &head);

        let result = transformer
            .copy_from_upstream(session.path(), "py-six")
            .await
            .unwrap();
        assert_eq!(result.upstream_name, "py_six");
        assert!(session.path().join("spack-repo/packages/py-six/package.py").is_file());
        assert!(result.rewrites_applied.is_empty());
    }

    #[tokio::test]
    async fn test_copy_unknown_package() {
        if which::which("git").is_err() {
            return;
        }
        let (upstream, head) = upstream_repo();
        let session = session_root();
        let transformer = transformer(upstream.path(), &head);

        let err = transformer
            .copy_from_upstream(session.path(), "nonexistent")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
        assert!(!session.path().join("spack-repo/packages/nonexistent").exists());
    }

    #[test]
    fn test_create_blank_keeps_existing() {
        let session = session_root();
        let transformer = transformer(Path::new("/nonexistent"), "main");

        let created = transformer.create_blank(session.path(), "my-tool").unwrap();
        assert!(created.content.contains("class MyTool(Package):"));

        RecipeBook::new(session.path())
            .write("my-tool", "class MyTool(Package):\n    pass\n")
            .unwrap();
        let again = transformer.create_blank(session.path(), "my-tool").unwrap();
        assert_eq!(again.content, "class MyTool(Package):\n    pass\n");
    }

    #[test]
    fn test_create_from_url() {
        let session = session_root();
        let transformer = transformer(Path::new("/nonexistent"), "main");

        let recipe = transformer
            .create_from_url(session.path(), "https://files.pythonhosted.org/packages/ab/cd/six-1.16.0.tar.gz")
            .unwrap();
        assert_eq!(recipe.package_name, "py-six");
        assert!(recipe.content.contains("class PySix(PythonPackage):"));
        assert!(recipe.content.contains("pypi = \"six/six-1.16.0.tar.gz\""));

        let again = transformer.create_from_url(
            session.path(),
            "https://files.pythonhosted.org/packages/ab/cd/six-1.16.0.tar.gz",
        );
        assert!(matches!(again, Err(Error::InvalidRequest(_))));

        let bad = transformer.create_from_url(session.path(), "https://example.com/readme.txt");
        assert!(matches!(bad, Err(Error::UnsupportedUrl(_))));
    }

    #[test]
    fn test_apply_git_source_on_blank_template() {
        let blank = RecipeTemplate::blank("my-tool").render();
        let text = apply_git_source(&blank, "https://github.com/me/my-tool.git", COMMIT, "20250101");

        assert!(text.contains("    homepage = \"https://github.com/me/my-tool\"\n    git = \"https://github.com/me/my-tool.git\"\n    version(\"20250101\", commit=\"0123456789abcdef0123456789abcdef01234567\")\n"));
        assert!(!text.contains("url ="));
        assert!(!text.contains(MAINTAINERS_MARKER));
        assert!(!text.contains(VERSIONS_MARKER));
        assert!(!text.contains("maintainers("));

        let twice = apply_git_source(&text, "https://github.com/me/my-tool.git", COMMIT, "20250101");
        assert_eq!(twice, text);
    }

    #[test]
    fn test_apply_git_source_without_homepage() {
        let text = apply_git_source(
            "class Foo(Package):\n    pass\n",
            "https://example.org/foo.git",
            COMMIT,
            "20240101",
        );
        assert!(text.starts_with("class Foo(Package):\n    homepage = \"https://example.org/foo\"\n    git = "));
    }

    #[tokio::test]
    async fn test_update_from_git() {
        if which::which("git").is_err() {
            return;
        }
        let source = TempDir::new().unwrap();
        git(source.path(), &["init", "--quiet"]);
        fs::write(source.path().join("README"), "hello\n").unwrap();
        git(source.path(), &["add", "."]);
        git(source.path(), &["commit", "--quiet", "-m", "init"]);
        let head = git(source.path(), &["rev-parse", "HEAD"]);

        let session = session_root();
        let transformer = transformer(Path::new("/nonexistent"), "main");
        let url = format!("file://{}", source.path().display());

        let update = transformer
            .update_from_git(session.path(), "my-tool", &url)
            .await
            .unwrap();
        assert_eq!(update.commit_hash, head);
        assert_eq!(update.version.len(), 8);
        assert!(update.recipe.content.contains(&format!("commit=\"{}\"", head)));
        assert!(update.recipe.content.contains(&format!("git = \"{}\"", url)));

        // Scratch clone is gone
        let leftovers: Vec<_> = fs::read_dir(session.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".git-clone-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_update_from_git_rejects_option_urls() {
        let session = session_root();
        let transformer = transformer(Path::new("/nonexistent"), "main");
        let err = transformer
            .update_from_git(session.path(), "my-tool", "--upload-pack=evil")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
