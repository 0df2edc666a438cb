// src/recipe/upstream.rs

//! Pinned upstream package checkout
//!
//! Recipes are copied from a shared git checkout of the upstream package
//! repository. Before any read the checkout is moved to the configured pin,
//! so every copy comes from the same revision regardless of where upstream's
//! head has gone. Access is serialized: one pin-and-read at a time across all
//! sessions.

use crate::recipe::naming::NamingTable;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Upstream checkout configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Git checkout of the upstream package repository
    pub checkout: PathBuf,
    /// Package directory relative to the checkout
    pub packages_subdir: PathBuf,
    /// Revision every copy is taken from
    pub pin: String,
    /// Git executable
    pub git: String,
    /// Time budget for each git command
    pub git_timeout: Duration,
}

impl UpstreamConfig {
    pub fn new<P: Into<PathBuf>>(checkout: P, pin: &str) -> Self {
        Self {
            checkout: checkout.into(),
            packages_subdir: PathBuf::from("repos/spack_repo/builtin/packages"),
            pin: pin.to_string(),
            git: "git".to_string(),
            git_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_packages_subdir<P: Into<PathBuf>>(mut self, subdir: P) -> Self {
        self.packages_subdir = subdir.into();
        self
    }

    pub fn with_git(mut self, git: &str) -> Self {
        self.git = git.to_string();
        self
    }

    pub fn with_git_timeout(mut self, timeout: Duration) -> Self {
        self.git_timeout = timeout;
        self
    }

    /// Absolute package directory
    pub fn packages_dir(&self) -> PathBuf {
        self.checkout.join(&self.packages_subdir)
    }
}

/// Shared upstream checkout
pub struct Upstream {
    config: UpstreamConfig,
    naming: NamingTable,
    gate: Mutex<()>,
}

/// Exclusive, pinned view of the upstream tree
pub struct PinnedUpstream<'a> {
    _gate: MutexGuard<'a, ()>,
    /// Commit the checkout is at
    pub revision: String,
    /// Package directory inside the checkout
    pub packages_dir: PathBuf,
    naming: &'a NamingTable,
}

/// An upstream package directory
#[derive(Debug, Clone)]
pub struct UpstreamPackage {
    /// Directory name under the package tree
    pub directory_name: String,
    /// Absolute path of that directory
    pub path: PathBuf,
}

impl Upstream {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config,
            naming: NamingTable::default(),
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    pub fn naming(&self) -> &NamingTable {
        &self.naming
    }

    /// Move the checkout to the pin and hold it there
    ///
    /// The returned guard keeps other sessions from re-pinning until the
    /// caller is done reading.
    pub async fn pinned(&self) -> Result<PinnedUpstream<'_>> {
        let gate = self.gate.lock().await;
        let revision = self.ensure_pinned().await?;

        Ok(PinnedUpstream {
            _gate: gate,
            revision,
            packages_dir: self.config.packages_dir(),
            naming: &self.naming,
        })
    }

    async fn ensure_pinned(&self) -> Result<String> {
        let pin = &self.config.pin;
        let pinning = |reason: String| Error::PinningError {
            revision: pin.clone(),
            reason,
        };

        if !self.config.checkout.is_dir() {
            return Err(pinning(format!(
                "checkout {} does not exist",
                self.config.checkout.display()
            )));
        }

        let target = match self.resolve_pin().await {
            Ok(commit) => commit,
            Err(first) => {
                // The pin may be newer than the last fetch
                debug!("Pin {} not resolvable locally ({}), fetching", pin, first);
                self.git(&["fetch", "--quiet", "--tags", "origin"])
                    .await
                    .map_err(|e| pinning(format!("fetch failed: {}", e)))?;
                self.resolve_pin().await.map_err(|e| pinning(e.to_string()))?
            }
        };

        let head = self
            .git(&["rev-parse", "HEAD"])
            .await
            .map_err(|e| pinning(e.to_string()))?;
        if head == target {
            debug!("Upstream already at pin {}", target);
            return Ok(target);
        }

        info!("Checking out upstream pin {} ({})", pin, target);
        self.git(&["checkout", "--quiet", "--force", "--detach", &target])
            .await
            .map_err(|e| pinning(e.to_string()))?;

        let head = self
            .git(&["rev-parse", "HEAD"])
            .await
            .map_err(|e| pinning(e.to_string()))?;
        if head != target {
            return Err(pinning(format!("HEAD is {} after checkout", head)));
        }

        Ok(target)
    }

    async fn resolve_pin(&self) -> Result<String> {
        let spec = format!("{}^{{commit}}", self.config.pin);
        self.git(&["rev-parse", "--verify", "--quiet", &spec]).await
    }

    async fn git(&self, args: &[&str]) -> Result<String> {
        run_git(
            &self.config.git,
            args,
            &self.config.checkout,
            self.config.git_timeout,
        )
        .await
    }
}

impl PinnedUpstream<'_> {
    /// Find a package directory by package name
    pub fn locate(&self, package: &str) -> Result<UpstreamPackage> {
        let tried = self.naming.candidates(package);
        for candidate in &tried {
            let path = self.packages_dir.join(candidate);
            if path.join("package.py").is_file() {
                return Ok(UpstreamPackage {
                    directory_name: candidate.clone(),
                    path,
                });
            }
        }

        Err(Error::PackageNotFound {
            package: package.to_string(),
            tried,
        })
    }
}

/// Run git and return trimmed stdout
pub(crate) async fn run_git(
    git: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<String> {
    let mut cmd = Command::new(git);
    cmd.args(args)
        .current_dir(cwd)
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(Error::SpawnError {
                program: git.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            warn!("git {} timed out after {:?}", args.join(" "), timeout);
            return Err(Error::TimeoutError(timeout.as_secs()));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::GitError(format!(
            "git {} failed ({}): {}",
            args.join(" "),
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_sync(dir: &Path, args: &[&str]) -> String {
        let out = std::process::Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(out.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).trim().to_string()
    }

    /// Two commits: the first has zlib, the second adds py_numpy
    fn upstream_repo() -> (TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let pkgs = root.join("repos/spack_repo/builtin/packages");

        git_sync(root, &["init", "--quiet"]);
        std::fs::create_dir_all(pkgs.join("zlib")).unwrap();
        std::fs::write(pkgs.join("zlib/package.py"), "class Zlib(Package):\n    pass\n").unwrap();
        git_sync(root, &["add", "."]);
        git_sync(root, &["commit", "--quiet", "-m", "zlib"]);
        let first = git_sync(root, &["rev-parse", "HEAD"]);

        std::fs::create_dir_all(pkgs.join("py_numpy")).unwrap();
        std::fs::write(pkgs.join("py_numpy/package.py"), "class PyNumpy(PythonPackage):\n    pass\n").unwrap();
        git_sync(root, &["add", "."]);
        git_sync(root, &["commit", "--quiet", "-m", "numpy"]);

        (temp_dir, first)
    }

    #[tokio::test]
    async fn test_pin_checks_out_revision() {
        if which::which("git").is_err() {
            return;
        }
        let (repo, first) = upstream_repo();
        let upstream = Upstream::new(UpstreamConfig::new(repo.path(), &first));

        let pinned = upstream.pinned().await.unwrap();
        assert_eq!(pinned.revision, first);
        assert!(pinned.locate("zlib").is_ok());

        // py_numpy only exists after the pin
        let err = pinned.locate("py-numpy").unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { ref tried, .. } if tried.len() == 2));
    }

    #[tokio::test]
    async fn test_unknown_pin_is_pinning_error() {
        if which::which("git").is_err() {
            return;
        }
        let (repo, _) = upstream_repo();
        let upstream = Upstream::new(UpstreamConfig::new(repo.path(), "no-such-tag"));

        let err = upstream.pinned().await.err().unwrap();
        assert!(matches!(err, Error::PinningError { ref revision, .. } if revision == "no-such-tag"));
    }

    #[tokio::test]
    async fn test_missing_checkout_is_pinning_error() {
        let temp_dir = TempDir::new().unwrap();
        let upstream = Upstream::new(UpstreamConfig::new(temp_dir.path().join("absent"), "main"));
        assert!(matches!(
            upstream.pinned().await,
            Err(Error::PinningError { .. })
        ));
    }
}
