// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.
//!
//! Builds a throwaway upstream package repository (a real git repository)
//! and fake `spack` executables so workbench flows run without Spack.

#![allow(dead_code)]

use scullery::executor::{Executor, ExecutorConfig};
use scullery::recipe::{Upstream, UpstreamConfig};
use scullery::workspace::StoreConfig;
use scullery::{Workbench, WorkspaceStore};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const HASH: &str = "abcdefghijklmnopqrstuvwxyz234567";

pub const UPSTREAM_ZLIB: &str = "\
from spack_repo.builtin.build_systems.generic import Package
from spack.package import *


class Zlib(Package, CompilerPackage):
    \"\"\"A free, general-purpose, lossless data-compression library.\"\"\"

    homepage = \"https://zlib.net\"
    url = \"https://zlib.net/fossils/zlib-1.3.1.tar.gz\"

    license(\"Zlib\", checked_by=\"someone\")

    version(\"1.3.1\", sha256=\"9a93b2b7dfdac77ceba5a558a580e74667dd6fede4585b91eefb60f03b72df23\")

    depends_on(\"c\", type=\"build\")

    patch(\"configure-cc.patch\")
";

pub const UPSTREAM_PY_SIX: &str = "\
from spack_repo.builtin.build_systems.python import PythonPackage
from spack.package import *


class PySix(PythonPackage):
    homepage = \"https://github.com/benjaminp/six\"
    pypi = \"six/six-1.16.0.tar.gz\"

    version(\"1.16.0\", sha256=\"1e61c37477a1626458e36f7b1d82aa5c9b094fa4802892072e49de9c60c4c926\")
";

/// Skip marker for tests needing a git executable
pub fn has_git() -> bool {
    which::which("git").is_ok()
}

/// Run git in `dir`, panicking with its stderr on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(["-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?}: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

/// Create an upstream checkout with `zlib` and `py_six`, tagged `v1.0.0`
///
/// Returns the checkout path inside `temp_dir`.
pub fn fake_upstream(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("upstream");
    let pkgs = root.join("repos/spack_repo/builtin/packages");
    fs::create_dir_all(pkgs.join("zlib")).unwrap();
    fs::write(pkgs.join("zlib/package.py"), UPSTREAM_ZLIB).unwrap();
    fs::write(pkgs.join("zlib/configure-cc.patch"), "--- a/configure\n+++ b/configure\n").unwrap();
    fs::create_dir_all(pkgs.join("py_six")).unwrap();
    fs::write(pkgs.join("py_six/package.py"), UPSTREAM_PY_SIX).unwrap();

    git(&root, &["init", "--quiet"]);
    git(&root, &["add", "."]);
    git(&root, &["commit", "--quiet", "-m", "packages"]);
    git(&root, &["tag", "v1.0.0"]);

    // A later commit the pin must roll back from
    fs::write(pkgs.join("zlib/package.py"), "class Zlib(Package):\n    broken = True\n").unwrap();
    git(&root, &["commit", "--quiet", "-am", "break zlib"]);

    root
}

/// A small git repository standing in for a project's source
pub fn fake_project(temp_dir: &TempDir) -> PathBuf {
    let root = temp_dir.path().join("project.git");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join("README"), "hello\n").unwrap();
    git(&root, &["init", "--quiet"]);
    git(&root, &["add", "."]);
    git(&root, &["commit", "--quiet", "-m", "initial"]);
    root
}

/// Write an executable shell script standing in for `spack`
pub fn fake_spack(temp_dir: &TempDir, body: &str) -> PathBuf {
    let path = temp_dir.path().join("bin/spack");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// `spack install` that reports a successful install of the requested spec
pub fn installing_spack(temp_dir: &TempDir) -> PathBuf {
    fake_spack(
        temp_dir,
        &format!(
            r#"echo "args: $*"
for last; do :; done
echo "==> Installing $last"
echo "[+] /opt/spack/linux-x86_64/$last-1.0-{hash}"
"#,
            hash = HASH
        ),
    )
}

/// A workbench over fresh directories in `temp_dir`
pub fn workbench(temp_dir: &TempDir, spack: &Path, checkout: &Path, pin: &str) -> Workbench {
    let store = WorkspaceStore::new(StoreConfig::new(temp_dir.path().join("sessions"))).unwrap();
    let upstream = Upstream::new(UpstreamConfig::new(checkout, pin));
    let executor = Executor::new(
        ExecutorConfig::default()
            .with_spack(&spack.display().to_string())
            .with_timeout(Duration::from_secs(30))
            .with_kill_grace(Duration::from_millis(200)),
    );
    Workbench::new(Arc::new(store), Arc::new(upstream), executor)
}

/// `spack` answering `list`, `info` and `uninstall`
///
/// Knows `py-six`, `py-sphinx` and `zlib`. Info for anything else fails
/// with "not found"; uninstall refuses unless `--force` is given.
pub fn catalog_spack(temp_dir: &TempDir) -> PathBuf {
    fake_spack(
        temp_dir,
        r#"case "$3" in
list)
    printf 'py-six\npy-sphinx\nzlib\n' | grep -e "${4:-.}" || true
    ;;
info)
    case "$4" in
    zlib|zlib@*)
        cat <<'INFO'
AutotoolsPackage:   zlib

Description:
    A free, general-purpose, legally unencumbered lossless data-compression
    library.

Homepage: https://zlib.net

Safe versions:
    1.3.1     https://zlib.net/fossils/zlib-1.3.1.tar.gz

Variants:
    shared [on]                 on, off
        Enables the build of shared libraries.

Build Dependencies:
    c  gmake
INFO
        ;;
    *)
        echo "==> Error: Package '$4' not found." >&2
        exit 1
        ;;
    esac
    ;;
uninstall)
    if [ "$5" = "--force" ]; then
        echo "==> Successfully uninstalled $6"
    else
        echo "==> Error: Will not uninstall $5, it is needed by: curl" >&2
        exit 1
    fi
    ;;
*)
    echo "unexpected: $*" >&2
    exit 2
    ;;
esac"#,
    )
}
