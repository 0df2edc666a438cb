// src/executor/spack.rs

//! Spack command lines and output recognition

use crate::executor::ExecutorConfig;
use crate::recipe::validate_package_name;
use crate::workspace::Session;
use crate::{Error, Result};
use chrono::Utc;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// `[+] /opt/spack/.../zlib-1.3.1-<hash>`
static INSTALLED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\+\]\s+(?:\S*/)?(?P<spec>[^/\s]+)-(?P<digest>[a-z2-7]{32})\s*$").unwrap()
});

/// `==> zlib: Successfully installed zlib-1.3.1-<hash>`
static SUCCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^==> (?:\S+: )?Successfully installed (?:\S*/)?(?P<spec>[^/\s]+)-(?P<digest>[a-z2-7]{32})\b").unwrap()
});

/// Build logs the tool points at when a build fails
static BUILD_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<path>/\S*/spack-build-(?:out|log)\.txt)").unwrap()
});

static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9]{1,32}$").unwrap());
static QUERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.*?+\[\]-]{0,64}$").unwrap());
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._:-]{0,63}$").unwrap());

/// A command to run for a session
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    /// Package the command acts on, used to pick the right digest
    pub package: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            package: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn for_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Shell-like rendering for the start event and logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("'{}'", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `spack install` for a package in the session repository
pub fn install_command(
    config: &ExecutorConfig,
    session: &Session,
    package: &str,
    version: Option<&str>,
) -> Result<CommandSpec> {
    let spec = package_spec(package, version)?;
    let mut argv = scoped(config, session, "install");
    argv.push("-v".to_string());
    argv.push(spec);
    Ok(wrap(config, session, argv).for_package(package))
}

/// `spack list` in the session's configuration scope
///
/// The query is a spack name pattern; an empty one lists everything.
pub fn list_command(config: &ExecutorConfig, session: &Session, query: &str) -> Result<CommandSpec> {
    let query = query.trim();
    if query.starts_with('-') || !QUERY_RE.is_match(query) {
        return Err(Error::InvalidRequest(format!("'{}' is not a package query", query)));
    }

    let mut argv = scoped(config, session, "list");
    if !query.is_empty() {
        argv.push(query.to_string());
    }
    Ok(wrap(config, session, argv))
}

/// `spack info` for one package, optionally at a version
pub fn info_command(
    config: &ExecutorConfig,
    session: &Session,
    package: &str,
    version: Option<&str>,
) -> Result<CommandSpec> {
    let spec = package_spec(package, version)?;
    let mut argv = scoped(config, session, "info");
    argv.push(spec);
    Ok(wrap(config, session, argv).for_package(package))
}

/// `spack uninstall -y` for one package
pub fn uninstall_command(
    config: &ExecutorConfig,
    session: &Session,
    package: &str,
    version: Option<&str>,
    force: bool,
) -> Result<CommandSpec> {
    let spec = package_spec(package, version)?;
    let mut argv = scoped(config, session, "uninstall");
    argv.push("-y".to_string());
    if force {
        argv.push("--force".to_string());
    }
    argv.push(spec);
    Ok(wrap(config, session, argv).for_package(package))
}

/// Post-install validation: a caller script, or `spack test run`
///
/// A custom script is written to `logs/validate-<timestamp>.sh` in the
/// session and run with `sh`. It sees `PACKAGE_NAME`,
/// `SPACK_INSTALL_DIGEST` and `SPACK` in its environment.
pub fn validate_command(
    config: &ExecutorConfig,
    session: &Session,
    package: &str,
    digest: Option<&str>,
    custom_script: Option<&str>,
) -> Result<CommandSpec> {
    validate_package_name(package)?;
    if let Some(digest) = digest {
        if !DIGEST_RE.is_match(digest) {
            return Err(Error::InvalidRequest(format!(
                "installation digest '{}' is not a spack hash",
                digest
            )));
        }
    }

    if let Some(script) = custom_script.filter(|s| !s.trim().is_empty()) {
        let logs = session.logs_dir();
        std::fs::create_dir_all(&logs)?;
        let path = logs.join(format!(
            "validate-{}.sh",
            Utc::now().format("%Y%m%dT%H%M%S%.3f")
        ));
        std::fs::write(&path, script)?;

        let argv = vec!["sh".to_string(), path.display().to_string()];
        let spec = wrap(config, session, argv)
            .env("PACKAGE_NAME", package)
            .env("SPACK_INSTALL_DIGEST", digest.unwrap_or_default())
            .env("SPACK", config.spack.clone())
            .for_package(package);
        return Ok(spec);
    }

    let target = match digest {
        Some(digest) => format!("/{}", digest),
        None => package.to_string(),
    };
    let argv = vec![
        config.spack.clone(),
        "-C".to_string(),
        session.config_dir().display().to_string(),
        "test".to_string(),
        "run".to_string(),
        target,
    ];
    Ok(wrap(config, session, argv).for_package(package))
}

/// Prefix `argv` with the configured wrapper, if any
fn wrap(config: &ExecutorConfig, session: &Session, argv: Vec<String>) -> CommandSpec {
    let root = session.root.display().to_string();
    let mut full: Vec<String> = config
        .wrapper
        .iter()
        .map(|part| {
            part.replace("{session_root}", &root)
                .replace("{session_id}", &session.id)
        })
        .collect();
    full.extend(argv);

    let mut parts = full.into_iter();
    let program = parts.next().unwrap_or_default();
    CommandSpec::new(program, &session.root)
        .args(parts)
        .env("PYTHONUNBUFFERED", "1")
}

/// `<spack> -C <session config> <subcommand>`
fn scoped(config: &ExecutorConfig, session: &Session, subcommand: &str) -> Vec<String> {
    vec![
        config.spack.clone(),
        "-C".to_string(),
        session.config_dir().display().to_string(),
        subcommand.to_string(),
    ]
}

/// `name` or `name@version`
fn package_spec(package: &str, version: Option<&str>) -> Result<String> {
    validate_package_name(package)?;
    match version {
        Some(version) => {
            check_version(version)?;
            Ok(format!("{}@{}", package, version))
        }
        None => Ok(package.to_string()),
    }
}

fn check_version(version: &str) -> Result<()> {
    if VERSION_RE.is_match(version) {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!("'{}' is not a version", version)))
    }
}

/// Watches output lines for install digests and build log paths
#[derive(Debug, Default)]
pub struct OutputScanner {
    package: Option<String>,
    digest_for_package: Option<String>,
    last_digest: Option<String>,
    build_log: Option<PathBuf>,
}

impl OutputScanner {
    pub fn new(package: Option<&str>) -> Self {
        Self {
            package: package.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn observe(&mut self, line: &str) {
        let line = line.trim_end();
        let caps = INSTALLED_RE
            .captures(line)
            .or_else(|| SUCCESS_RE.captures(line));
        if let Some(caps) = caps {
            let digest = caps["digest"].to_string();
            let names_package = self
                .package
                .as_deref()
                .is_some_and(|pkg| caps["spec"].starts_with(&format!("{}-", pkg)));
            if names_package {
                self.digest_for_package = Some(digest.clone());
            }
            self.last_digest = Some(digest);
        }

        if let Some(caps) = BUILD_LOG_RE.captures(line) {
            self.build_log = Some(PathBuf::from(&caps["path"]));
        }
    }

    /// Digest of the requested package, else of the last installed spec
    pub fn install_digest(&self) -> Option<&str> {
        self.digest_for_package
            .as_deref()
            .or(self.last_digest.as_deref())
    }

    pub fn build_log(&self) -> Option<&PathBuf> {
        self.build_log.as_ref()
    }
}
