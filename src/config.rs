// src/config.rs
//! Configuration file parsing for the scullery server
//!
//! Supports TOML configuration files with the following sections:
//! - [server] - Bind address and CORS origins
//! - [sessions] - Session root directory, idle TTL, sweep interval
//! - [spack] - Build tool executable, timeouts, stream buffering
//! - [upstream] - Shared package checkout and its pinned revision
//!
//! Precedence, lowest first: built-in defaults, the TOML file, `SCULLERY_*`
//! environment variables, then command-line flags applied by the binary.

use crate::executor::ExecutorConfig;
use crate::recipe::upstream::UpstreamConfig;
use crate::workspace::StoreConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variables recognized by [`SculleryConfig::apply_env`]
pub const ENV_SPACK: &str = "SCULLERY_SPACK";
pub const ENV_COMMAND_TIMEOUT: &str = "SCULLERY_COMMAND_TIMEOUT";
pub const ENV_SESSION_TTL: &str = "SCULLERY_SESSION_TTL";
pub const ENV_UPSTREAM_PIN: &str = "SCULLERY_UPSTREAM_PIN";
pub const ENV_UPSTREAM_PATH: &str = "SCULLERY_UPSTREAM_PATH";
pub const ENV_SESSIONS_ROOT: &str = "SCULLERY_SESSIONS_ROOT";
pub const ENV_BIND: &str = "SCULLERY_BIND";

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SculleryConfig {
    /// Server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Session workspace settings
    #[serde(default)]
    pub sessions: SessionsSection,

    /// Build tool settings
    #[serde(default)]
    pub spack: SpackSection,

    /// Upstream package checkout
    #[serde(default)]
    pub upstream: UpstreamSection,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSection {
    /// API bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// CORS allowed origins (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Session workspace section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsSection {
    /// Directory holding one subdirectory per session
    #[serde(default = "default_sessions_root")]
    pub root: PathBuf,

    /// Idle time before a session is swept (e.g., "24h"; "0" disables)
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl: String,

    /// How often the idle sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            root: default_sessions_root(),
            idle_ttl: default_idle_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_sessions_root() -> PathBuf {
    PathBuf::from("/tmp/scullery/sessions")
}

fn default_idle_ttl() -> String {
    "24h".to_string()
}

fn default_sweep_interval() -> String {
    "5m".to_string()
}

/// Build tool section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpackSection {
    /// Build tool executable (name on PATH or absolute path)
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Maximum duration of one install/validate invocation
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,

    /// Maximum duration of a catalog query (list, info, uninstall)
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,

    /// Wait between SIGTERM and SIGKILL when stopping a process group
    #[serde(default = "default_kill_grace")]
    pub kill_grace: String,

    /// Events buffered between a running process and its stream consumer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Output lines retained for failure diagnostics
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,

    /// Repositories listed after the session repo in repos.yaml
    #[serde(default)]
    pub shared_repos: Vec<PathBuf>,

    /// Argument prefix for wrapped execution (e.g., a container runner).
    /// `{session_root}` and `{session_id}` are substituted.
    #[serde(default)]
    pub wrapper: Vec<String>,
}

impl Default for SpackSection {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            command_timeout: default_command_timeout(),
            query_timeout: default_query_timeout(),
            kill_grace: default_kill_grace(),
            event_buffer: default_event_buffer(),
            tail_lines: default_tail_lines(),
            shared_repos: Vec::new(),
            wrapper: Vec::new(),
        }
    }
}

fn default_executable() -> String {
    "spack".to_string()
}

fn default_command_timeout() -> String {
    "30m".to_string()
}

fn default_query_timeout() -> String {
    "2m".to_string()
}

fn default_kill_grace() -> String {
    "5s".to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_tail_lines() -> usize {
    60
}

/// Upstream checkout section
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamSection {
    /// Git checkout of the upstream package repository
    #[serde(default = "default_upstream_path")]
    pub path: PathBuf,

    /// Package directory relative to the checkout
    #[serde(default = "default_packages_subdir")]
    pub packages_subdir: PathBuf,

    /// Revision every copy is taken from (commit, tag or branch)
    #[serde(default = "default_pin")]
    pub pin: String,

    /// Git executable
    #[serde(default = "default_git")]
    pub git: String,

    /// Time budget for each git command
    #[serde(default = "default_git_timeout")]
    pub git_timeout: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            path: default_upstream_path(),
            packages_subdir: default_packages_subdir(),
            pin: default_pin(),
            git: default_git(),
            git_timeout: default_git_timeout(),
        }
    }
}

fn default_upstream_path() -> PathBuf {
    PathBuf::from("/opt/spack-packages")
}

fn default_packages_subdir() -> PathBuf {
    PathBuf::from("repos/spack_repo/builtin/packages")
}

fn default_pin() -> String {
    "v2025.07.0".to_string()
}

fn default_git() -> String {
    "git".to_string()
}

fn default_git_timeout() -> String {
    "2m".to_string()
}

/// Parsed settings handed to the server and its components
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub sweep_interval: Duration,
    pub store: StoreConfig,
    pub executor: ExecutorConfig,
    pub upstream: UpstreamConfig,
}

impl SculleryConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SculleryConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the file if given, then layer process environment overrides
    pub fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `SCULLERY_*` overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_SPACK) {
            self.spack.executable = v;
        }
        if let Some(v) = get(ENV_COMMAND_TIMEOUT) {
            self.spack.command_timeout = v;
        }
        if let Some(v) = get(ENV_SESSION_TTL) {
            self.sessions.idle_ttl = v;
        }
        if let Some(v) = get(ENV_UPSTREAM_PIN) {
            self.upstream.pin = v;
        }
        if let Some(v) = get(ENV_UPSTREAM_PATH) {
            self.upstream.path = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_SESSIONS_ROOT) {
            self.sessions.root = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_BIND) {
            self.server.bind = v;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid server.bind address: {}", self.server.bind))?;

        if self.spack.executable.trim().is_empty() {
            anyhow::bail!("spack.executable must not be empty");
        }

        let timeout = parse_duration(&self.spack.command_timeout)
            .context("Invalid spack.command_timeout")?;
        if timeout.is_zero() {
            anyhow::bail!("spack.command_timeout must be greater than zero");
        }

        let query_timeout =
            parse_duration(&self.spack.query_timeout).context("Invalid spack.query_timeout")?;
        if query_timeout.is_zero() {
            anyhow::bail!("spack.query_timeout must be greater than zero");
        }

        parse_duration(&self.spack.kill_grace).context("Invalid spack.kill_grace")?;
        parse_duration(&self.sessions.idle_ttl).context("Invalid sessions.idle_ttl")?;

        let sweep = parse_duration(&self.sessions.sweep_interval)
            .context("Invalid sessions.sweep_interval")?;
        if sweep.is_zero() {
            anyhow::bail!("sessions.sweep_interval must be greater than zero");
        }

        if self.spack.event_buffer == 0 {
            anyhow::bail!("spack.event_buffer must be at least 1");
        }

        if self.upstream.pin.trim().is_empty() {
            anyhow::bail!("upstream.pin must name a revision");
        }

        let git_timeout =
            parse_duration(&self.upstream.git_timeout).context("Invalid upstream.git_timeout")?;
        if git_timeout.is_zero() {
            anyhow::bail!("upstream.git_timeout must be greater than zero");
        }

        if self.upstream.packages_subdir.is_absolute() {
            anyhow::bail!("upstream.packages_subdir must be relative to upstream.path");
        }

        Ok(())
    }

    /// Convert to the structures consumed by the server and its components
    pub fn to_runtime(&self) -> Result<RuntimeConfig> {
        self.validate()?;

        let idle_ttl = parse_duration(&self.sessions.idle_ttl)?;

        let store = StoreConfig::new(&self.sessions.root)
            .with_idle_ttl((!idle_ttl.is_zero()).then_some(idle_ttl))
            .with_shared_repos(self.spack.shared_repos.clone());

        let executor = ExecutorConfig::default()
            .with_spack(&self.spack.executable)
            .with_timeout(parse_duration(&self.spack.command_timeout)?)
            .with_query_timeout(parse_duration(&self.spack.query_timeout)?)
            .with_kill_grace(parse_duration(&self.spack.kill_grace)?)
            .with_event_buffer(self.spack.event_buffer)
            .with_tail_lines(self.spack.tail_lines)
            .with_wrapper(self.spack.wrapper.clone());

        let upstream = UpstreamConfig::new(&self.upstream.path, &self.upstream.pin)
            .with_packages_subdir(&self.upstream.packages_subdir)
            .with_git(&self.upstream.git)
            .with_git_timeout(parse_duration(&self.upstream.git_timeout)?);

        Ok(RuntimeConfig {
            bind_addr: self.server.bind.parse()?,
            cors_origins: self.server.cors_origins.clone(),
            sweep_interval: parse_duration(&self.sessions.sweep_interval)?,
            store,
            executor,
            upstream,
        })
    }
}

/// Parse a human-readable duration string (e.g., "15m", "1h", "30s")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('d') {
        (n, 24 * 60 * 60)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 60 * 60)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        // Assume seconds
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration number: {}", num_str))?;

    Ok(Duration::from_secs(num * multiplier))
}
