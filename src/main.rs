// src/main.rs

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use scullery::SculleryConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scullery")]
#[command(author, version, about = "Session-scoped Spack recipe workbench", long_about = None)]
struct Cli {
    /// Log filter (e.g. "debug", "scullery=trace"); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Validate configuration and print the effective settings
    CheckConfig {
        #[command(flatten)]
        overrides: ConfigArgs,
    },
}

/// Flags layered over the config file and environment
#[derive(Args)]
struct ConfigArgs {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "SCULLERY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<String>,

    /// Directory holding session workspaces
    #[arg(long)]
    sessions_root: Option<PathBuf>,

    /// Spack executable
    #[arg(long)]
    spack: Option<String>,

    /// Upstream package repository checkout
    #[arg(long)]
    upstream_path: Option<PathBuf>,

    /// Upstream revision to pin
    #[arg(long)]
    upstream_pin: Option<String>,
}

impl ConfigArgs {
    fn load(self) -> Result<SculleryConfig> {
        let mut config = SculleryConfig::load_layered(self.config.as_deref())?;

        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(root) = self.sessions_root {
            config.sessions.root = root;
        }
        if let Some(spack) = self.spack {
            config.spack.executable = spack;
        }
        if let Some(path) = self.upstream_path {
            config.upstream.path = path;
        }
        if let Some(pin) = self.upstream_pin {
            config.upstream.pin = pin;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let filter = match cli.log_level.as_deref() {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve { overrides } => {
            let config = overrides.load()?;
            let runtime = config.to_runtime()?;
            info!("Configuration loaded");
            scullery::server::run_server(runtime).await
        }
        Commands::CheckConfig { overrides } => {
            let config = overrides.load()?;
            config.to_runtime()?;
            print!("{}", toml::to_string_pretty(&config)?);
            println!("# configuration OK");
            Ok(())
        }
    }
}
