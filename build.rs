// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("Path to a TOML configuration file")
}

fn override_args() -> Vec<Arg> {
    vec![
        config_arg(),
        Arg::new("bind").long("bind").value_name("ADDR").help("Address to listen on"),
        Arg::new("sessions_root")
            .long("sessions-root")
            .value_name("DIR")
            .help("Directory holding session workspaces"),
        Arg::new("spack").long("spack").value_name("PATH").help("Spack executable"),
        Arg::new("upstream_path")
            .long("upstream-path")
            .value_name("DIR")
            .help("Upstream package repository checkout"),
        Arg::new("upstream_pin")
            .long("upstream-pin")
            .value_name("REV")
            .help("Upstream revision to pin"),
    ]
}

fn build_cli() -> Command {
    Command::new("scullery")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Scullery Contributors")
        .about("Session-scoped Spack recipe workbench")
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .global(true)
                .help("Log filter; overrides RUST_LOG"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("serve")
                .about("Run the HTTP server")
                .args(override_args()),
        )
        .subcommand(
            Command::new("check-config")
                .about("Validate configuration and print the effective settings")
                .args(override_args()),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = out_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("scullery.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
