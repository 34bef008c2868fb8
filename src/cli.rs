// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - serve: run the collector (default when no subcommand is given)
// - config --show | --path | --reset: inspect or regenerate configuration
// - client-id <product>: print a fresh anonymous client id

use anyhow::{Context, Result};
use beaconlog::client::generate_client_id;
use beaconlog::config::{Config, ConfigError, VERSION};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::net::SocketAddr;

/// beaconlog - anonymous usage analytics collector
#[derive(Parser)]
#[command(name = "beaconlog")]
#[command(version = VERSION)]
#[command(about = "Anonymous usage analytics collector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the collector
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Skip the overwrite confirmation for --reset
        #[arg(long, short)]
        yes: bool,
    },

    /// Print a new anonymous client id for a product
    ClientId {
        /// Product tag, e.g. fidesctl-cli
        product: String,
    },
}

pub fn handle_config(show: bool, reset: bool, path: bool, yes: bool) -> Result<()> {
    if path {
        handle_config_path()
    } else if show {
        handle_config_show()
    } else if reset {
        handle_config_reset(yes)
    } else {
        println!("Usage: beaconlog config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
        Ok(())
    }
}

pub fn handle_client_id(product: &str) {
    println!("{}", generate_client_id(product.as_bytes()));
}

fn handle_config_path() -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;
    println!("{}", path.display());
    Ok(())
}

fn handle_config_show() -> Result<()> {
    let config = load_or_exit();

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
    Ok(())
}

fn handle_config_reset(yes: bool) -> Result<()> {
    let path = Config::config_path().context("Could not determine config path")?;

    if path.exists() && !yes {
        eprint!(
            "Config file exists at {}. Overwrite? [y/N] ",
            path.display()
        );
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    Config::write_template(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Config reset to defaults: {}", path.display());
    Ok(())
}

/// Load configuration, exiting with an actionable message if it is broken.
///
/// A broken config should fail fast rather than silently fall back to
/// defaults while the user debugs the wrong thing.
pub fn load_or_exit() -> Config {
    match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            report_config_error(&e);
            std::process::exit(1);
        }
    }
}

fn report_config_error(err: &ConfigError) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║  CONFIG ERROR - Failed to load configuration                 ║");
    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
    eprintln!("  Error: {}\n", err);
    match err {
        ConfigError::Parse { .. } => {
            eprintln!("  Tip: Check for:\n");
            eprintln!("    - Missing quotes around string values");
            eprintln!("    - Invalid boolean values (use true/false)");
            eprintln!("    - Typos in section names\n");
        }
        ConfigError::Invalid(_) => {
            eprintln!("  Tip: Environment variables (BEACONLOG_*) override the file.\n");
        }
        ConfigError::Read { .. } => {}
    }
    eprintln!("  To reset, run `beaconlog config --reset`.\n");
}
