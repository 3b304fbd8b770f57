//! tidi demo CLI
//!
//! Runs the demo programs against either the default namespace or one built from
//! a config file.

mod demos;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tidi::{run_registration_hooks, Namespace, RegistryConfig};
use tracing::info;

use crate::demos::RegisteredOptions;

/// Demo programs for the tidi dependency injection library
#[derive(Parser, Debug)]
#[command(name = "tidi-demo")]
#[command(about = "Demo programs for the tidi dependency injection library")]
struct Cli {
    /// Registry config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Greet an audience supplied by a provider
    HelloWorld,
    /// Read a connection string from DB_CONN_STRING through a provider
    FromFunc,
    /// Configure, build and run a model wired through the registry
    Registered {
        /// Model name
        #[arg(short, long)]
        name: String,
        /// Absolute tolerance
        #[arg(short, long)]
        atol: f64,
        /// Input value
        #[arg(short, long)]
        feature: f64,
        /// Override the registered number of repeats
        #[arg(short, long)]
        repeats: Option<u32>,
    },
}

fn namespace(config: Option<&PathBuf>) -> Result<Namespace> {
    let namespace = match config {
        Some(path) => {
            let config = RegistryConfig::load(Some(path.as_path()))
                .with_context(|| format!("loading registry config {}", path.display()))?;
            Namespace::from_config(&config)
        }
        None => tidi::default_namespace().clone(),
    };
    let hooks = run_registration_hooks(namespace.registry())?;
    info!("Ran {} registration hooks", hooks);
    Ok(namespace)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    let namespace = namespace(cli.config.as_ref())?;

    let output = match cli.command {
        Commands::HelloWorld => demos::hello_world(&namespace)?,
        Commands::FromFunc => demos::from_func(&namespace)?,
        Commands::Registered {
            name,
            atol,
            feature,
            repeats,
        } => demos::registered(
            &namespace,
            &RegisteredOptions {
                name,
                atol,
                feature,
                repeats,
            },
        )?,
    };

    println!("{}", output);
    Ok(())
}
