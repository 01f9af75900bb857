//! calc-bridge CLI entry point.
//!
//! Runs bundled (and configured) statistics through the runtime bridge.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use calc_bridge_catalog::Catalog;
use calc_bridge_common::ConfigFile;
use calc_bridge_core::{RuntimeBridge, install_global};

#[derive(Debug, Parser)]
#[command(name = "calc-bridge", version, about)]
struct Cli {
    /// TOML file declaring extra packages, modules and contracts.
    #[arg(long, env = "CALC_BRIDGE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Call an operation by its exposed name.
    Call {
        /// Exposed operation name, e.g. `stddev`.
        operation: String,
        /// Numeric arguments.
        #[arg(allow_negative_numbers = true)]
        args: Vec<f64>,
    },
    /// Check the registry against module exports and host operations.
    Verify,
    /// List modules, their packages, and their operations.
    Modules,
    /// Load modules ahead of time and report their state.
    Warm {
        /// Modules to load; all of them if omitted.
        modules: Vec<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn,calc_bridge=info".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn load_catalog(config: Option<&Path>) -> anyhow::Result<Catalog> {
    let Some(path) = config else {
        return Ok(Catalog::bundled()?);
    };

    let file = ConfigFile::from_file(path)
        .with_context(|| format!("Failed to load config file {}", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    info!(path = %path.display(), "Configuration loaded");
    Catalog::with_config_file(&file, base_dir).context("Invalid config file")
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let catalog = load_catalog(cli.config.as_deref())?;

    match cli.command {
        Command::Verify => verify(&catalog),
        Command::Modules => {
            list_modules(&catalog);
            Ok(ExitCode::SUCCESS)
        }
        Command::Call { operation, args } => {
            let bridge = install_global(catalog.into_bridge()?)?;
            let result: Value = bridge
                .invoke(&operation, &args)
                .await
                .with_context(|| format!("'{operation}' failed"))?;
            println!("{result}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Warm { modules } => {
            let bridge = install_global(catalog.into_bridge()?)?;
            warm(bridge, modules).await
        }
    }
}

fn verify(catalog: &Catalog) -> anyhow::Result<ExitCode> {
    let violations = catalog.verify()?;

    if violations.is_empty() {
        println!(
            "ok: {} module(s), {} contract(s)",
            catalog.declarations().len(),
            catalog.registry().len()
        );
        return Ok(ExitCode::SUCCESS);
    }

    for violation in &violations {
        eprintln!("error: {violation}");
    }
    eprintln!("{} violation(s)", violations.len());
    Ok(ExitCode::FAILURE)
}

fn list_modules(catalog: &Catalog) {
    for declaration in catalog.declarations() {
        let operations: Vec<&str> = catalog
            .registry()
            .contracts()
            .iter()
            .filter(|c| c.module_id == declaration.id.as_str())
            .map(|c| c.exposed_name.as_ref())
            .collect();

        println!(
            "{} ({}) packages=[{}] operations=[{}]",
            declaration.id,
            declaration.weight,
            declaration.required_packages.join(", "),
            operations.join(", ")
        );
    }
}

async fn warm(bridge: &RuntimeBridge, modules: Vec<String>) -> anyhow::Result<ExitCode> {
    let modules = if modules.is_empty() {
        bridge
            .modules()
            .module_ids()
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        modules
    };

    let mut failed = false;
    for module in &modules {
        match bridge.ensure_ready(module).await {
            Ok(()) => println!("{module}: ready"),
            Err(e) => {
                failed = true;
                eprintln!("{module}: {e}");
            }
        }
    }

    for package in bridge.packages().loaded() {
        println!("package {package}: loaded");
    }

    if failed {
        bail!("some modules failed to load");
    }
    Ok(ExitCode::SUCCESS)
}
