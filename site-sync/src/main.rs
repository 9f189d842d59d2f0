//! Site Sync - Main entry point
//!
//! Pulls, builds and publishes static sites for configured tenants.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use site_sync::publish::manifest;
use site_sync::{utils, Config, DeployOrchestrator};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pull, build and publish the given tenants
    Deploy {
        #[arg(required = true)]
        tenants: Vec<String>,
    },
    /// Mirror a tenant's source into its staging directory
    Pull { tenant: String },
    /// Publish a tenant's output directory
    Push { tenant: String },
    /// Print the manifest of a local directory
    Manifest { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(args.config.as_deref())?;

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting site-sync v{} ({} tenants configured)",
        env!("CARGO_PKG_VERSION"),
        config.tenants.len()
    );

    match args.command {
        Command::Deploy { tenants } => {
            let orchestrator = DeployOrchestrator::from_config(config)?;
            let reports = orchestrator.deploy(&tenants).await?;

            let mut failed = 0;
            for report in &reports {
                println!("{}", report);
                if !report.is_success() {
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} of {} tenant(s) failed", failed, reports.len());
            }
        }
        Command::Pull { tenant } => {
            let orchestrator = DeployOrchestrator::from_config(config)?;
            let cursor = orchestrator.pull(&tenant).await?;
            println!("{}: mirrored at cursor {}", tenant, cursor);
        }
        Command::Push { tenant } => {
            let orchestrator = DeployOrchestrator::from_config(config)?;
            let summary = orchestrator.push(&tenant).await?;
            println!(
                "{}: {} ({} uploaded, {} deleted, {} unchanged)",
                tenant, summary.mode, summary.uploaded, summary.deleted, summary.unchanged
            );
        }
        Command::Manifest { dir } => {
            let manifest = manifest::generate(&dir).await?;
            println!("{}", String::from_utf8_lossy(&manifest.to_json()?));
        }
    }

    Ok(())
}
