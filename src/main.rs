mod accounting;
mod classify;
mod cli;
mod config;
mod error;
mod executor;
mod fleet;
mod models;
mod registry;
mod report;
mod sweep;
#[cfg(test)]
mod testkit;

use std::process;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Backend, Cli};
use fleet::PgFleetOracle;
use registry::{EcrGateway, RegistryGateway, V2Gateway};
use sweep::run_sweep;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let policy = cli.policy()?;
    let oracle = PgFleetOracle::from_env(cli.fleet_db_url.as_deref(), cli.exclude_sites.clone())?;

    let gateway: Arc<dyn RegistryGateway> = match cli.backend {
        Backend::Ecr => Arc::new(EcrGateway::from_env().await),
        Backend::RegistryV2 => {
            // clap enforces --registry for this backend
            let url = cli.registry.as_deref().unwrap_or_default();
            Arc::new(V2Gateway::new(url))
        }
    };

    // Batch-level delete failures are itemized in the report and do not
    // change the exit status; only a fatal abort exits non-zero.
    let report = run_sweep(gateway, &oracle, &policy, cli.dry_run).await?;
    report.print();

    if cli.backend == Backend::RegistryV2 && !cli.dry_run && report.total_images() > 0 {
        report::print_gc_reminder();
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "regsweep=debug" } else { "regsweep=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Diagnostics go to stderr; stdout carries only the report.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
