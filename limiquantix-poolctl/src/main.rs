//! # limiquantix Pool Control
//!
//! Converges the libvirt storage pools of the local hypervisor to a YAML
//! manifest by driving `virsh`.
//!
//! ## Usage
//! ```bash
//! limiquantix-poolctl --config /etc/limiquantix/pools.yaml apply
//! limiquantix-poolctl watch --interval-secs 120
//! limiquantix-poolctl list --json
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use limiquantix_common::TimedOperation;
use limiquantix_pool::{
    build_descriptor, reconcile_all, CommandRunner, InventoryLister, MockVirsh, PassReport,
    PoolOutcome, PoolSpec, SystemRunner, Virsh,
};

mod cli;
mod config;

use cli::{Args, Command};
use config::{Config, LogFormat, VirshBackend, DEFAULT_CONFIG_PATH};

type SharedVirsh = Virsh<Arc<dyn CommandRunner>>;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    let config = load_config(&args)?;

    match config.logging.format {
        LogFormat::Json => limiquantix_common::init_logging_json(&config.logging.level)?,
        LogFormat::Pretty => limiquantix_common::init_logging(&config.logging.level)?,
    }

    let virsh = build_virsh(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.virsh.backend,
        binary = %virsh.binary(),
        connect_uri = virsh.connect_uri().unwrap_or("default"),
        pools = config.pools.len(),
        "Starting limiquantix pool control"
    );

    match args.command {
        Command::Apply { json } => {
            let report = run_pass(virsh, config.pools.clone()).await?;
            print_pass(&report, json)?;
            if report.failures() > 0 {
                bail!("{} pool(s) failed to converge", report.failures());
            }
        }
        Command::Watch { interval_secs } => {
            let interval = interval_secs.unwrap_or(config.watch.interval_secs);
            if interval == 0 {
                bail!("--interval-secs must be greater than zero");
            }
            watch(virsh, config.pools.clone(), Duration::from_secs(interval)).await?;
        }
        Command::List { json } => {
            let records =
                tokio::task::spawn_blocking(move || InventoryLister::new(&virsh).list_all())
                    .await
                    .context("Listing task panicked")??;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                println!(" {:<20} {:<10} {}", "Name", "State", "Autostart");
                println!("{}", "-".repeat(44));
                for record in &records {
                    println!(
                        " {:<20} {:<10} {}",
                        record.name(),
                        if record.active() { "active" } else { "inactive" },
                        if record.autostart() { "yes" } else { "no" }
                    );
                }
            }
        }
        Command::Status { name } => {
            let lookup = name.clone();
            let status =
                tokio::task::spawn_blocking(move || InventoryLister::new(&virsh).status(&lookup))
                    .await
                    .context("Status task panicked")??;
            println!("{}: {}", name, status);
        }
        Command::Render { name } => {
            let spec = config
                .pool(&name)
                .with_context(|| format!("Pool '{}' is not declared in the manifest", name))?;
            print!("{}", build_descriptor(spec)?);
        }
    }

    Ok(())
}

/// Explicit `--config` must load; the default path is optional.
fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::load(DEFAULT_CONFIG_PATH)?,
        None => Config::default(),
    };

    Ok(config.with_cli_overrides(args))
}

fn build_virsh(config: &Config) -> SharedVirsh {
    let runner: Arc<dyn CommandRunner> = match config.virsh.backend {
        VirshBackend::Virsh => Arc::new(SystemRunner),
        VirshBackend::Mock => {
            warn!("Using mock virsh backend, no hypervisor changes will be made");
            Arc::new(MockVirsh::new())
        }
    };

    let virsh = Virsh::new(runner).with_binary(config.virsh.binary.clone());
    match &config.virsh.connect_uri {
        Some(uri) => virsh.with_connect_uri(uri.clone()),
        None => virsh,
    }
}

/// One reconciliation pass on a blocking worker thread.
async fn run_pass(virsh: SharedVirsh, specs: Vec<PoolSpec>) -> Result<PassReport> {
    let op = TimedOperation::start("reconcile-pass");
    let report = tokio::task::spawn_blocking(move || reconcile_all(&virsh, &specs))
        .await
        .context("Reconciliation task panicked")??;
    op.finish();
    Ok(report)
}

/// Run passes every `interval` until Ctrl-C. Passes never overlap.
async fn watch(virsh: SharedVirsh, specs: Vec<PoolSpec>, interval: Duration) -> Result<()> {
    info!(interval_secs = interval.as_secs(), "Watching storage pools");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for shutdown signal")?;
                info!("Shutdown requested, stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {
                match run_pass(virsh.clone(), specs.clone()).await {
                    Ok(report) if report.failures() > 0 => {
                        warn!(failed = report.failures(), "Pass finished with failures");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Reconciliation pass failed"),
                }
            }
        }
    }
}

fn print_pass(report: &PassReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for outcome in &report.pools {
        match outcome {
            PoolOutcome::Converged(pool) if pool.changed() => {
                let actions: Vec<&str> = pool.actions.iter().map(|a| a.as_str()).collect();
                println!("{}: changed ({})", pool.name, actions.join(", "));
                for failure in &pool.soft_failures {
                    println!(
                        "  ignored {} failure: {}",
                        failure.action.as_str(),
                        failure.message.trim()
                    );
                }
            }
            PoolOutcome::Converged(pool) => println!("{}: unchanged", pool.name),
            PoolOutcome::Failed { name, error } => println!("{}: FAILED: {}", name, error),
        }
    }
    println!(
        "{} pool(s), {} changed, {} failed",
        report.pools.len(),
        report.changed(),
        report.failures()
    );
    Ok(())
}
