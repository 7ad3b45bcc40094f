//! Command-line argument parsing.

use clap::{Parser, Subcommand};

/// limiquantix pool control - converge libvirt storage pools to a manifest
#[derive(Parser, Debug)]
#[command(name = "limiquantix-poolctl")]
#[command(about = "limiquantix pool control - converge libvirt storage pools to a manifest")]
#[command(version)]
pub struct Args {
    /// Path to the pool manifest (defaults to /etc/limiquantix/pools.yaml if present)
    #[arg(short, long, env = "LIMIQUANTIX_POOLS_CONFIG")]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the manifest
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Libvirt connection URI passed to virsh (e.g. qemu:///system)
    #[arg(long)]
    pub connect: Option<String>,

    /// Enable development mode (in-memory mock instead of virsh)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one reconciliation pass over every pool in the manifest
    Apply {
        /// Print the pass report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile repeatedly until interrupted
    Watch {
        /// Seconds between passes; overrides the manifest
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// List all pools known to the hypervisor
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report whether a pool is defined
    Status {
        /// Pool name
        name: String,
    },

    /// Print the pool XML for a manifest entry without applying it
    Render {
        /// Pool name
        name: String,
    },
}
