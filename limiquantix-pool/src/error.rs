//! Error types for the storage pool provider.

use thiserror::Error;

/// Errors that can occur while inspecting or reconciling storage pools.
#[derive(Error, Debug)]
pub enum PoolError {
    /// An external command exited with a non-zero status.
    #[error(
        "{command} {} failed (exit code {}): {}",
        .args.join(" "),
        display_exit_code(.exit_code),
        .stderr.trim()
    )]
    ExternalCommand {
        command: String,
        args: Vec<String>,
        stderr: String,
        exit_code: Option<i32>,
    },

    /// The external command could not be started at all.
    #[error("Failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The pool descriptor could not be registered with the hypervisor.
    #[error("Unable to define pool {name}: {reason}")]
    DefineFailed { name: String, reason: String },

    /// A pool listing row did not have the `name state autostart` shape.
    #[error("Malformed pool-list line: {line:?}")]
    MalformedListing { line: String },

    /// XML generation/parsing error.
    #[error("Descriptor error: {0}")]
    Descriptor(String),

    /// The desired pool specification is unusable.
    #[error("Invalid pool specification: {0}")]
    InvalidSpec(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Exit code of a failed external command, if this is one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PoolError::ExternalCommand { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

fn display_exit_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
