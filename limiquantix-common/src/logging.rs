//! Logging initialization using tracing.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the tracing subscriber with the specified log level.
///
/// `RUST_LOG` takes precedence over `level` when it is set.
///
/// # Arguments
/// * `level` - Log level string (trace, debug, info, warn, error)
///
/// # Example
/// ```no_run
/// limiquantix_common::init_logging("info").unwrap();
/// ```
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
        );

    subscriber.try_init()?;

    Ok(())
}

/// Initialize logging with JSON output format.
/// Suitable for production environments with log aggregation.
pub fn init_logging_json(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(
            fmt::layer()
                .json()
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .flatten_event(true)
        );

    subscriber.try_init()?;

    Ok(())
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Measures a named operation and logs its duration when finished.
///
/// ```
/// use limiquantix_common::TimedOperation;
///
/// let op = TimedOperation::start("reconcile-pass");
/// let elapsed_ms = op.finish();
/// assert!(elapsed_ms >= 0);
/// ```
#[derive(Debug, Clone)]
pub struct TimedOperation {
    name: String,
    started_at: DateTime<Utc>,
}

impl TimedOperation {
    /// Start timing an operation.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Utc::now(),
        }
    }

    /// When the operation started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Log the elapsed time and return it in milliseconds.
    pub fn finish(self) -> i64 {
        let elapsed_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(operation = %self.name, elapsed_ms, "Operation finished");
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_operation_records_start() {
        let before = Utc::now();
        let op = TimedOperation::start("test");
        assert!(op.started_at() >= before);
        assert!(op.finish() >= 0);
    }
}
