//! # limiquantix Common
//!
//! Shared utilities for the limiquantix storage tooling.
//!
//! ## Logging
//!
//! ```no_run
//! use limiquantix_common::{init_logging, TimedOperation};
//!
//! // Initialize with level (RUST_LOG overrides it)
//! init_logging("info").unwrap();
//!
//! let op = TimedOperation::start("reconcile-pass");
//! // ... do work ...
//! op.finish();
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{
    init_logging,
    init_logging_json,
    TimedOperation,
};
