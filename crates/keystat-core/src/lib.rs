//! # keystat-core
//!
//! Core types for the keystat metrics collector.
//!
//! keystat polls a service registry for the live instances of a data-store
//! service, reads each instance's runtime counters, reshapes them into a fixed
//! metric set and writes them to a time-series store tagged by service,
//! instance and node.
//!
//! This crate holds what every other crate shares:
//! - The data model (instances, tags, metric points)
//! - The unified error type
//! - Collector configuration (defaults, TOML file, environment)
//! - Retry helpers for transient failures

pub mod config;
mod error;
pub mod retry;
mod types;

pub use config::CollectorConfig;
pub use error::{KeystatError, Result};
pub use types::*;
