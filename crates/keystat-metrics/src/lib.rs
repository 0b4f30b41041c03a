//! # keystat-metrics
//!
//! The metrics transformation pipeline for keystat.
//!
//! This crate provides:
//! - The static command classification table
//! - A tolerant tree model of raw data-store statistics, with an INFO parser
//! - The extractor that reduces a snapshot to the fixed metric set
//! - The formatter that turns metrics into tagged time-series points

mod commands;
mod extractor;
mod formatter;
mod snapshot;

pub use commands::{command_groups, CommandGroup};
pub use extractor::{
    extract, metric_names, NormalizedMetrics, ITEM_COUNT_METRIC, MAX_LOGICAL_DATABASE,
};
pub use formatter::format;
pub use snapshot::{parse_info, RawStatSnapshot, StatValue};
