//! # keystat-pipeline
//!
//! Drives one collection run: for each service, look up its instances; for
//! each instance, read a snapshot, extract metrics, format points and write
//! them as one batch.
//!
//! Failures are isolated. A registry failure skips its service and a failed
//! instance is reported without stopping the others.

mod driver;
mod report;

pub use driver::{Pipeline, PipelineConfig};
pub use report::{
    FailureStage, InstanceOutcome, InstanceReport, RunReport, ServiceOutcome, ServiceReport,
};
