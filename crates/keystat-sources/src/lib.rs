//! # keystat-sources
//!
//! The external systems keystat talks to, each behind a trait so the pipeline
//! can be driven by in-memory mocks in tests.
//!
//! This crate provides:
//! - Service registry lookup (Consul catalog)
//! - Instance statistics source (Redis-compatible INFO)
//! - Time-series write sink (InfluxDB 1.x HTTP API, or stdout for dry runs)

mod dsn;
pub mod line_protocol;
mod registry;
mod sink;
mod store;

pub use dsn::InfluxDsn;
pub use registry::{ConsulRegistry, InstanceRegistry, MockRegistry};
pub use sink::{InfluxSink, PointSink, RecordingSink, StdoutSink, WrittenBatch};
pub use store::{MockFailure, MockStatsSource, RedisStatsSource, StatsSource};
