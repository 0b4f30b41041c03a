//! Pipeline driver

use futures::stream::{self, StreamExt};
use keystat_core::retry::retry_with_backoff;
use keystat_core::{
    CollectorConfig, InstanceDescriptor, KeystatError, Result, RetentionPolicy, TagSet,
    TimePrecision,
};
use keystat_metrics::{extract, format};
use keystat_sources::{InstanceRegistry, PointSink, StatsSource};
use tracing::{debug, info, warn};

use crate::report::{
    FailureStage, InstanceOutcome, InstanceReport, RunReport, ServiceOutcome, ServiceReport,
};

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Timestamp precision used on write
    pub precision: TimePrecision,
    /// Retention policy created with a new database
    pub retention: RetentionPolicy,
    /// Attempts per batch write
    pub write_attempts: usize,
    /// Instances of one service processed at once
    pub max_concurrency: usize,
}

impl PipelineConfig {
    pub fn with_precision(mut self, precision: TimePrecision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_write_attempts(mut self, attempts: usize) -> Self {
        self.write_attempts = attempts.max(1);
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }
}

impl From<&CollectorConfig> for PipelineConfig {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            precision: config.time_precision,
            retention: config.retention_policy(),
            write_attempts: config.write_attempts.max(1),
            max_concurrency: config.max_concurrency.max(1),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&CollectorConfig::default())
    }
}

/// The collection pipeline
pub struct Pipeline<R: InstanceRegistry, S: StatsSource, K: PointSink> {
    registry: R,
    source: S,
    sink: K,
    config: PipelineConfig,
}

impl<R: InstanceRegistry, S: StatsSource, K: PointSink> Pipeline<R, S, K> {
    pub fn new(registry: R, source: S, sink: K, config: PipelineConfig) -> Self {
        Self {
            registry,
            source,
            sink,
            config,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Prepare storage, then collect every service in order
    ///
    /// Only storage setup is fatal; per-service and per-instance failures are
    /// recorded in the report.
    pub async fn run(&self, services: &[String]) -> Result<RunReport> {
        self.sink.ensure_storage(&self.config.retention).await?;

        let mut report = RunReport::default();
        for service in services {
            report.services.push(self.run_service(service).await);
        }
        info!("Run complete: {}", report.summary());
        Ok(report)
    }

    /// Collect every live instance of one service
    pub async fn run_service(&self, service: &str) -> ServiceReport {
        let instances = match self.registry.lookup(service).await {
            Ok(instances) => instances,
            Err(e) => {
                warn!("Skipping service {}: {}", service, e);
                return ServiceReport {
                    service: service.to_string(),
                    outcome: ServiceOutcome::RegistryFailed {
                        error: e.to_string(),
                    },
                };
            }
        };

        if instances.is_empty() {
            warn!("No instances found for service {}", service);
            return ServiceReport {
                service: service.to_string(),
                outcome: ServiceOutcome::NoInstances,
            };
        }

        info!("Collecting {} instance(s) of {}", instances.len(), service);
        let reports: Vec<InstanceReport> = stream::iter(instances)
            .map(|instance| self.process_instance(service, instance))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;

        ServiceReport {
            service: service.to_string(),
            outcome: ServiceOutcome::Processed { instances: reports },
        }
    }

    /// Snapshot, extract, format and write one instance
    pub async fn process_instance(
        &self,
        service: &str,
        instance: InstanceDescriptor,
    ) -> InstanceReport {
        let outcome = match self.collect_instance(service, &instance).await {
            Ok(points) => {
                info!("{}/{}: wrote {} points", service, instance.id, points);
                InstanceOutcome::Written { points }
            }
            Err((stage, e)) => {
                warn!(
                    "{}/{} ({}) failed at {}: {}",
                    service,
                    instance.id,
                    instance.endpoint(),
                    stage,
                    e
                );
                InstanceOutcome::Failed {
                    stage,
                    error: e.to_string(),
                }
            }
        };
        InstanceReport { instance, outcome }
    }

    async fn collect_instance(
        &self,
        service: &str,
        instance: &InstanceDescriptor,
    ) -> std::result::Result<usize, (FailureStage, KeystatError)> {
        let snapshot = self
            .source
            .fetch_snapshot(&instance.address, instance.port)
            .await
            .map_err(|e| (FailureStage::Snapshot, e))?;
        debug!("{}: snapshot has {} fields", instance.id, snapshot.len());

        let metrics = extract(&snapshot).map_err(|e| (FailureStage::Extract, e))?;

        let tags = TagSet::for_instance(service, instance);
        let points = format(&metrics, None, &tags);

        retry_with_backoff(
            "write_points",
            || self.sink.write_points(&points, &tags, self.config.precision),
            self.config.write_attempts,
        )
        .await
        .map_err(|e| (FailureStage::Write, e))?;

        Ok(points.len())
    }
}
