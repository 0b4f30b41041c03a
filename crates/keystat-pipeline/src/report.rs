//! Run reports

use keystat_core::InstanceDescriptor;
use serde::Serialize;

/// Step of the per-instance work that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Snapshot,
    Extract,
    Write,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot => write!(f, "snapshot"),
            Self::Extract => write!(f, "extract"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstanceOutcome {
    Written { points: usize },
    Failed { stage: FailureStage, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceReport {
    pub instance: InstanceDescriptor,
    pub outcome: InstanceOutcome,
}

impl InstanceReport {
    pub fn is_written(&self) -> bool {
        matches!(self.outcome, InstanceOutcome::Written { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceOutcome {
    /// The registry knows no live instance; not an error
    NoInstances,
    RegistryFailed { error: String },
    Processed { instances: Vec<InstanceReport> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceReport {
    pub service: String,
    pub outcome: ServiceOutcome,
}

impl ServiceReport {
    pub fn instances(&self) -> &[InstanceReport] {
        match &self.outcome {
            ServiceOutcome::Processed { instances } => instances,
            _ => &[],
        }
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub services: Vec<ServiceReport>,
}

impl RunReport {
    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.service == name)
    }

    /// Batches written successfully
    pub fn batches_written(&self) -> usize {
        self.services
            .iter()
            .flat_map(|s| s.instances())
            .filter(|i| i.is_written())
            .count()
    }

    pub fn points_written(&self) -> usize {
        self.services
            .iter()
            .flat_map(|s| s.instances())
            .map(|i| match i.outcome {
                InstanceOutcome::Written { points } => points,
                InstanceOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    /// Failed instances plus services whose lookup failed
    pub fn failures(&self) -> usize {
        self.services
            .iter()
            .map(|s| match &s.outcome {
                ServiceOutcome::RegistryFailed { .. } => 1,
                ServiceOutcome::Processed { instances } => {
                    instances.iter().filter(|i| !i.is_written()).count()
                }
                ServiceOutcome::NoInstances => 0,
            })
            .sum()
    }

    /// True when nothing failed; services without instances count as success
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} service(s), {} batch(es) written ({} points), {} failure(s)",
            self.services.len(),
            self.batches_written(),
            self.points_written(),
            self.failures()
        )
    }
}
