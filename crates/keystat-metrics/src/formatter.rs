//! Point formatter

use chrono::{DateTime, Utc};
use keystat_core::{MetricPoint, TagSet};

use crate::extractor::NormalizedMetrics;

/// Turn normalized metrics into one time-series point per metric
///
/// All points share `tags` and a single timestamp. When `timestamp` is `None`
/// the current UTC instant is read once and used for the whole batch.
pub fn format(
    metrics: &NormalizedMetrics,
    timestamp: Option<DateTime<Utc>>,
    tags: &TagSet,
) -> Vec<MetricPoint> {
    let time = timestamp.unwrap_or_else(Utc::now);

    metrics
        .iter()
        .map(|(name, value)| MetricPoint {
            measurement: name.to_string(),
            tags: tags.clone(),
            time,
            value,
        })
        .collect()
}
