//! Stat extractor
//!
//! Reduces a raw snapshot to the fixed set of normalized metrics. Every key in
//! the set is always emitted; a missing source field yields zero.

use keystat_core::{KeystatError, MetricValue, Result};
use std::collections::BTreeMap;
use tracing::trace;

use crate::commands::command_groups;
use crate::snapshot::RawStatSnapshot;

/// Highest logical database index scanned for the item count
///
/// Databases `db0` through `db9` are summed; higher indices are ignored.
pub const MAX_LOGICAL_DATABASE: u32 = 9;

/// Metric holding the key count summed over logical databases
pub const ITEM_COUNT_METRIC: &str = "CurrItems";

/// Field type a direct metric is always written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Integer,
    Float,
}

impl ValueKind {
    fn coerce(self, value: Option<MetricValue>) -> MetricValue {
        match self {
            Self::Integer => MetricValue::Integer(value.map_or(0, |v| v.as_i64())),
            Self::Float => MetricValue::Float(value.map_or(0.0, |v| v.as_f64())),
        }
    }
}

/// Metrics copied straight from a snapshot field: (metric, source field, kind)
const DIRECT_METRICS: &[(&str, &str, ValueKind)] = &[
    ("CurrConnections", "connected_clients", ValueKind::Integer),
    ("Evictions", "evicted_keys", ValueKind::Integer),
    ("Reclaimed", "expired_keys", ValueKind::Integer),
    ("CacheHits", "keyspace_hits", ValueKind::Integer),
    ("CacheMisses", "keyspace_misses", ValueKind::Integer),
    ("BytesUsedForCache", "used_memory", ValueKind::Integer),
    ("IOPS", "instantaneous_ops_per_sec", ValueKind::Integer),
    ("InputThroughput", "instantaneous_input_kbps", ValueKind::Float),
    ("OutputThroughput", "instantaneous_output_kbps", ValueKind::Float),
];

/// Normalized metrics of one instance for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedMetrics {
    values: BTreeMap<String, MetricValue>,
}

impl NormalizedMetrics {
    pub fn get(&self, name: &str) -> Option<MetricValue> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, MetricValue)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(String::as_str)
    }
}

impl FromIterator<(String, MetricValue)> for NormalizedMetrics {
    fn from_iter<I: IntoIterator<Item = (String, MetricValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Every metric name `extract` emits
pub fn metric_names() -> Vec<&'static str> {
    DIRECT_METRICS
        .iter()
        .map(|(metric, _, _)| *metric)
        .chain(std::iter::once(ITEM_COUNT_METRIC))
        .chain(command_groups().iter().map(|group| group.metric))
        .collect()
}

/// Reduce a raw snapshot to normalized metrics
///
/// Absent fields contribute zero. The throughput gauges are always floats and
/// every other metric an integer. Fails with `MalformedSnapshot` when a present
/// field has the wrong shape or a sum overflows.
pub fn extract(snapshot: &RawStatSnapshot) -> Result<NormalizedMetrics> {
    let mut values = BTreeMap::new();

    for (metric, field, kind) in DIRECT_METRICS {
        let value = kind.coerce(snapshot.numeric(field)?);
        values.insert(metric.to_string(), value);
    }

    let mut items = 0i64;
    for index in 0..=MAX_LOGICAL_DATABASE {
        let keys = snapshot.sub_count(&format!("db{}", index), "keys")?;
        items = add_count(items, keys, ITEM_COUNT_METRIC)?;
    }
    values.insert(ITEM_COUNT_METRIC.to_string(), MetricValue::Integer(items));

    for group in command_groups() {
        let mut calls = 0i64;
        for command in &group.commands {
            let count = snapshot.sub_count(&format!("cmdstat_{}", command), "calls")?;
            calls = add_count(calls, count, group.metric)?;
        }
        trace!("{} = {}", group.metric, calls);
        values.insert(group.metric.to_string(), MetricValue::Integer(calls));
    }

    Ok(NormalizedMetrics { values })
}

fn add_count(total: i64, count: i64, metric: &str) -> Result<i64> {
    total
        .checked_add(count)
        .ok_or_else(|| KeystatError::MalformedSnapshot(format!("{} overflows i64", metric)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{parse_info, StatValue};

    fn int(metrics: &NormalizedMetrics, name: &str) -> i64 {
        match metrics.get(name) {
            Some(MetricValue::Integer(v)) => v,
            other => panic!("{} should be an integer, got {:?}", name, other),
        }
    }

    fn scenario_snapshot() -> RawStatSnapshot {
        RawStatSnapshot::new()
            .with("connected_clients", 5_i64)
            .with("keyspace_hits", 100_i64)
            .with("keyspace_misses", 10_i64)
            .with("db0", StatValue::map([("keys", 3_i64)]))
            .with("cmdstat_get", StatValue::map([("calls", 7_i64)]))
            .with("cmdstat_set", StatValue::map([("calls", 2_i64)]))
    }

    #[test]
    fn test_empty_snapshot_has_full_key_set() {
        let metrics = extract(&RawStatSnapshot::new()).unwrap();

        let mut expected = metric_names();
        expected.sort_unstable();
        let names: Vec<_> = metrics.names().collect();
        assert_eq!(names, expected);
        assert_eq!(metrics.len(), 20);

        for (name, value) in metrics.iter() {
            assert_eq!(value.as_f64(), 0.0, "{} should default to 0", name);
        }
        assert_eq!(metrics.get("InputThroughput"), Some(MetricValue::Float(0.0)));
        assert_eq!(metrics.get("OutputThroughput"), Some(MetricValue::Float(0.0)));
        assert_eq!(metrics.get("IOPS"), Some(MetricValue::Integer(0)));
    }

    #[test]
    fn test_scenario_snapshot() {
        let metrics = extract(&scenario_snapshot()).unwrap();

        assert_eq!(int(&metrics, "CurrConnections"), 5);
        assert_eq!(int(&metrics, "CacheHits"), 100);
        assert_eq!(int(&metrics, "CacheMisses"), 10);
        assert_eq!(int(&metrics, "CurrItems"), 3);
        assert_eq!(int(&metrics, "GetTypeCmds"), 7);
        assert_eq!(int(&metrics, "SetTypeCmds"), 2);
        // get and set are string commands too, so both count toward the
        // key-based and string groups
        assert_eq!(int(&metrics, "KeyBasedCmds"), 9);
        assert_eq!(int(&metrics, "StringBasedCmds"), 9);

        for name in [
            "HashBasedCmds",
            "ListBasedCmds",
            "SetBasedCmds",
            "SortedSetBasedCmds",
            "HyperLogLogBasedCmds",
            "EvalBasedCmds",
        ] {
            assert_eq!(int(&metrics, name), 0, "{}", name);
        }
        assert_eq!(int(&metrics, "Evictions"), 0);
    }

    #[test]
    fn test_key_set_independent_of_content() {
        let empty = extract(&RawStatSnapshot::new()).unwrap();
        let full = extract(&scenario_snapshot()).unwrap();
        assert!(empty.names().eq(full.names()));
    }

    #[test]
    fn test_item_count_scans_only_first_ten_databases() {
        let snapshot = RawStatSnapshot::new()
            .with("db0", StatValue::map([("keys", 1_i64)]))
            .with("db9", StatValue::map([("keys", 10_i64)]))
            .with("db10", StatValue::map([("keys", 1000_i64)]))
            .with("db15", StatValue::map([("keys", 5000_i64)]));

        let metrics = extract(&snapshot).unwrap();
        assert_eq!(int(&metrics, "CurrItems"), 11);
    }

    #[test]
    fn test_malformed_database_beyond_bound_is_ignored() {
        let snapshot = RawStatSnapshot::new().with("db12", "garbage");
        assert!(extract(&snapshot).is_ok());
    }

    #[test]
    fn test_shared_command_counts_in_every_group() {
        let snapshot = RawStatSnapshot::new()
            .with("cmdstat_pfadd", StatValue::map([("calls", 4_i64)]))
            .with("cmdstat_eval", StatValue::map([("calls", 6_i64)]));

        let metrics = extract(&snapshot).unwrap();
        assert_eq!(int(&metrics, "HyperLogLogBasedCmds"), 4);
        assert_eq!(int(&metrics, "SetTypeCmds"), 4);
        assert_eq!(int(&metrics, "KeyBasedCmds"), 4);
        assert_eq!(int(&metrics, "EvalBasedCmds"), 6);
        assert_eq!(int(&metrics, "GetTypeCmds"), 0);
    }

    #[test]
    fn test_unclassified_commands_ignored() {
        let snapshot = RawStatSnapshot::new()
            .with("cmdstat_ping", StatValue::map([("calls", 50_i64)]))
            .with("cmdstat_info", StatValue::map([("calls", 3_i64)]));

        let metrics = extract(&snapshot).unwrap();
        assert!(metrics.iter().all(|(_, v)| v.as_f64() == 0.0));
    }

    #[test]
    fn test_float_gauges_kept_as_floats() {
        let snapshot = parse_info(
            "instantaneous_input_kbps:1.25\n\
             instantaneous_output_kbps:0.50\n\
             instantaneous_ops_per_sec:17\n\
             used_memory:1048576",
        );

        let metrics = extract(&snapshot).unwrap();
        assert_eq!(metrics.get("InputThroughput"), Some(MetricValue::Float(1.25)));
        assert_eq!(metrics.get("OutputThroughput"), Some(MetricValue::Float(0.5)));
        assert_eq!(int(&metrics, "IOPS"), 17);
        assert_eq!(int(&metrics, "BytesUsedForCache"), 1_048_576);
    }

    #[test]
    fn test_malformed_snapshot_errors() {
        let not_a_map = RawStatSnapshot::new().with("db3", 42_i64);
        assert!(matches!(
            extract(&not_a_map),
            Err(KeystatError::MalformedSnapshot(_))
        ));

        let bad_calls =
            RawStatSnapshot::new().with("cmdstat_hget", StatValue::map([("calls", "n/a")]));
        assert!(matches!(
            extract(&bad_calls),
            Err(KeystatError::MalformedSnapshot(_))
        ));

        let bad_direct = RawStatSnapshot::new().with("evicted_keys", "lots");
        assert!(matches!(
            extract(&bad_direct),
            Err(KeystatError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_whole_number_gauges_stay_floats() {
        let snapshot = parse_info("instantaneous_input_kbps:0\ninstantaneous_output_kbps:12");

        let metrics = extract(&snapshot).unwrap();
        assert_eq!(metrics.get("InputThroughput"), Some(MetricValue::Float(0.0)));
        assert_eq!(metrics.get("OutputThroughput"), Some(MetricValue::Float(12.0)));
    }

    #[test]
    fn test_call_count_overflow_is_malformed() {
        let snapshot = RawStatSnapshot::new()
            .with("cmdstat_get", StatValue::map([("calls", i64::MAX)]))
            .with("cmdstat_set", StatValue::map([("calls", 1_i64)]));

        assert!(matches!(
            extract(&snapshot),
            Err(KeystatError::MalformedSnapshot(msg)) if msg.contains("overflows")
        ));
    }

    #[test]
    fn test_item_count_overflow_is_malformed() {
        let snapshot = RawStatSnapshot::new()
            .with("db0", StatValue::map([("keys", i64::MAX)]))
            .with("db1", StatValue::map([("keys", 1_i64)]));

        assert!(matches!(
            extract(&snapshot),
            Err(KeystatError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let snapshot = scenario_snapshot();
        assert_eq!(extract(&snapshot).unwrap(), extract(&snapshot).unwrap());
    }
}
