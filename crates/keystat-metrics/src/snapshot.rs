//! Raw statistics snapshot
//!
//! A snapshot is a loosely structured tree: most fields are scalars, while
//! per-database (`db0`) and per-command (`cmdstat_get`) fields are small maps.
//! Reads are tolerant of absent fields and strict about present fields that
//! have the wrong shape.

use keystat_core::{KeystatError, MetricValue, Result};
use std::collections::BTreeMap;

/// A value in a raw statistics snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Map(BTreeMap<String, StatValue>),
}

impl StatValue {
    /// Build a nested map value from key/value pairs
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<StatValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parse a scalar as the store prints it: integer, decimal, or text
    pub fn parse_scalar(raw: &str) -> Self {
        let raw = raw.trim();
        if let Ok(v) = raw.parse::<i64>() {
            return Self::Integer(v);
        }
        if raw.contains('.') {
            if let Ok(v) = raw.parse::<f64>() {
                return Self::Float(v);
            }
        }
        Self::Text(raw.to_string())
    }

    /// Parse a field value, which is either a scalar or a `k=v,k=v` list
    pub fn parse_field(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('=') {
            let mut entries = BTreeMap::new();
            for item in raw.split(',') {
                match item.rsplit_once('=') {
                    Some((k, v)) => {
                        entries.insert(k.trim().to_string(), Self::parse_scalar(v));
                    }
                    None => return Self::parse_scalar(raw),
                }
            }
            return Self::Map(entries);
        }
        Self::parse_scalar(raw)
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Map(_) => "map",
        }
    }
}

impl From<i64> for StatValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for StatValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for StatValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One point-in-time read of an instance's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStatSnapshot {
    fields: BTreeMap<String, StatValue>,
}

impl RawStatSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<StatValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<StatValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&StatValue> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge another snapshot into this one; its fields win on collision
    pub fn merge(&mut self, other: RawStatSnapshot) {
        self.fields.extend(other.fields);
    }

    /// Numeric scalar field; `None` when absent
    pub fn numeric(&self, field: &str) -> Result<Option<MetricValue>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(StatValue::Integer(v)) => Ok(Some(MetricValue::Integer(*v))),
            Some(StatValue::Float(v)) => Ok(Some(MetricValue::Float(*v))),
            Some(other) => Err(KeystatError::MalformedSnapshot(format!(
                "field {} should be numeric, found {}",
                field,
                other.kind()
            ))),
        }
    }

    /// Integer sub-field of a nested map field, e.g. `db0.keys`
    ///
    /// An absent field or absent sub-field reads as zero. A field that is not
    /// a map, or a sub-field that is not numeric, is a malformed snapshot.
    pub fn sub_count(&self, field: &str, sub_field: &str) -> Result<i64> {
        let entries = match self.fields.get(field) {
            None => return Ok(0),
            Some(StatValue::Map(entries)) => entries,
            Some(other) => {
                return Err(KeystatError::MalformedSnapshot(format!(
                    "field {} should be a map, found {}",
                    field,
                    other.kind()
                )))
            }
        };

        match entries.get(sub_field) {
            None => Ok(0),
            Some(StatValue::Integer(v)) => Ok(*v),
            Some(StatValue::Float(v)) if v.is_finite() => Ok(*v as i64),
            Some(other) => Err(KeystatError::MalformedSnapshot(format!(
                "{}.{} should be numeric, found {}",
                field,
                sub_field,
                other.kind()
            ))),
        }
    }
}

impl FromIterator<(String, StatValue)> for RawStatSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, StatValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// Parse an INFO reply into a snapshot
///
/// Section headers (`# Server`) and blank lines are skipped, as are lines
/// without a `field:value` separator.
pub fn parse_info(text: &str) -> RawStatSnapshot {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(field, value)| (field.trim().to_string(), StatValue::parse_field(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_SAMPLE: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
uptime_in_seconds:86400\r\n\
\r\n\
# Clients\r\n\
connected_clients:5\r\n\
\r\n\
# Stats\r\n\
instantaneous_ops_per_sec:12\r\n\
instantaneous_input_kbps:0.37\r\n\
keyspace_hits:100\r\n\
\r\n\
# Keyspace\r\n\
db0:keys=3,expires=1,avg_ttl=5000\r\n";

    #[test]
    fn test_parse_scalars() {
        let snapshot = parse_info(INFO_SAMPLE);
        assert_eq!(snapshot.get("connected_clients"), Some(&StatValue::Integer(5)));
        assert_eq!(snapshot.get("instantaneous_input_kbps"), Some(&StatValue::Float(0.37)));
        assert_eq!(snapshot.get("redis_version"), Some(&StatValue::Text("7.2.4".into())));
        assert!(snapshot.get("Server").is_none());
    }

    #[test]
    fn test_parse_nested_fields() {
        let snapshot = parse_info(INFO_SAMPLE);
        assert_eq!(snapshot.sub_count("db0", "keys").unwrap(), 3);
        assert_eq!(snapshot.sub_count("db0", "expires").unwrap(), 1);

        let commands =
            parse_info("cmdstat_get:calls=7,usec=12,usec_per_call=1.71,rejected_calls=0\n");
        assert_eq!(commands.sub_count("cmdstat_get", "calls").unwrap(), 7);
        match commands.get("cmdstat_get") {
            Some(StatValue::Map(entries)) => {
                assert_eq!(entries.get("usec_per_call"), Some(&StatValue::Float(1.71)));
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_value_with_colons_split_once() {
        let snapshot =
            parse_info("executable:/usr/local/bin/redis-server\nconfig_file:\nrole:master");
        assert_eq!(
            snapshot.get("executable"),
            Some(&StatValue::Text("/usr/local/bin/redis-server".into()))
        );
        assert_eq!(snapshot.get("config_file"), Some(&StatValue::Text(String::new())));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn test_partial_pair_list_stays_scalar() {
        assert_eq!(
            StatValue::parse_field("a=1,plain"),
            StatValue::Text("a=1,plain".into())
        );
    }

    #[test]
    fn test_absent_reads_default() {
        let snapshot = RawStatSnapshot::new();
        assert_eq!(snapshot.numeric("connected_clients").unwrap(), None);
        assert_eq!(snapshot.sub_count("db0", "keys").unwrap(), 0);

        let snapshot = RawStatSnapshot::new().with("db0", StatValue::map([("expires", 2_i64)]));
        assert_eq!(snapshot.sub_count("db0", "keys").unwrap(), 0);
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let snapshot = RawStatSnapshot::new()
            .with("db0", 3_i64)
            .with("cmdstat_get", StatValue::map([("calls", "many")]))
            .with("connected_clients", StatValue::map([("count", 1_i64)]));

        assert!(matches!(
            snapshot.sub_count("db0", "keys"),
            Err(KeystatError::MalformedSnapshot(_))
        ));
        assert!(matches!(
            snapshot.sub_count("cmdstat_get", "calls"),
            Err(KeystatError::MalformedSnapshot(_))
        ));
        assert!(matches!(
            snapshot.numeric("connected_clients"),
            Err(KeystatError::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_merge_later_fields_win() {
        let mut info = parse_info("connected_clients:5\nused_memory:1024");
        info.merge(parse_info("used_memory:2048\ncmdstat_set:calls=2,usec=4,usec_per_call=2.00"));

        assert_eq!(info.len(), 3);
        assert_eq!(info.get("used_memory"), Some(&StatValue::Integer(2048)));
        assert_eq!(info.sub_count("cmdstat_set", "calls").unwrap(), 2);
    }
}
