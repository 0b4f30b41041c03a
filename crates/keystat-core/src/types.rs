//! Core type definitions for keystat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One live instance of a monitored service, as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Host name or IP address of the data store endpoint
    pub address: String,
    /// Port of the data store endpoint
    pub port: u16,
    /// Instance identifier, unique within a service
    pub id: String,
    /// Name of the node the instance runs on
    pub node: String,
}

impl InstanceDescriptor {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        id: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            port,
            id: id.into(),
            node: node.into(),
        }
    }

    /// `host:port` form used in log lines and store URLs
    pub fn endpoint(&self) -> String {
        format_endpoint(&self.address, self.port)
    }
}

/// Join a host and port, bracketing IPv6 literals (`[::1]:6379`)
pub fn format_endpoint(address: &str, port: u16) -> String {
    if address.contains(':') && !address.starts_with('[') {
        format!("[{}]:{}", address, port)
    } else {
        format!("{}:{}", address, port)
    }
}

/// Tags attached to every point of one instance's batch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSet {
    pub service: String,
    pub instance_id: String,
    pub node: String,
}

impl TagSet {
    pub fn new(
        service: impl Into<String>,
        instance_id: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            instance_id: instance_id.into(),
            node: node.into(),
        }
    }

    /// Tags for an instance of the given service
    pub fn for_instance(service: &str, instance: &InstanceDescriptor) -> Self {
        Self::new(service, instance.id.clone(), instance.node.clone())
    }

    /// Tag key/value pairs, sorted by key
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("instance", self.instance_id.as_str()),
            ("node", self.node.as_str()),
            ("service", self.service.as_str()),
        ]
    }
}

/// Numeric payload of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
}

impl Default for MetricValue {
    fn default() -> Self {
        Self::Integer(0)
    }
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    /// Integer view; floats are truncated toward zero
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Integer(v) => *v,
            Self::Float(v) => *v as i64,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A single time-series point: one metric of one instance at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Measurement name (the metric name)
    pub measurement: String,
    pub tags: TagSet,
    pub time: DateTime<Utc>,
    pub value: MetricValue,
}

/// Timestamp precision used when writing points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimePrecision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
    Hours,
}

impl TimePrecision {
    /// Value of the `precision` query parameter on write
    pub fn as_query_param(&self) -> &'static str {
        match self {
            Self::Nanoseconds => "n",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Express an instant as an integer count of this precision's unit
    pub fn timestamp(&self, time: &DateTime<Utc>) -> i64 {
        match self {
            Self::Nanoseconds => time
                .timestamp_nanos_opt()
                .unwrap_or_else(|| time.timestamp_micros().saturating_mul(1_000)),
            Self::Microseconds => time.timestamp_micros(),
            Self::Milliseconds => time.timestamp_millis(),
            Self::Seconds => time.timestamp(),
            Self::Minutes => time.timestamp().div_euclid(60),
            Self::Hours => time.timestamp().div_euclid(3_600),
        }
    }
}

impl std::fmt::Display for TimePrecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nanoseconds => write!(f, "ns"),
            Self::Microseconds => write!(f, "us"),
            Self::Milliseconds => write!(f, "ms"),
            Self::Seconds => write!(f, "s"),
            Self::Minutes => write!(f, "m"),
            Self::Hours => write!(f, "h"),
        }
    }
}

impl std::str::FromStr for TimePrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ns" | "n" => Ok(Self::Nanoseconds),
            "us" | "u" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            "m" => Ok(Self::Minutes),
            "h" => Ok(Self::Hours),
            _ => Err(format!("Invalid time precision: {}", s)),
        }
    }
}

impl TryFrom<String> for TimePrecision {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TimePrecision> for String {
    fn from(p: TimePrecision) -> Self {
        p.to_string()
    }
}

/// Retention policy created alongside a new time-series database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub name: String,
    /// Duration literal understood by the store, e.g. `30d` or `INF`
    pub duration: String,
    pub replication: u32,
}
