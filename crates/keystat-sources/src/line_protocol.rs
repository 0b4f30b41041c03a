//! InfluxDB line protocol encoding
//!
//! `measurement,tag=value,... value=<v> <timestamp>`

use keystat_core::{MetricPoint, MetricValue, TimePrecision};
use tracing::debug;

fn escape_measurement(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn field_value(value: MetricValue) -> Option<String> {
    match value {
        MetricValue::Integer(v) => Some(format!("{}i", v)),
        MetricValue::Float(v) if v.is_finite() => Some(format!("{}", v)),
        MetricValue::Float(_) => None,
    }
}

/// Encode one point; `None` for values the protocol cannot carry (NaN, infinity)
pub fn encode_point(point: &MetricPoint, precision: TimePrecision) -> Option<String> {
    let value = field_value(point.value)?;

    let mut line = escape_measurement(&point.measurement);
    for (key, tag_value) in point.tags.pairs() {
        // Empty tag values are not allowed by the protocol
        if tag_value.is_empty() {
            continue;
        }
        line.push(',');
        line.push_str(key);
        line.push('=');
        line.push_str(&escape_tag(tag_value));
    }
    line.push_str(" value=");
    line.push_str(&value);
    line.push(' ');
    line.push_str(&precision.timestamp(&point.time).to_string());
    Some(line)
}

/// Encode a batch, one line per point, skipping points that cannot be encoded
pub fn encode_batch(points: &[MetricPoint], precision: TimePrecision) -> String {
    points
        .iter()
        .filter_map(|point| {
            let line = encode_point(point, precision);
            if line.is_none() {
                debug!("Skipping non-finite value for {}", point.measurement);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
