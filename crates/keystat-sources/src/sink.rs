//! Time-series write sink

use async_trait::async_trait;
use keystat_core::{KeystatError, MetricPoint, Result, RetentionPolicy, TagSet, TimePrecision};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::dsn::InfluxDsn;
use crate::line_protocol::encode_batch;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for the store metric points are written to (allows mocking in tests)
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Create the target database and its default retention policy if the
    /// database does not exist yet. Safe to call on every run.
    async fn ensure_storage(&self, policy: &RetentionPolicy) -> Result<()>;

    /// Write one instance's batch
    async fn write_points(
        &self,
        points: &[MetricPoint],
        tags: &TagSet,
        precision: TimePrecision,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Check a `/query` response body for errors
fn check_query_response(body: &str) -> Result<QueryResponse> {
    let response: QueryResponse = serde_json::from_str(body)?;
    if let Some(error) = &response.error {
        return Err(KeystatError::SinkWrite(error.clone()));
    }
    if let Some(error) = response.results.iter().find_map(|r| r.error.as_ref()) {
        return Err(KeystatError::SinkWrite(error.clone()));
    }
    Ok(response)
}

/// Database names from a `SHOW DATABASES` response body
pub(crate) fn parse_databases(body: &str) -> Result<Vec<String>> {
    let response = check_query_response(body)?;
    Ok(response
        .results
        .iter()
        .flat_map(|r| &r.series)
        .flat_map(|s| &s.values)
        .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
        .collect())
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Statements creating the database and making `policy` its default
pub(crate) fn create_statements(database: &str, policy: &RetentionPolicy) -> [String; 2] {
    [
        format!("CREATE DATABASE {}", quote_ident(database)),
        format!(
            "CREATE RETENTION POLICY {} ON {} DURATION {} REPLICATION {} DEFAULT",
            quote_ident(&policy.name),
            quote_ident(database),
            policy.duration,
            policy.replication
        ),
    ]
}

/// Sink writing to an InfluxDB 1.x HTTP endpoint
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: reqwest::Client,
    dsn: InfluxDsn,
}

impl InfluxSink {
    pub fn new(dsn: InfluxDsn) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                KeystatError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;
        Ok(Self { client, dsn })
    }

    pub fn from_dsn(dsn: &str) -> Result<Self> {
        Self::new(InfluxDsn::parse(dsn)?)
    }

    pub fn dsn(&self) -> &InfluxDsn {
        &self.dsn
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.dsn.username {
            Some(user) => request.basic_auth(user, self.dsn.password.as_ref()),
            None => request,
        }
    }

    async fn query(&self, statement: &str) -> Result<String> {
        debug!("Query: {}", statement);
        let request = self
            .client
            .post(self.dsn.endpoint("query")?)
            .query(&[("q", statement)]);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| KeystatError::SinkWrite(format!("Failed to reach {}: {}", self.dsn, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KeystatError::SinkWrite(format!("Failed to read query response: {}", e)))?;

        if !status.is_success() {
            return Err(status_error("Query", status, &body));
        }
        check_query_response(&body)?;
        Ok(body)
    }
}

/// Server-side failures are retryable; anything else is a rejection of the
/// request itself and would fail the same way again.
fn status_error(what: &str, status: StatusCode, body: &str) -> KeystatError {
    let message = format!("{} returned {}: {}", what, status, body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        KeystatError::SinkWrite(message)
    } else {
        KeystatError::SinkRejected(message)
    }
}

#[async_trait]
impl PointSink for InfluxSink {
    #[instrument(skip(self, policy), fields(target = %self.dsn))]
    async fn ensure_storage(&self, policy: &RetentionPolicy) -> Result<()> {
        let databases = parse_databases(&self.query("SHOW DATABASES").await?)?;
        if databases.iter().any(|db| db == &self.dsn.database) {
            debug!("Database {} already exists", self.dsn.database);
            return Ok(());
        }

        for statement in create_statements(&self.dsn.database, policy) {
            self.query(&statement).await?;
        }
        info!(
            "Created database {} with retention policy {} ({}, replication {})",
            self.dsn.database, policy.name, policy.duration, policy.replication
        );
        Ok(())
    }

    #[instrument(
        skip(self, points, tags),
        fields(instance = %tags.instance_id, points = points.len())
    )]
    async fn write_points(
        &self,
        points: &[MetricPoint],
        tags: &TagSet,
        precision: TimePrecision,
    ) -> Result<()> {
        let body = encode_batch(points, precision);
        if body.is_empty() {
            return Ok(());
        }

        let request = self
            .client
            .post(self.dsn.endpoint("write")?)
            .query(&[
                ("db", self.dsn.database.as_str()),
                ("precision", precision.as_query_param()),
            ])
            .body(body);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| KeystatError::SinkWrite(format!("Failed to reach {}: {}", self.dsn, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(status_error("Write", status, &detail));
        }
        Ok(())
    }
}

/// Sink printing line protocol to stdout instead of writing it
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

#[async_trait]
impl PointSink for StdoutSink {
    async fn ensure_storage(&self, policy: &RetentionPolicy) -> Result<()> {
        debug!("Dry run: skipping storage setup ({})", policy.name);
        Ok(())
    }

    async fn write_points(
        &self,
        points: &[MetricPoint],
        _tags: &TagSet,
        precision: TimePrecision,
    ) -> Result<()> {
        let body = encode_batch(points, precision);
        if !body.is_empty() {
            println!("{}", body);
        }
        Ok(())
    }
}

/// A batch captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBatch {
    pub points: Vec<MetricPoint>,
    pub tags: TagSet,
    pub precision: TimePrecision,
}

/// In-memory sink for testing; records batches and can inject write failures
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<WrittenBatch>>,
    ensure_calls: AtomicUsize,
    write_calls: AtomicUsize,
    transient_failures: AtomicUsize,
    failing_instances: HashSet<String>,
    rejected_instances: HashSet<String>,
    storage_error: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes, whatever their instance
    pub fn with_transient_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every write for the given instance id
    pub fn with_failing_instance(mut self, instance_id: &str) -> Self {
        self.failing_instances.insert(instance_id.to_string());
        self
    }

    /// Reject every write for the given instance as a permanent failure
    pub fn with_rejected_instance(mut self, instance_id: &str) -> Self {
        self.rejected_instances.insert(instance_id.to_string());
        self
    }

    /// Fail storage setup with the given message
    pub fn with_storage_failure(mut self, message: &str) -> Self {
        self.storage_error = Some(message.to_string());
        self
    }

    pub async fn batches(&self) -> Vec<WrittenBatch> {
        self.batches.lock().await.clone()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Write attempts, including failed ones
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PointSink for RecordingSink {
    async fn ensure_storage(&self, _policy: &RetentionPolicy) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        match &self.storage_error {
            Some(message) => Err(KeystatError::SinkWrite(message.clone())),
            None => Ok(()),
        }
    }

    async fn write_points(
        &self,
        points: &[MetricPoint],
        tags: &TagSet,
        precision: TimePrecision,
    ) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_instances.contains(&tags.instance_id) {
            return Err(KeystatError::SinkWrite(format!(
                "write rejected for {}",
                tags.instance_id
            )));
        }
        if self.rejected_instances.contains(&tags.instance_id) {
            return Err(KeystatError::SinkRejected(format!(
                "field type conflict for {}",
                tags.instance_id
            )));
        }
        let consumed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(KeystatError::SinkWrite("temporarily unavailable".to_string()));
        }

        self.batches.lock().await.push(WrittenBatch {
            points: points.to_vec(),
            tags: tags.clone(),
            precision,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keystat_core::MetricValue;

    fn policy() -> RetentionPolicy {
        RetentionPolicy {
            name: "keystat_default".to_string(),
            duration: "30d".to_string(),
            replication: 1,
        }
    }

    #[test]
    fn test_parse_databases() {
        let body = concat!(
            r#"{"results":[{"statement_id":0,"series":[{"name":"databases","#,
            r#""columns":["name"],"values":[["_internal"],["cache_stats"]]}]}]}"#
        );
        assert_eq!(parse_databases(body).unwrap(), vec!["_internal", "cache_stats"]);

        let empty = r#"{"results":[{"statement_id":0}]}"#;
        assert!(parse_databases(empty).unwrap().is_empty());
    }

    #[test]
    fn test_query_errors_surface() {
        let statement_error = r#"{"results":[{"statement_id":0,"error":"authorization failed"}]}"#;
        assert!(matches!(
            parse_databases(statement_error),
            Err(KeystatError::SinkWrite(msg)) if msg == "authorization failed"
        ));

        let top_level = r#"{"error":"missing required parameter \"q\""}"#;
        assert!(matches!(
            parse_databases(top_level),
            Err(KeystatError::SinkWrite(_))
        ));
    }

    #[test]
    fn test_create_statements() {
        let [create_db, create_rp] = create_statements("cache_stats", &policy());
        assert_eq!(create_db, "CREATE DATABASE \"cache_stats\"");
        assert_eq!(
            create_rp,
            concat!(
                "CREATE RETENTION POLICY \"keystat_default\" ON \"cache_stats\" ",
                "DURATION 30d REPLICATION 1 DEFAULT"
            )
        );
        assert_eq!(quote_ident("we\"ird"), "\"we\\\"ird\"");
    }

    #[test]
    fn test_status_error_classification() {
        let unavailable = status_error("Write", StatusCode::SERVICE_UNAVAILABLE, "overloaded");
        assert!(matches!(unavailable, KeystatError::SinkWrite(_)));
        assert!(unavailable.is_transient());

        let throttled = status_error("Write", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(throttled.is_transient());

        let conflict = status_error(
            "Write",
            StatusCode::BAD_REQUEST,
            "{\"error\":\"field type conflict\"}\n",
        );
        assert!(matches!(
            &conflict,
            KeystatError::SinkRejected(msg) if msg.ends_with("field type conflict\"}")
        ));
        assert!(!conflict.is_transient());

        let unauthorized = status_error("Query", StatusCode::UNAUTHORIZED, "");
        assert!(!unauthorized.is_transient());
    }

    #[tokio::test]
    async fn test_recording_sink_failures() {
        let sink = RecordingSink::new()
            .with_transient_failures(1)
            .with_failing_instance("bad-1");
        let good = TagSet::new("cache", "good-1", "node-a");
        let bad = TagSet::new("cache", "bad-1", "node-b");
        let points = vec![MetricPoint {
            measurement: "IOPS".to_string(),
            tags: good.clone(),
            time: Utc::now(),
            value: MetricValue::Integer(3),
        }];

        assert!(sink.write_points(&points, &good, TimePrecision::Seconds).await.is_err());
        assert!(sink.write_points(&points, &good, TimePrecision::Seconds).await.is_ok());
        assert!(sink.write_points(&points, &bad, TimePrecision::Seconds).await.is_err());

        sink.ensure_storage(&policy()).await.unwrap();
        assert_eq!(sink.ensure_calls(), 1);
        assert_eq!(sink.write_calls(), 3);

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].tags, good);
        assert_eq!(batches[0].points, points);
    }

    #[test]
    fn test_influx_sink_from_dsn() {
        let sink = InfluxSink::from_dsn("influxdb://localhost:8086/cache_stats").unwrap();
        assert_eq!(sink.dsn().database, "cache_stats");
        assert!(matches!(
            InfluxSink::from_dsn("influxdb://localhost:8086/"),
            Err(KeystatError::Configuration(_))
        ));
    }
}
