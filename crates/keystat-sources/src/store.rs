//! Instance statistics source

use async_trait::async_trait;
use deadpool_redis::redis::{self, ErrorKind, RedisError};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime, Timeouts};
use keystat_core::{format_endpoint, CollectorConfig, KeystatError, Result};
use keystat_metrics::{parse_info, RawStatSnapshot};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, instrument};

/// Trait for reading a data-store instance's counters (allows mocking in tests)
#[async_trait]
pub trait StatsSource: Send + Sync {
    /// General info and per-command statistics merged into one snapshot
    async fn fetch_snapshot(&self, address: &str, port: u16) -> Result<RawStatSnapshot>;
}

/// Statistics source for Redis-compatible stores (Redis, Valkey, Dragonfly)
///
/// Keeps one small connection pool per endpoint, so an instance listed under
/// several services is connected to once per run.
#[derive(Clone)]
pub struct RedisStatsSource {
    timeout: Duration,
    pools: Arc<Mutex<HashMap<String, Pool>>>,
}

impl RedisStatsSource {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Self {
        Self::new(config.store_timeout())
    }

    /// Pool for an endpoint, created on first use; creating it does not connect
    fn pool(&self, endpoint: &str) -> Result<Pool> {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = pools.get(endpoint) {
            return Ok(pool.clone());
        }

        let mut config = Config::from_url(store_url(endpoint));
        config.pool = Some(PoolConfig {
            max_size: 1,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });
        let pool = config.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            KeystatError::StoreConnection(format!("Invalid store address {}: {}", endpoint, e))
        })?;

        pools.insert(endpoint.to_string(), pool.clone());
        Ok(pool)
    }

    async fn bounded<T, F>(&self, endpoint: &str, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_redis_error(endpoint, what, e)),
            Err(_) => Err(KeystatError::StoreConnection(format!(
                "{} on {} timed out after {:?}",
                what, endpoint, self.timeout
            ))),
        }
    }
}

impl std::fmt::Debug for RedisStatsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStatsSource")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn store_url(endpoint: &str) -> String {
    format!("redis://{}/", endpoint)
}

impl Default for RedisStatsSource {
    fn default() -> Self {
        Self::from_config(&CollectorConfig::default())
    }
}

fn map_redis_error(endpoint: &str, what: &str, e: RedisError) -> KeystatError {
    match e.kind() {
        ErrorKind::TypeError => KeystatError::MalformedSnapshot(format!(
            "{} on {} returned unexpected reply: {}",
            what, endpoint, e
        )),
        _ => KeystatError::StoreConnection(format!("{} on {} failed: {}", what, endpoint, e)),
    }
}

#[async_trait]
impl StatsSource for RedisStatsSource {
    #[instrument(skip(self))]
    async fn fetch_snapshot(&self, address: &str, port: u16) -> Result<RawStatSnapshot> {
        let endpoint = format_endpoint(address, port);
        let pool = self.pool(&endpoint)?;

        // Pool timeouts bound the connect
        let mut conn = pool.get().await.map_err(|e| {
            KeystatError::StoreConnection(format!("connect to {} failed: {}", endpoint, e))
        })?;

        let info: String = self
            .bounded(&endpoint, "INFO", redis::cmd("INFO").query_async(&mut conn))
            .await?;
        let command_stats: String = self
            .bounded(
                &endpoint,
                "INFO commandstats",
                redis::cmd("INFO").arg("commandstats").query_async(&mut conn),
            )
            .await?;

        let mut snapshot = parse_info(&info);
        snapshot.merge(parse_info(&command_stats));
        debug!("Read {} fields from {}", snapshot.len(), endpoint);
        Ok(snapshot)
    }
}

/// Mock statistics source for testing
#[derive(Debug, Clone, Default)]
pub struct MockStatsSource {
    snapshots: HashMap<String, RawStatSnapshot>,
    failures: HashMap<String, MockFailure>,
}

/// Failure a mock endpoint should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    StoreConnection,
    MalformedSnapshot,
}

impl MockStatsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, address: &str, port: u16, snapshot: RawStatSnapshot) -> Self {
        self.snapshots.insert(format_endpoint(address, port), snapshot);
        self
    }

    /// Make reads of the endpoint fail
    pub fn with_failure(mut self, address: &str, port: u16, kind: MockFailure) -> Self {
        self.failures.insert(format_endpoint(address, port), kind);
        self
    }
}

#[async_trait]
impl StatsSource for MockStatsSource {
    async fn fetch_snapshot(&self, address: &str, port: u16) -> Result<RawStatSnapshot> {
        let endpoint = format_endpoint(address, port);
        match self.failures.get(&endpoint) {
            Some(MockFailure::StoreConnection) => {
                return Err(KeystatError::StoreConnection(format!(
                    "connection refused: {}",
                    endpoint
                )))
            }
            Some(MockFailure::MalformedSnapshot) => {
                return Err(KeystatError::MalformedSnapshot(format!(
                    "unreadable reply from {}",
                    endpoint
                )))
            }
            None => {}
        }
        self.snapshots.get(&endpoint).cloned().ok_or_else(|| {
            KeystatError::StoreConnection(format!("No mock snapshot for: {}", endpoint))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystat_metrics::StatValue;

    #[tokio::test]
    async fn test_mock_source() {
        let snapshot = RawStatSnapshot::new().with("connected_clients", 5_i64);
        let source = MockStatsSource::new()
            .with_snapshot("10.0.0.1", 6379, snapshot.clone())
            .with_failure("10.0.0.2", 6379, MockFailure::MalformedSnapshot);

        assert_eq!(source.fetch_snapshot("10.0.0.1", 6379).await.unwrap(), snapshot);
        assert!(matches!(
            source.fetch_snapshot("10.0.0.2", 6379).await,
            Err(KeystatError::MalformedSnapshot(_))
        ));
        assert!(matches!(
            source.fetch_snapshot("10.0.0.3", 6379).await,
            Err(KeystatError::StoreConnection(_))
        ));
        assert_eq!(
            snapshot.get("connected_clients"),
            Some(&StatValue::Integer(5))
        );
    }

    #[test]
    fn test_store_url_brackets_ipv6() {
        assert_eq!(store_url(&format_endpoint("10.0.0.1", 6379)), "redis://10.0.0.1:6379/");
        assert_eq!(store_url(&format_endpoint("::1", 6379)), "redis://[::1]:6379/");
    }

    #[tokio::test]
    async fn test_pool_reused_per_endpoint() {
        let source = RedisStatsSource::new(Duration::from_millis(50));

        source.pool("[::1]:6379").unwrap();
        source.pool("[::1]:6379").unwrap();
        source.pool("10.0.0.1:6379").unwrap();

        assert_eq!(source.pools.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_redis_error_mapping() {
        let io: RedisError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(matches!(
            map_redis_error("h:1", "connect", io),
            KeystatError::StoreConnection(_)
        ));

        let type_error: RedisError = (ErrorKind::TypeError, "not a string").into();
        assert!(matches!(
            map_redis_error("h:1", "INFO", type_error),
            KeystatError::MalformedSnapshot(_)
        ));
    }
}
