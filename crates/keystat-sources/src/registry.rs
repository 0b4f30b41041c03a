//! Service registry lookup

use async_trait::async_trait;
use keystat_core::{format_endpoint, CollectorConfig, InstanceDescriptor, KeystatError, Result};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for resolving a service name to its live instances (allows mocking in tests)
#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Current instances of `service`; an unknown service has no instances
    async fn lookup(&self, service: &str) -> Result<Vec<InstanceDescriptor>>;
}

/// Catalog entry as returned by `/v1/catalog/service/<name>`
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "Node")]
    node: String,
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "ServiceID")]
    service_id: String,
    #[serde(rename = "ServiceAddress", default)]
    service_address: String,
    #[serde(rename = "ServicePort")]
    service_port: u16,
}

impl From<CatalogEntry> for InstanceDescriptor {
    fn from(entry: CatalogEntry) -> Self {
        // Services registered without their own address listen on the node address
        let address = if entry.service_address.is_empty() {
            entry.address
        } else {
            entry.service_address
        };
        InstanceDescriptor::new(address, entry.service_port, entry.service_id, entry.node)
    }
}

/// Parse a catalog response body into instance descriptors
pub(crate) fn parse_catalog(body: &str) -> Result<Vec<InstanceDescriptor>> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(body)?;
    Ok(entries.into_iter().map(InstanceDescriptor::from).collect())
}

/// Registry backed by the Consul catalog HTTP API
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    client: reqwest::Client,
    base_url: Url,
}

impl ConsulRegistry {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let address = format_endpoint(host, port);
        let base_url = Url::parse(&format!("http://{}/", address)).map_err(|e| {
            KeystatError::Configuration(format!("Invalid registry address {}: {}", address, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| KeystatError::Registry(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        Self::new(&config.registry_host, config.registry_port)
    }

    /// Catalog URL for a service; the name is percent-encoded as a path segment
    pub(crate) fn catalog_url(&self, service: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                KeystatError::Configuration(format!("Invalid registry URL {}", self.base_url))
            })?
            .extend(["v1", "catalog", "service", service]);
        Ok(url)
    }
}

#[async_trait]
impl InstanceRegistry for ConsulRegistry {
    #[instrument(skip(self), fields(registry = %self.base_url))]
    async fn lookup(&self, service: &str) -> Result<Vec<InstanceDescriptor>> {
        let url = self.catalog_url(service)?;
        debug!("Looking up {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KeystatError::Registry(format!("Failed to query registry: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(KeystatError::ServiceNotFound(service.to_string()));
        }
        if !status.is_success() {
            return Err(KeystatError::Registry(format!(
                "Registry returned {} for service {}",
                status, service
            )));
        }

        let body = response.text().await.map_err(|e| {
            KeystatError::Registry(format!("Failed to read registry response: {}", e))
        })?;

        let instances = parse_catalog(&body)?;
        debug!("Registry returned {} instance(s) for {}", instances.len(), service);
        Ok(instances)
    }
}

/// Mock registry for testing
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    services: HashMap<String, Vec<InstanceDescriptor>>,
    failures: HashMap<String, String>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: &str, instances: Vec<InstanceDescriptor>) -> Self {
        self.services.insert(service.to_string(), instances);
        self
    }

    /// Make lookups of `service` fail with a registry error
    pub fn with_failure(mut self, service: &str, message: &str) -> Self {
        self.failures.insert(service.to_string(), message.to_string());
        self
    }
}

#[async_trait]
impl InstanceRegistry for MockRegistry {
    async fn lookup(&self, service: &str) -> Result<Vec<InstanceDescriptor>> {
        if let Some(message) = self.failures.get(service) {
            return Err(KeystatError::Registry(message.clone()));
        }
        Ok(self.services.get(service).cloned().unwrap_or_default())
    }
}
