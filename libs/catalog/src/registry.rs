//! Service registry collaborator.
//!
//! The registry owns the durable instance records. It exposes reads by
//! service name and a full-record overwrite; there is no partial-update or
//! compare-and-swap API, so concurrent writers are last-writer-wins.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::CatalogError;
use crate::instance::ServiceInstance;

/// Read/write access to the service registry.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// List all instances of a service in a datacenter, in registry order.
    async fn list_instances(
        &self,
        service: &str,
        datacenter: &str,
    ) -> Result<Vec<ServiceInstance>, CatalogError>;

    /// Overwrite-register the full service definition for one instance.
    async fn register(&self, instance: &ServiceInstance) -> Result<(), CatalogError>;
}

/// HTTP client for a catalog-style registry API.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct CatalogRegistration<'a> {
    #[serde(rename = "Node")]
    node: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Datacenter")]
    datacenter: &'a str,
    #[serde(rename = "TaggedAddresses")]
    tagged_addresses: &'a std::collections::HashMap<String, String>,
    #[serde(rename = "Service")]
    service: AgentService<'a>,
}

#[derive(Serialize)]
struct AgentService<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Service")]
    service: &'a str,
    #[serde(rename = "Tags")]
    tags: &'a [String],
    #[serde(rename = "Port")]
    port: u16,
    #[serde(rename = "EnableTagOverride")]
    enable_tag_override: bool,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ServiceRegistry for HttpRegistry {
    async fn list_instances(
        &self,
        service: &str,
        datacenter: &str,
    ) -> Result<Vec<ServiceInstance>, CatalogError> {
        let url = format!("{}/v1/catalog/service/{}", self.base_url, service);
        debug!(url = %url, dc = %datacenter, "Listing service instances");

        let response = self
            .client
            .get(&url)
            .query(&[("dc", datacenter)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api { status, body });
        }

        let instances: Vec<ServiceInstance> = response.json().await?;
        debug!(count = instances.len(), "Fetched service instances");
        Ok(instances)
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<(), CatalogError> {
        let url = format!("{}/v1/catalog/register", self.base_url);

        let registration = CatalogRegistration {
            node: &instance.node,
            address: &instance.address,
            datacenter: &instance.datacenter,
            tagged_addresses: &instance.tagged_addresses,
            service: AgentService {
                id: &instance.service_id,
                service: &instance.service_name,
                tags: &instance.tags,
                port: instance.port,
                enable_tag_override: true,
            },
        };

        let response = self.client.put(&url).json(&registration).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api { status, body });
        }

        debug!(
            service = %instance.service_name,
            node = %instance.node,
            tags = ?instance.tags,
            "Registered service definition"
        );
        Ok(())
    }
}
