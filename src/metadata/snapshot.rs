//! Point-in-time cluster snapshot.

use crate::metadata::client::{MetadataResult, MetadataSource};
use crate::metadata::types::{Container, Environment, Host, Network, Service};

/// Everything a topology build needs, fetched in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSnapshot {
    pub self_container: Container,
    pub self_host: Host,
    pub self_service: Service,
    pub hosts: Vec<Host>,
    pub containers: Vec<Container>,
    pub services: Vec<Service>,
    pub networks: Vec<Network>,
    /// Region this environment belongs to, if any.
    pub region: Option<String>,
    /// Linked environments; only populated when `region` is set.
    pub environments: Vec<Environment>,
}

impl ClusterSnapshot {
    /// Fetch a complete snapshot from the metadata source.
    ///
    /// Failing to read the region name or the linked environments is not
    /// fatal: the snapshot is returned without region data.
    pub async fn fetch(source: &dyn MetadataSource) -> MetadataResult<Self> {
        let self_container = source.get_self_container().await?;
        let self_host = source.get_self_host().await?;

        let region = match source.get_region_name().await {
            Ok(name) if !name.trim().is_empty() => Some(name),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Could not read region name, assuming none");
                None
            }
        };

        let hosts = source.get_hosts().await?;
        let containers = source.get_containers().await?;
        let self_service = source.get_self_service().await?;
        let services = source.get_services().await?;
        let networks = source.get_networks().await?;

        let environments = match &region {
            Some(region) => match source.get_environments().await {
                Ok(environments) => environments,
                Err(e) => {
                    tracing::error!(region = %region, error = %e, "Failed to fetch region environments");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        tracing::debug!(
            region = ?region,
            hosts = hosts.len(),
            containers = containers.len(),
            services = services.len(),
            networks = networks.len(),
            environments = environments.len(),
            "Fetched cluster snapshot"
        );

        Ok(Self {
            self_container,
            self_host,
            self_service,
            hosts,
            containers,
            services,
            networks,
            region,
            environments,
        })
    }
}
