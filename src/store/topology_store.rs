//! Shared, atomically swapped topology.

use arc_swap::ArcSwap;
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::metadata::{ClusterSnapshot, MetadataError, MetadataSource};
use crate::observability::metrics;
use crate::store::entry::Entry;
use crate::store::topology::{Topology, TopologyError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to fetch cluster snapshot: {0}")]
    Fetch(#[from] MetadataError),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Holds the current [`Topology`]. Readers never block; a refresh builds
/// the new value first and swaps it in under a mutex.
pub struct TopologyStore {
    current: ArcSwap<Topology>,
    swap_lock: Mutex<()>,
}

impl Default for TopologyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyStore {
    /// An empty store; every address is unknown until the first refresh.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Topology::default()),
            swap_lock: Mutex::new(()),
        }
    }

    /// Fetch a snapshot and replace the topology. On failure the previous
    /// topology stays in place.
    pub async fn refresh(&self, source: &dyn MetadataSource) -> Result<Arc<Topology>, StoreError> {
        let result = match ClusterSnapshot::fetch(source).await {
            Ok(snapshot) => self.apply(&snapshot).await,
            Err(e) => Err(e.into()),
        };
        metrics::record_refresh(result.is_ok());
        result
    }

    /// Replace the topology with one built from `snapshot`.
    pub async fn apply(&self, snapshot: &ClusterSnapshot) -> Result<Arc<Topology>, StoreError> {
        let topology = Arc::new(Topology::build(snapshot)?);

        {
            let _guard = self.swap_lock.lock().await;
            self.current.store(Arc::clone(&topology));
        }

        metrics::record_topology(
            topology.local_map().len(),
            topology.remote_map().len(),
            topology.peer_map().len(),
        );
        tracing::info!(
            entries = topology.entries().len(),
            remote = topology.remote_map().len(),
            peers = topology.peer_map().len(),
            "Topology refreshed"
        );
        Ok(topology)
    }

    /// The topology currently in effect.
    pub fn snapshot(&self) -> Arc<Topology> {
        self.current.load_full()
    }

    pub fn is_remote(&self, ip: IpAddr) -> bool {
        self.current.load().is_remote(ip)
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.current.load().entries().to_vec()
    }

    pub fn remote_map(&self) -> BTreeMap<IpAddr, Entry> {
        self.current.load().remote_map().clone()
    }

    pub fn peer_map(&self) -> BTreeMap<IpAddr, Entry> {
        self.current.load().peer_map().clone()
    }

    pub fn remote_non_peer_map(&self) -> BTreeMap<IpAddr, Entry> {
        self.current.load().remote_non_peer_map().clone()
    }

    pub fn local_subnet(&self) -> Option<IpNet> {
        self.current.load().local_subnet()
    }

    pub fn local_ip_address(&self) -> Option<IpNet> {
        self.current.load().local_ip_address()
    }

    pub fn local_host_ip_address(&self) -> Option<IpAddr> {
        self.current.load().local_host_ip_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Container, Host, Network};

    fn snapshot_with_remote(remote_ip: &str) -> ClusterSnapshot {
        let self_container = Container {
            primary_ip: "10.42.0.2".to_string(),
            host_uuid: "h1".to_string(),
            network_uuid: "net-1".to_string(),
            state: "running".to_string(),
            ..Container::default()
        };
        let remote = Container {
            primary_ip: remote_ip.to_string(),
            host_uuid: "h2".to_string(),
            ..self_container.clone()
        };
        ClusterSnapshot {
            containers: vec![self_container.clone(), remote],
            self_container,
            hosts: vec![
                Host {
                    uuid: "h1".to_string(),
                    agent_ip: "192.168.1.1".to_string(),
                    ..Host::default()
                },
                Host {
                    uuid: "h2".to_string(),
                    agent_ip: "192.168.1.2".to_string(),
                    ..Host::default()
                },
            ],
            networks: vec![Network {
                uuid: "net-1".to_string(),
                name: "ipsec".to_string(),
                ..Network::default()
            }],
            ..ClusterSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_empty_store_knows_nothing() {
        let store = TopologyStore::new();
        assert!(store.entries().is_empty());
        assert!(!store.is_remote("10.42.0.9".parse().unwrap()));
        assert_eq!(store.local_ip_address(), None);
    }

    #[tokio::test]
    async fn test_apply_swaps_topology() {
        let store = TopologyStore::new();
        store.apply(&snapshot_with_remote("10.42.0.9")).await.unwrap();
        assert!(store.is_remote("10.42.0.9".parse().unwrap()));

        let before = store.snapshot();
        store.apply(&snapshot_with_remote("10.42.0.10")).await.unwrap();
        assert!(!store.is_remote("10.42.0.9".parse().unwrap()));
        assert!(store.is_remote("10.42.0.10".parse().unwrap()));

        // Earlier readers keep their view.
        assert!(before.is_remote("10.42.0.9".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_failed_apply_keeps_previous() {
        let store = TopologyStore::new();
        store.apply(&snapshot_with_remote("10.42.0.9")).await.unwrap();

        let mut broken = snapshot_with_remote("10.42.0.10");
        broken.networks.clear();
        assert!(matches!(
            store.apply(&broken).await,
            Err(StoreError::Topology(TopologyError::SelfNetworkMissing { .. }))
        ));
        assert!(store.is_remote("10.42.0.9".parse().unwrap()));
    }
}
