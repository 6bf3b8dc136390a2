//! Topology classification.
//!
//! # Responsibilities
//! - Turn one [`ClusterSnapshot`] into classified address maps
//! - Resolve each address to the agent IP of the host that owns it
//! - Mark addresses reachable through service links or region peering
//!
//! # Design Decisions
//! - [`Topology::build`] is a pure function of the snapshot; no state is
//!   carried between builds, so rebuilding an unchanged snapshot yields an
//!   identical value
//! - Iteration order is explicit:
//!   - peers: linked service containers, then region peers, then the self
//!     service's own containers; the last container seen for an address wins
//!   - candidates: local environment containers, then region peers, then
//!     region non-peers; the first container seen for an address wins
//! - Addresses that do not parse are skipped and logged at debug level

use ipnet::IpNet;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;
use thiserror::Error;

use crate::metadata::{ClusterSnapshot, Container, Host, Network, Service};
use crate::store::entry::Entry;
use crate::store::network;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("network {network_uuid} of the self container is not in metadata")]
    SelfNetworkMissing { network_uuid: String },
}

/// Classified view of the cluster, keyed by bare IP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    self_entry: Option<Entry>,
    entries: Vec<Entry>,
    local: BTreeMap<IpAddr, Entry>,
    remote: BTreeMap<IpAddr, Entry>,
    peers: BTreeMap<IpAddr, Entry>,
    remote_non_peers: BTreeMap<IpAddr, Entry>,
    local_subnet: Option<IpNet>,
}

/// Per-build scratch data gathered from linked environments.
#[derive(Debug, Default)]
struct RegionInfo<'a> {
    peer_networks: BTreeSet<&'a str>,
    peer_containers: Vec<&'a Container>,
    non_peer_containers: Vec<&'a Container>,
    hosts: Vec<&'a Host>,
}

impl<'a> RegionInfo<'a> {
    fn collect(snapshot: &'a ClusterSnapshot, self_network: &Network) -> Self {
        let mut info = RegionInfo::default();

        for env in &snapshot.environments {
            info.hosts.extend(env.hosts.iter());

            let Some(peer_network) = env.networks.iter().find(|n| n.name == self_network.name) else {
                tracing::debug!(environment = %env.name, network = %self_network.name, "No matching network in linked environment");
                continue;
            };
            info.peer_networks.insert(peer_network.uuid.as_str());

            for c in &env.containers {
                if !(c.state == "running" || c.state == "starting") {
                    continue;
                }
                if c.network_uuid != peer_network.uuid || c.primary_ip.is_empty() || c.is_nested() {
                    continue;
                }
                if c.service_name == snapshot.self_service.name {
                    info.peer_containers.push(c);
                } else {
                    info.non_peer_containers.push(c);
                }
            }
        }

        info
    }
}

/// Builds entries with host resolution and the network's prefix length.
struct EntryFactory<'a> {
    hosts_by_uuid: HashMap<&'a str, &'a Host>,
    self_primary_ip: &'a str,
    prefix_len: u8,
}

impl EntryFactory<'_> {
    fn host_ip(&self, host_uuid: &str) -> Option<IpAddr> {
        self.hosts_by_uuid
            .get(host_uuid)
            .and_then(|h| h.agent_ip.parse().ok())
    }

    fn entry(&self, c: &Container) -> Option<Entry> {
        let ip: IpAddr = match c.primary_ip.parse() {
            Ok(ip) => ip,
            Err(_) => {
                tracing::debug!(container = %c.name, primary_ip = %c.primary_ip, "Skipping container with unparsable address");
                return None;
            }
        };
        let ip_address = match IpNet::new(ip, self.prefix_len) {
            Ok(net) => net,
            Err(_) => {
                tracing::debug!(container = %c.name, prefix_len = self.prefix_len, "Prefix length does not fit address");
                return None;
            }
        };

        let host_ip_address = self.host_ip(&c.host_uuid);
        if host_ip_address.is_none() {
            tracing::debug!(container = %c.name, host_uuid = %c.host_uuid, "Couldn't find host IP for entry");
        }

        Some(Entry {
            ip_address,
            host_ip_address,
            is_self: c.primary_ip == self.self_primary_ip,
            is_peer: false,
        })
    }
}

/// System services by `stack/service` name, excluding the self service.
fn services_by_name<'a>(services: &'a [Service], self_service: &Service) -> HashMap<String, Vec<&'a Service>> {
    let mut map: HashMap<String, Vec<&'a Service>> = HashMap::new();
    for s in services {
        if !s.system || s.uuid == self_service.uuid {
            continue;
        }
        map.entry(s.qualified_name()).or_default().push(s);
    }
    map
}

/// Running containers of linked services on a network named like the self
/// network, plus the set of networks they live on.
fn linked_peers<'a>(
    snapshot: &'a ClusterSnapshot,
    networks_by_uuid: &HashMap<&str, &'a Network>,
    self_network: &Network,
) -> (BTreeSet<&'a str>, Vec<&'a Container>) {
    let by_name = services_by_name(&snapshot.services, &snapshot.self_service);
    let self_service = &snapshot.self_service;

    let linked: Vec<&Service> = if !self_service.links.is_empty() {
        self_service
            .links
            .keys()
            .flat_map(|name| match by_name.get(name) {
                Some(services) => services.clone(),
                None => {
                    tracing::error!(link = %name, "Linked service not found in metadata");
                    Vec::new()
                }
            })
            .collect()
    } else {
        let self_name = self_service.qualified_name();
        snapshot
            .services
            .iter()
            .filter(|s| s.system && s.links.contains_key(&self_name))
            .flat_map(|s| by_name.get(&s.qualified_name()).cloned().unwrap_or_default())
            .collect()
    };

    let mut networks = BTreeSet::new();
    let mut containers = Vec::new();
    for service in linked {
        for c in &service.containers {
            if !c.is_considered_running() {
                continue;
            }
            let same_network = networks_by_uuid
                .get(c.network_uuid.as_str())
                .is_some_and(|n| n.name == self_network.name);
            if !same_network {
                continue;
            }
            networks.insert(c.network_uuid.as_str());
            containers.push(c);
        }
    }

    tracing::debug!(services = self_service.links.len(), containers = containers.len(), "Collected linked peers");
    (networks, containers)
}

impl Topology {
    /// Classify every address in the snapshot.
    pub fn build(snapshot: &ClusterSnapshot) -> Result<Self, TopologyError> {
        let self_container = &snapshot.self_container;
        let networks_by_uuid: HashMap<&str, &Network> = snapshot
            .networks
            .iter()
            .map(|n| (n.uuid.as_str(), n))
            .collect();

        let self_network = networks_by_uuid
            .get(self_container.network_uuid.as_str())
            .copied()
            .ok_or_else(|| TopologyError::SelfNetworkMissing {
                network_uuid: self_container.network_uuid.clone(),
            })?;

        let prefix_len = network::subnet_prefix_len(self_network);
        let local_subnet = network::bridge_info(self_network, &snapshot.self_host)
            .subnet
            .filter(|s| !s.is_empty())
            .and_then(|s| match s.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(_) => {
                    tracing::warn!(subnet = %s, "Ignoring unparsable bridge subnet");
                    None
                }
            });

        let (mut peer_networks, mut peer_containers) = linked_peers(snapshot, &networks_by_uuid, self_network);
        peer_networks.insert(self_container.network_uuid.as_str());

        let region = snapshot
            .region
            .as_ref()
            .map(|_| RegionInfo::collect(snapshot, self_network));

        let mut hosts: Vec<&Host> = snapshot.hosts.iter().collect();
        let mut candidates: Vec<&Container> = snapshot.containers.iter().collect();
        if let Some(region) = &region {
            hosts.extend(region.hosts.iter().copied());
            peer_networks.extend(region.peer_networks.iter().copied());
            peer_containers.extend(region.peer_containers.iter().copied());
            candidates.extend(region.peer_containers.iter().copied());
            candidates.extend(region.non_peer_containers.iter().copied());
        }
        peer_containers.extend(
            snapshot
                .self_service
                .containers
                .iter()
                .filter(|c| c.is_considered_running()),
        );

        let factory = EntryFactory {
            hosts_by_uuid: hosts.iter().map(|h| (h.uuid.as_str(), *h)).collect(),
            self_primary_ip: &self_container.primary_ip,
            prefix_len,
        };

        let self_entry = factory.entry(self_container);
        let self_host_ip = factory.host_ip(&self_container.host_uuid);

        let mut peers = BTreeMap::new();
        for c in &peer_containers {
            if let Some(mut entry) = factory.entry(c) {
                entry.is_peer = true;
                peers.insert(entry.bare_ip(), entry);
            }
        }

        let mut topology = Topology {
            self_entry,
            local_subnet,
            peers,
            ..Topology::default()
        };

        let mut seen = HashSet::new();
        for c in candidates {
            if !c.is_considered_running()
                || !peer_networks.contains(c.network_uuid.as_str())
                || c.primary_ip.is_empty()
                || c.is_nested()
            {
                continue;
            }

            let Some(mut entry) = factory.entry(c) else {
                continue;
            };
            let ip = entry.bare_ip();
            if !seen.insert(ip) {
                continue;
            }
            if topology.peers.contains_key(&ip) {
                entry.is_peer = true;
            }

            if entry.host_ip_address == self_host_ip {
                topology.local.insert(ip, entry.clone());
            } else {
                if !entry.is_peer {
                    topology.remote_non_peers.insert(ip, entry.clone());
                }
                topology.remote.insert(ip, entry.clone());
            }
            topology.entries.push(entry);
        }

        tracing::debug!(
            entries = topology.entries.len(),
            local = topology.local.len(),
            remote = topology.remote.len(),
            peers = topology.peers.len(),
            "Built topology"
        );
        Ok(topology)
    }

    /// True only for addresses classified onto another host.
    pub fn is_remote(&self, ip: IpAddr) -> bool {
        if self.local.contains_key(&ip) {
            tracing::debug!(ip = %ip, "Address is local");
            return false;
        }
        if self.remote.contains_key(&ip) {
            tracing::debug!(ip = %ip, "Address is remote");
            return true;
        }
        false
    }

    /// Every classified entry in candidate order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn local_map(&self) -> &BTreeMap<IpAddr, Entry> {
        &self.local
    }

    pub fn remote_map(&self) -> &BTreeMap<IpAddr, Entry> {
        &self.remote
    }

    pub fn peer_map(&self) -> &BTreeMap<IpAddr, Entry> {
        &self.peers
    }

    pub fn remote_non_peer_map(&self) -> &BTreeMap<IpAddr, Entry> {
        &self.remote_non_peers
    }

    /// Bridge subnet of the self network on this host.
    pub fn local_subnet(&self) -> Option<IpNet> {
        self.local_subnet
    }

    pub fn self_entry(&self) -> Option<&Entry> {
        self.self_entry.as_ref()
    }

    pub fn local_ip_address(&self) -> Option<IpNet> {
        self.self_entry.as_ref().map(|e| e.ip_address)
    }

    pub fn local_host_ip_address(&self) -> Option<IpAddr> {
        self.self_entry.as_ref().and_then(|e| e.host_ip_address)
    }
}
