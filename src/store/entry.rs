//! Routable address entries.

use ipnet::IpNet;
use serde::Serialize;
use std::net::IpAddr;

/// One routable address known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Container address with the overlay network's prefix length.
    pub ip_address: IpNet,
    /// Agent IP of the owning host; `None` when the host is unknown.
    pub host_ip_address: Option<IpAddr>,
    /// Derived from the agent's own container.
    pub is_self: bool,
    /// Reachable through an explicit service link or region peering.
    pub is_peer: bool,
}

impl Entry {
    /// The address without its prefix, used as the map key.
    pub fn bare_ip(&self) -> IpAddr {
        self.ip_address.addr()
    }
}
