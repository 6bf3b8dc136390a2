//! Cluster metadata records.
//!
//! These mirror the JSON documents served by the metadata service. Every
//! field has a default, and collections that the service reports as `null`
//! decode to empty values.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Container states that count as running for overlay purposes.
const RUNNING_STATES: &[&str] = &["running", "starting", "stopping"];

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A container known to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub uuid: String,
    pub primary_ip: String,
    pub host_uuid: String,
    pub service_name: String,
    pub service_uuid: String,
    pub stack_name: String,
    pub state: String,
    pub network_uuid: String,
    /// Set when the container shares another container's network stack.
    pub network_from_container_uuid: String,
    pub environment_uuid: String,
    pub system: bool,
}

impl Container {
    /// Running, starting and stopping containers still own their address.
    pub fn is_considered_running(&self) -> bool {
        RUNNING_STATES.contains(&self.state.as_str())
    }

    /// Nested containers do not own an address of their own.
    pub fn is_nested(&self) -> bool {
        !self.network_from_container_uuid.is_empty()
    }
}

/// A physical host running an agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub name: String,
    pub uuid: String,
    pub agent_ip: String,
    pub hostname: String,
    pub environment_uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: BTreeMap<String, String>,
    pub state: String,
}

/// A service (group of containers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub name: String,
    pub uuid: String,
    pub stack_name: String,
    pub kind: String,
    pub state: String,
    pub system: bool,
    pub primary_service_name: String,
    /// Linked services keyed by `stack/service`.
    #[serde(deserialize_with = "null_as_default")]
    pub links: BTreeMap<String, String>,
    #[serde(deserialize_with = "null_as_default")]
    pub containers: Vec<Container>,
    pub environment_uuid: String,
}

impl Service {
    /// The `stack/service` name other services use to link to this one.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.stack_name, self.name)
    }

    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}

/// A container network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub name: String,
    pub uuid: String,
    pub environment_uuid: String,
    pub default: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A linked environment visible in region mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub name: String,
    pub uuid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hosts: Vec<Host>,
    #[serde(deserialize_with = "null_as_default")]
    pub containers: Vec<Container>,
    #[serde(deserialize_with = "null_as_default")]
    pub services: Vec<Service>,
    #[serde(deserialize_with = "null_as_default")]
    pub networks: Vec<Network>,
}
