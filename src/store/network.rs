//! CNI network configuration helpers.
//!
//! A network's `metadata.cniConfig` maps a config file name to a CNI config
//! object. Only the bridge plugin's fields are read here.

use serde_json::Value;

use crate::metadata::{Host, Network};

/// Prefix length used when the network does not declare one.
pub const DEFAULT_SUBNET_PREFIX_LEN: u8 = 16;

const CNI_CONFIG_KEY: &str = "cniConfig";
const BRIDGE_PLUGIN_TYPE: &str = "rancher-bridge";
const HOST_LABEL_KEYWORD: &str = "__host_label__";

/// Bridge settings of a network as seen from one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeInfo {
    pub bridge: Option<String>,
    pub subnet: Option<String>,
}

fn cni_files(network: &Network) -> Option<&serde_json::Map<String, Value>> {
    network.metadata.get(CNI_CONFIG_KEY).and_then(Value::as_object)
}

/// Prefix length from `ipam.subnetPrefixSize` (e.g. `"/16"`) of the first
/// CNI config file.
pub fn subnet_prefix_len(network: &Network) -> u8 {
    let Some((file_name, file)) = cni_files(network).and_then(|files| files.iter().next()) else {
        return DEFAULT_SUBNET_PREFIX_LEN;
    };

    let Some(ipam) = file.get("ipam").and_then(Value::as_object) else {
        tracing::error!(network = %network.name, file = %file_name, "Couldn't find ipam key in network config");
        return DEFAULT_SUBNET_PREFIX_LEN;
    };

    let Some(size) = ipam.get("subnetPrefixSize").and_then(Value::as_str) else {
        tracing::debug!(network = %network.name, "Couldn't find subnetPrefixSize in network ipam config");
        return DEFAULT_SUBNET_PREFIX_LEN;
    };

    match size.trim().trim_start_matches('/').parse::<u8>() {
        Ok(len) => len,
        Err(_) => {
            tracing::warn!(network = %network.name, subnet_prefix_size = %size, "Invalid subnetPrefixSize, using default");
            DEFAULT_SUBNET_PREFIX_LEN
        }
    }
}

/// Bridge name and subnet of the bridge plugin config, after host label
/// substitution.
///
/// The first file of type `rancher-bridge` with a bridge name wins; when
/// none matches, the subnet of the last file read is reported.
pub fn bridge_info(network: &Network, host: &Host) -> BridgeInfo {
    let mut info = BridgeInfo::default();
    let Some(files) = cni_files(network) else {
        return info;
    };

    for file in files.values() {
        let file = substitute_host_labels(file, host);
        let field = |key: &str| file.get(key).and_then(Value::as_str).map(str::to_string);

        info.subnet = field("bridgeSubnet");
        let bridge = field("bridge").filter(|b| !b.is_empty());
        if field("type").as_deref() == Some(BRIDGE_PLUGIN_TYPE) && bridge.is_some() {
            info.bridge = bridge;
            break;
        }
    }
    info
}

/// Replace `__host_label__:<label>` string values with the host's label.
pub fn substitute_host_labels(value: &Value, host: &Host) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_host_labels(v, host)))
                .collect(),
        ),
        Value::String(s) if s.starts_with(HOST_LABEL_KEYWORD) => {
            let label = s.split_once(':').map(|(_, label)| label.trim()).unwrap_or_default();
            let resolved = host.labels.get(label).cloned().unwrap_or_default();
            Value::String(resolved)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn network_with(cni: Value) -> Network {
        let mut network = Network {
            name: "ipsec".to_string(),
            uuid: "net-1".to_string(),
            ..Network::default()
        };
        network.metadata.insert(CNI_CONFIG_KEY.to_string(), cni);
        network
    }

    #[test]
    fn test_subnet_prefix_len() {
        let network = network_with(json!({
            "10-ipsec.conf": { "ipam": { "subnetPrefixSize": "/24" } }
        }));
        assert_eq!(subnet_prefix_len(&network), 24);
    }

    #[test]
    fn test_subnet_prefix_len_defaults() {
        assert_eq!(subnet_prefix_len(&Network::default()), DEFAULT_SUBNET_PREFIX_LEN);

        let no_ipam = network_with(json!({ "10-ipsec.conf": { "type": "rancher-bridge" } }));
        assert_eq!(subnet_prefix_len(&no_ipam), DEFAULT_SUBNET_PREFIX_LEN);

        let garbage = network_with(json!({ "10-ipsec.conf": { "ipam": { "subnetPrefixSize": "/wide" } } }));
        assert_eq!(subnet_prefix_len(&garbage), DEFAULT_SUBNET_PREFIX_LEN);
    }

    #[test]
    fn test_bridge_info_with_host_label() {
        let network = network_with(json!({
            "10-ipsec.conf": {
                "type": "rancher-bridge",
                "bridge": "docker0",
                "bridgeSubnet": "__host_label__: io.rancher.network.ipsec.subnet",
            }
        }));
        let mut host = Host::default();
        host.labels.insert(
            "io.rancher.network.ipsec.subnet".to_string(),
            "10.42.7.0/24".to_string(),
        );

        let info = bridge_info(&network, &host);
        assert_eq!(info.bridge.as_deref(), Some("docker0"));
        assert_eq!(info.subnet.as_deref(), Some("10.42.7.0/24"));
    }

    #[test]
    fn test_missing_host_label_becomes_empty() {
        let value = json!({ "nested": { "subnet": "__host_label__:absent" }, "mtu": 1500 });
        let resolved = substitute_host_labels(&value, &Host::default());
        assert_eq!(resolved, json!({ "nested": { "subnet": "" }, "mtu": 1500 }));
    }

    #[test]
    fn test_bridge_info_without_bridge_plugin() {
        let network = network_with(json!({
            "10-other.conf": { "type": "macvlan", "bridgeSubnet": "10.1.0.0/16" }
        }));
        let info = bridge_info(&network, &Host::default());
        assert_eq!(info.bridge, None);
        assert_eq!(info.subnet.as_deref(), Some("10.1.0.0/16"));
    }
}
