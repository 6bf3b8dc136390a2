//! Canonical forms of the IKE and CHILD_SA templates.
//!
//! Field names follow the daemon's VICI configuration keys. Unknown keys
//! are ignored and missing keys default, but a key with the wrong JSON type
//! fails to decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IKE-level connection defaults (`ike.conf`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkeConf {
    pub local_addrs: Vec<String>,
    pub remote_addrs: Vec<String>,
    pub local_port: String,
    pub remote_port: String,
    pub proposals: Vec<String>,
    pub vips: Vec<String>,
    pub version: String,
    pub encap: String,
    pub keyingtries: String,
    pub rekey_time: String,
    pub dpd_delay: String,
    #[serde(rename = "local")]
    pub local_auth: AuthConf,
    #[serde(rename = "remote")]
    pub remote_auth: AuthConf,
    pub pools: Vec<String>,
    pub children: BTreeMap<String, ChildSaConf>,
    pub mobike: String,
}

/// One side of IKE authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConf {
    pub id: String,
    pub round: String,
    #[serde(rename = "auth")]
    pub auth_method: String,
    pub eap_id: String,
    pub pubkeys: Vec<String>,
}

/// CHILD_SA defaults (`childsa.conf`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChildSaConf {
    pub local_ts: Vec<String>,
    pub remote_ts: Vec<String>,
    pub esp_proposals: Vec<String>,
    pub start_action: String,
    pub close_action: String,
    pub reqid: String,
    pub rekey_time: String,
    pub replay_window: String,
    pub mode: String,
    #[serde(rename = "policies")]
    pub install_policy: String,
    pub updown: String,
    pub priority: String,
    pub mark_in: String,
    pub mark_out: String,
    pub dpd_action: String,
    pub life_time: String,
}

pub(crate) const DEFAULT_IKE_CONF: &str = r#"{
    "version": "2",
    "local_addrs": [],
    "proposals": ["aes128gcm16-sha256-modp2048", "aes-sha1-modp2048"],
    "encap": "yes",
    "dpd_delay": "10s",
    "keyingtries": "0",
    "local": {
        "auth": "psk"
    },
    "remote": {
        "auth": "psk"
    }
}"#;

pub(crate) const DEFAULT_CHILD_SA_CONF: &str = r#"{
    "local_ts": ["0.0.0.0/0"],
    "remote_ts": ["0.0.0.0/0"],
    "esp_proposals": ["aes128gcm16-modp2048", "aes-modp2048"],
    "start_action": "start",
    "close_action": "start",
    "dpd_action": "restart",
    "mode": "tunnel",
    "policies": "no"
}"#;
