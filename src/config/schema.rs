//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the overlay agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Metadata service settings.
    pub metadata: MetadataConfig,

    /// ARP proxy settings.
    pub arp: ArpConfig,

    /// SA reconciliation settings.
    pub monitor: MonitorConfig,

    /// Tunnel configuration templates.
    pub templates: TemplatesConfig,

    /// Control surface (ping/reload/loglevel).
    pub control: ControlConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Metadata service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Address of the metadata service (host or host:port).
    pub address: String,

    /// Metadata API version path segment.
    pub api_version: String,

    /// Interval between change polls in seconds.
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            address: "169.254.169.250".to_string(),
            api_version: "2016-07-29".to_string(),
            poll_interval_secs: 2,
            request_timeout_secs: 10,
        }
    }
}

impl MetadataConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// ARP proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArpConfig {
    /// Run the ARP proxy responder.
    pub enabled: bool,

    /// Interface to listen on.
    pub interface: String,
}

impl Default for ArpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interface: "eth0".to_string(),
        }
    }
}

/// SA reconciliation monitor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Run the SA monitor.
    pub enabled: bool,

    /// Delay before the first tick, lets the daemon come up.
    pub start_delay_secs: u64,

    /// Interval between ticks in seconds.
    pub interval_secs: u64,

    /// Daemon connection attempts per tick.
    pub connect_attempts: u32,

    /// Pause between connection attempts in milliseconds.
    pub connect_retry_delay_ms: u64,

    /// Upper bound for a single initiate command in seconds.
    pub initiate_timeout_secs: u64,

    /// Path of the daemon's VICI control socket.
    pub vici_socket: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_delay_secs: 60,
            interval_secs: 5,
            connect_attempts: 3,
            connect_retry_delay_ms: 1000,
            initiate_timeout_secs: 30,
            vici_socket: PathBuf::from("/var/run/charon.vici"),
        }
    }
}

impl MonitorConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn initiate_timeout(&self) -> Duration {
        Duration::from_secs(self.initiate_timeout_secs)
    }
}

/// Tunnel template configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory holding `ike.conf` and `childsa.conf`.
    pub directory: PathBuf,

    /// Reload the overlay when a template file changes on disk.
    pub watch: bool,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            watch: false,
        }
    }
}

/// Control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Bind address (e.g., "localhost:8111").
    pub listen: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            listen: "localhost:8111".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
