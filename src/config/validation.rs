//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, at least one connect attempt)
//! - Check addresses and names are usable before any loop starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AgentConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AgentConfig;
use crate::observability::logging::LOG_LEVELS;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} is not a valid address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("unknown log level: {0}")]
    LogLevel(String),
}

pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.metadata.address.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "metadata.address" });
    }
    if config.metadata.poll_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "metadata.poll_interval_secs" });
    }
    if config.metadata.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "metadata.request_timeout_secs" });
    }

    if config.arp.enabled && config.arp.interface.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "arp.interface" });
    }

    if config.monitor.enabled {
        if config.monitor.interval_secs == 0 {
            errors.push(ValidationError::Zero { field: "monitor.interval_secs" });
        }
        if config.monitor.connect_attempts == 0 {
            errors.push(ValidationError::Zero { field: "monitor.connect_attempts" });
        }
        if config.monitor.initiate_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "monitor.initiate_timeout_secs" });
        }
        if config.monitor.vici_socket.as_os_str().is_empty() {
            errors.push(ValidationError::Empty { field: "monitor.vici_socket" });
        }
    }

    // "localhost:8111" is fine for a listener but not a SocketAddr, so only
    // require a port here.
    let listen = config.control.listen.trim();
    let has_port = listen
        .rsplit_once(':')
        .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
        .unwrap_or(false);
    if !has_port {
        errors.push(ValidationError::InvalidAddress {
            field: "control.listen",
            value: config.control.listen.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
