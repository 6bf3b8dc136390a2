//! Metadata service client.
//!
//! # Responsibilities
//! - Define the read-only collaborator interface the agent depends on
//! - Fetch JSON documents from the metadata HTTP service with timeouts
//! - Block at startup until the service answers
//!
//! # Design Decisions
//! - One trait (`MetadataSource`) so the store, the SA monitor and the
//!   change watcher can be driven by in-memory fakes in tests
//! - Errors carry the request path so log lines identify what failed

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::MetadataConfig;
use crate::metadata::types::{Container, Environment, Host, Network, Service};

/// Errors that can occur while talking to the metadata service.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The request could not be sent or the connection failed.
    #[error("metadata request {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("metadata request {path} returned {status}")]
    Status { path: String, status: u16 },

    /// The body was not the expected JSON document.
    #[error("metadata response for {path} could not be decoded: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The configured base URL is unusable.
    #[error("invalid metadata URL '{0}'")]
    InvalidUrl(String),

    /// The source is not reachable right now.
    #[error("metadata unavailable: {0}")]
    Unavailable(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Read-only view of the cluster metadata.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Opaque version token; changes whenever any document changes.
    async fn get_version(&self) -> MetadataResult<String>;
    async fn get_self_container(&self) -> MetadataResult<Container>;
    async fn get_self_host(&self) -> MetadataResult<Host>;
    async fn get_self_service(&self) -> MetadataResult<Service>;
    async fn get_hosts(&self) -> MetadataResult<Vec<Host>>;
    async fn get_containers(&self) -> MetadataResult<Vec<Container>>;
    async fn get_services(&self) -> MetadataResult<Vec<Service>>;
    async fn get_networks(&self) -> MetadataResult<Vec<Network>>;
    /// Empty when the environment is not part of a region.
    async fn get_region_name(&self) -> MetadataResult<String>;
    async fn get_environments(&self) -> MetadataResult<Vec<Environment>>;
}

/// HTTP client for the metadata service.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    http: reqwest::Client,
    base_url: Url,
}

impl MetadataClient {
    /// Create a client for `http://<address>/<api_version>/`.
    pub fn new(config: &MetadataConfig) -> MetadataResult<Self> {
        let raw = format!(
            "http://{}/{}/",
            config.address.trim_end_matches('/'),
            config.api_version.trim_matches('/')
        );
        let base_url = Url::parse(&raw).map_err(|_| MetadataError::InvalidUrl(raw.clone()))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MetadataError::Request {
                path: raw.clone(),
                source: e,
            })?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Poll the version document until the service answers.
    pub async fn wait_until_ready(&self, retry_every: Duration) -> String {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.get_version().await {
                Ok(version) => {
                    tracing::info!(base_url = %self.base_url, version = %version, "Metadata service reachable");
                    return version;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Waiting for metadata service");
                    tokio::time::sleep(retry_every).await;
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> MetadataResult<T> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|_| MetadataError::InvalidUrl(format!("{}{}", self.base_url, path)))?;

        let response = self
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|e| MetadataError::Request {
                path: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| MetadataError::Decode {
            path: path.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl MetadataSource for MetadataClient {
    async fn get_version(&self) -> MetadataResult<String> {
        self.get_json("/version").await
    }

    async fn get_self_container(&self) -> MetadataResult<Container> {
        self.get_json("/self/container").await
    }

    async fn get_self_host(&self) -> MetadataResult<Host> {
        self.get_json("/self/host").await
    }

    async fn get_self_service(&self) -> MetadataResult<Service> {
        self.get_json("/self/service").await
    }

    async fn get_hosts(&self) -> MetadataResult<Vec<Host>> {
        self.get_json("/hosts").await
    }

    async fn get_containers(&self) -> MetadataResult<Vec<Container>> {
        self.get_json("/containers").await
    }

    async fn get_services(&self) -> MetadataResult<Vec<Service>> {
        self.get_json("/services").await
    }

    async fn get_networks(&self) -> MetadataResult<Vec<Network>> {
        self.get_json("/networks").await
    }

    async fn get_region_name(&self) -> MetadataResult<String> {
        self.get_json("/self/region_name").await
    }

    async fn get_environments(&self) -> MetadataResult<Vec<Environment>> {
        self.get_json("/environments").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let config = MetadataConfig::default();
        let client = MetadataClient::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://169.254.169.250/2016-07-29/");
        assert_eq!(
            client.base_url().join("self/container").unwrap().as_str(),
            "http://169.254.169.250/2016-07-29/self/container"
        );
    }

    #[test]
    fn test_base_url_with_port() {
        let config = MetadataConfig {
            address: "127.0.0.1:9346/".to_string(),
            ..MetadataConfig::default()
        };
        let client = MetadataClient::new(&config).unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:9346/2016-07-29/");
    }

    #[test]
    fn test_error_display() {
        let err = MetadataError::Status {
            path: "/hosts".to_string(),
            status: 503,
        };
        assert_eq!(err.to_string(), "metadata request /hosts returned 503");
    }
}
