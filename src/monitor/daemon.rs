//! Tunnel daemon collaborator.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("daemon unavailable: {0}")]
    Unavailable(String),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon command {command} failed: {message}")]
    CommandFailed { command: String, message: String },

    #[error("daemon command {0} timed out")]
    Timeout(String),
}

pub type DaemonResult<T> = Result<T, DaemonError>;

/// One active IKE SA as reported by the daemon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaSummary {
    pub name: String,
    pub remote_host: String,
    pub state: String,
}

/// Opens a fresh control session per use.
#[async_trait]
pub trait DaemonConnector: Send + Sync {
    async fn connect(&self) -> DaemonResult<Box<dyn DaemonSession>>;
}

/// A live control session. Dropping it closes the connection.
#[async_trait]
pub trait DaemonSession: Send {
    async fn list_sas(&mut self) -> DaemonResult<Vec<SaSummary>>;

    async fn initiate(&mut self, child: &str) -> DaemonResult<()>;
}
