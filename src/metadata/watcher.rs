//! Metadata change watcher.
//!
//! # Responsibilities
//! - Poll the metadata version token at a fixed interval
//! - Trigger a full overlay reload whenever the token changes
//!
//! # Design Decisions
//! - Level of detail is the version token only; what changed is
//!   recomputed from scratch by the reload
//! - A failed reload is logged and not retried until the next version
//!   change (or an explicit reload through the control surface)
//! - Polling could be swapped for a push mechanism without touching the
//!   reload target

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::metadata::client::MetadataSource;
use crate::observability::metrics;
use crate::overlay::Reloadable;

pub struct ChangeWatcher {
    source: Arc<dyn MetadataSource>,
    interval: Duration,
    last_version: Option<String>,
}

impl ChangeWatcher {
    pub fn new(source: Arc<dyn MetadataSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            last_version: None,
        }
    }

    /// Start from a version that has already been applied, so the first
    /// poll does not reload again.
    pub fn with_initial_version(mut self, version: impl Into<String>) -> Self {
        self.last_version = Some(version.into());
        self
    }

    pub async fn run(mut self, target: Arc<dyn Reloadable>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Metadata change watcher starting");

        loop {
            self.poll_once(target.as_ref()).await;

            tokio::select! {
                _ = time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("Metadata change watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check the version once; returns true when a reload was triggered.
    pub async fn poll_once(&mut self, target: &dyn Reloadable) -> bool {
        let version = match self.source.get_version().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read metadata version");
                return false;
            }
        };

        if self.last_version.as_deref() == Some(version.as_str()) {
            return false;
        }

        tracing::info!(version = %version, "Metadata change received");
        self.last_version = Some(version);

        match target.reload().await {
            Ok(()) => {
                tracing::debug!("Reload successful");
                metrics::record_reload("metadata", true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Error reloading after metadata change");
                metrics::record_reload("metadata", false);
            }
        }
        true
    }
}
