//! The overlay agent's reloadable state.
//!
//! [`Overlay`] owns the topology store and the template manager. A reload
//! re-reads the templates and then refreshes the topology; it is triggered
//! by metadata changes and by the control surface.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::metadata::MetadataSource;
use crate::store::{StoreError, TopologyStore};
use crate::templates::{TemplateError, TemplateManager};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("template reload failed: {0}")]
    Templates(#[from] TemplateError),

    #[error("topology refresh failed: {0}")]
    Topology(#[from] StoreError),
}

/// Something that can rebuild its state from scratch.
#[async_trait]
pub trait Reloadable: Send + Sync {
    async fn reload(&self) -> Result<(), ReloadError>;
}

pub struct Overlay {
    metadata: Arc<dyn MetadataSource>,
    store: Arc<TopologyStore>,
    templates: Arc<TemplateManager>,
}

impl Overlay {
    pub fn new(metadata: Arc<dyn MetadataSource>, store: Arc<TopologyStore>, templates: Arc<TemplateManager>) -> Self {
        Self {
            metadata,
            store,
            templates,
        }
    }
}

#[async_trait]
impl Reloadable for Overlay {
    async fn reload(&self) -> Result<(), ReloadError> {
        let revision = self.templates.reload()?;
        let topology = self.store.refresh(self.metadata.as_ref()).await?;
        tracing::info!(
            revision = %revision,
            entries = topology.entries().len(),
            "Overlay reloaded"
        );
        Ok(())
    }
}
