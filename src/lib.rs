//! IPsec overlay host agent library.

pub mod arp;
pub mod config;
pub mod control;
pub mod lifecycle;
pub mod metadata;
pub mod monitor;
pub mod observability;
pub mod overlay;
pub mod resilience;
pub mod store;
pub mod templates;
pub mod vici;

pub use config::schema::AgentConfig;
pub use lifecycle::Shutdown;
pub use overlay::{Overlay, ReloadError, Reloadable};
pub use store::TopologyStore;
