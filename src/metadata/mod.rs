//! Cluster metadata subsystem.
//!
//! # Data Flow
//! ```text
//! metadata service (HTTP/JSON)
//!     → client.rs (MetadataSource: typed documents)
//!     → snapshot.rs (ClusterSnapshot: one consistent fetch)
//!     → store (topology build)
//!
//! watcher.rs:
//!     poll /version every interval
//!     → on change: Overlay::reload
//! ```

pub mod client;
pub mod snapshot;
pub mod types;
pub mod watcher;

pub use client::{MetadataClient, MetadataError, MetadataResult, MetadataSource};
pub use snapshot::ClusterSnapshot;
pub use types::{Container, Environment, Host, Network, Service};
pub use watcher::ChangeWatcher;
