//! Topology store.
//!
//! # Data Flow
//! ```text
//! MetadataSource
//!     → ClusterSnapshot::fetch
//!     → Topology::build (pure classification)
//!     → TopologyStore (ArcSwap, swapped under a mutex)
//!     → readers: ARP responder, SA monitor, config builder
//! ```

pub mod entry;
pub mod network;
pub mod topology;
pub mod topology_store;

pub use entry::Entry;
pub use topology::{Topology, TopologyError};
pub use topology_store::{StoreError, TopologyStore};
