//! Proxy ARP for addresses on remote hosts.
//!
//! # Data Flow
//! ```text
//! interface (raw Ethernet)
//!     → transport.rs (FrameTransport)
//!     → responder.rs (filter requests, consult TopologyStore::is_remote)
//!     → reply with own MAC
//! ```

pub mod responder;
pub mod transport;

pub use responder::{proxy_reply, ArpResponder};
pub use transport::{DatalinkTransport, FrameTransport, TransportError};

use std::sync::Arc;

use crate::store::TopologyStore;

/// Open `interface` and answer ARP requests on it. Only returns on a
/// transport failure.
pub fn listen_and_serve(store: Arc<TopologyStore>, interface: &str) -> Result<(), TransportError> {
    let mut transport = DatalinkTransport::open(interface)?;
    tracing::info!(interface = %transport.interface(), "Opened raw socket for ARP proxy");
    ArpResponder::new(store).serve(&mut transport)
}
