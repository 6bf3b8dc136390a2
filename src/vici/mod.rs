//! Client for the tunnel daemon's VICI control protocol.
//!
//! # Data Flow
//! ```text
//! SaMonitor
//!     → ViciConnector::connect (fresh Unix socket per tick)
//!     → ViciSession (DaemonSession: list_sas, initiate)
//!     → client.rs (request / streamed request)
//!     → codec.rs (packets and messages)
//! ```

pub mod client;
pub mod codec;

pub use client::{sa_summaries, ViciClient, ViciConnector, ViciError};
pub use codec::{CodecError, Element, Message, Packet, PacketType};
