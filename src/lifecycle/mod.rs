//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → change watcher, SA monitor, control server, template
//!     watcher exit their loops
//! ```
//!
//! # Design Decisions
//! - The first loop to exit ends the process; the others are stopped
//!   through the same broadcast

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
