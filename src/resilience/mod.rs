//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! SA monitor tick:
//!     → retries.rs (daemon connect, fixed attempts with a fixed pause)
//!     → on exhaustion: tick skipped, next interval starts over
//! ```

pub mod retries;

pub use retries::{retry, RetryPolicy};
