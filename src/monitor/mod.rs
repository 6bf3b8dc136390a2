//! SA reconciliation.
//!
//! # Data Flow
//! ```text
//! every interval (after the start delay):
//!     metadata: self service active? → hosts, self host
//!     → expected peers (every other host, by agent IP)
//!     → DaemonConnector::connect (with retry)
//!     → DaemonSession::list_sas → mark found
//!     → DaemonSession::initiate("child-<ip>") for the rest
//! ```

pub mod daemon;
pub mod sa_monitor;

pub use daemon::{DaemonConnector, DaemonError, DaemonResult, DaemonSession, SaSummary};
pub use sa_monitor::{
    child_sa_name, expected_hosts, InitiateFailure, ReconcileReport, SaMonitor, SkipReason, TickOutcome,
};
