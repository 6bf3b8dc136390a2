//! OS signal handling.
//!
//! SIGINT and SIGTERM both request a graceful stop. Reloads are requested
//! through the control surface, not by signal.

use tokio::signal;
use tokio::signal::unix::{self, SignalKind};

/// Wait for SIGINT or SIGTERM and return the signal's name.
pub async fn wait_for_shutdown() -> &'static str {
    let mut terminate = match unix::signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, only SIGINT will stop the agent");
            let _ = signal::ctrl_c().await;
            return "SIGINT";
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}
