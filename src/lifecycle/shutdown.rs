//! Shutdown coordination for the agent's loops.

use tokio::sync::broadcast;

/// Broadcasts a single stop signal to every long-running loop.
///
/// The ARP responder runs on a blocking thread and does not subscribe; it
/// ends with the process.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber to stop.
    pub fn trigger(&self, reason: &str) {
        tracing::info!(reason, loops = self.tx.receiver_count(), "Stopping agent loops");
        let _ = self.tx.send(());
    }

    /// Loops that have subscribed and not yet exited.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
