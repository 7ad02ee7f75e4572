//! Shutdown coordination for the gateway.

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// One broadcast channel fans the stop signal out to everything with a
/// lifetime of its own: the HTTP accept loop (which then stops the rate-limit
/// sweeper and terminates the agent daemon on its way out) and any CLI-driven
/// triggers. Subscribers that join after the trigger fired see lag, not the
/// signal, so subscribe before spawning.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Safe to call with no subscribers (e.g.
    /// the server already exited on its own).
    pub fn trigger(&self) {
        let listeners = self.tx.receiver_count();
        tracing::info!(listeners, "Shutdown triggered");
        let _ = self.tx.send(());
    }

    /// Number of tasks still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_subscribers_observe_the_trigger() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        a.recv().await.unwrap();
        b.recv().await.unwrap();
    }

    #[test]
    fn test_trigger_without_subscribers_is_harmless() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.receiver_count(), 0);
        shutdown.trigger();
    }
}
