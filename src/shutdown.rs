//! Shutdown signalling
//!
//! A `watch` channel carries a single "stop" flag from the server to every
//! connection task. Handlers see it through
//! [`Context::is_cancelled`](crate::commands::Context::is_cancelled).

use tokio::sync::watch;

/// Sending side, owned by whoever decides when to stop.
///
/// Dropping the trigger also signals shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Receiving side, cloned into each connection.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

/// Creates a connected trigger/receiver pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Shutdown {
    /// Returns true once shutdown was triggered or the trigger was dropped.
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Waits until shutdown is signalled.
    pub async fn recv(&mut self) {
        // An Err means the trigger is gone, which also means stop
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_wakes_receivers() {
        let (trigger, shutdown) = channel();
        let mut waiter = shutdown.clone();

        assert!(!shutdown.is_shutdown());

        let task = tokio::spawn(async move { waiter.recv().await });
        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropping_trigger_signals_shutdown() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);

        assert!(shutdown.is_shutdown());
        tokio::time::timeout(Duration::from_secs(1), shutdown.recv())
            .await
            .unwrap();
    }
}
