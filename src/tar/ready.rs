//! Per-path readiness signalling for the tar reader.

use dashmap::DashMap;
use tokio::sync::watch;

/// Append-only pubsub over path keys.
///
/// `emit` wakes every current and future waiter on the key; the emitted
/// set only grows, so a `wait` on an already-emitted key returns
/// immediately.
pub(crate) struct ReadyBus {
    channels: DashMap<String, watch::Sender<bool>>,
}

impl ReadyBus {
    pub fn new() -> ReadyBus {
        ReadyBus { channels: DashMap::new() }
    }

    fn sender(&self, key: &str) -> watch::Sender<bool> {
        self.channels
            .entry(key.to_owned())
            .or_insert_with(|| watch::channel(false).0)
            .clone()
    }

    /// Marks `key` ready.
    pub fn emit(&self, key: &str) {
        self.sender(key).send_replace(true);
    }

    /// True once `key` has been emitted.
    pub fn is_emitted(&self, key: &str) -> bool {
        self.channels.get(key).map(|sender| *sender.borrow()).unwrap_or(false)
    }

    /// Resolves once `key` has been emitted.
    pub async fn wait(&self, key: &str) {
        let mut receiver = self.sender(key).subscribe();
        let _ = receiver.wait_for(|ready| *ready).await;
    }
}
