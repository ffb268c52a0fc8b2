//! Connectivity Gate
//!
//! Owned online/offline flag with change notification. The gate never probes
//! the network; whoever owns the real connection status feeds it in.

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

pub struct ConnectivityGate {
    online: Mutex<bool>,
    changes: broadcast::Sender<bool>,
}

impl ConnectivityGate {
    pub fn new(online: bool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            online: Mutex::new(online),
            changes,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.online.lock()
    }

    /// Set the flag. Subscribers are notified only when the value actually changes.
    ///
    /// Returns whether the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        let mut current = self.online.lock();
        if *current == online {
            return false;
        }
        *current = online;
        debug!(online, "connectivity changed");
        // No receivers is fine; the flag itself is the source of truth.
        let _ = self.changes.send(online);
        true
    }

    /// Receive every subsequent change, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.changes.subscribe()
    }
}

impl Default for ConnectivityGate {
    fn default() -> Self {
        Self::new(true)
    }
}
