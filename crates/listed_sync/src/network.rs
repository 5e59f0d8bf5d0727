//! Local connectivity tracking.

use listed_core::{Listeners, Subscription};
use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether this device can reach the relay.
///
/// Platform code feeds signals in through [`signal_online`] and
/// [`signal_offline`]; every signal fires the matching callbacks
/// synchronously, including repeated signals for the same state.
///
/// [`signal_online`]: NetworkLinkMonitor::signal_online
/// [`signal_offline`]: NetworkLinkMonitor::signal_offline
#[derive(Debug)]
pub struct NetworkLinkMonitor {
    online: AtomicBool,
    online_listeners: Listeners<()>,
    offline_listeners: Listeners<()>,
}

impl NetworkLinkMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            online_listeners: Listeners::new(),
            offline_listeners: Listeners::new(),
        }
    }

    /// Returns the current connectivity.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Registers a callback for online signals.
    pub fn on_online<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.online_listeners.subscribe(move |_| callback())
    }

    /// Registers a callback for offline signals.
    pub fn on_offline<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.offline_listeners.subscribe(move |_| callback())
    }

    /// Records that the platform reported connectivity.
    pub fn signal_online(&self) {
        self.online.store(true, Ordering::SeqCst);
        self.online_listeners.emit(&());
    }

    /// Records that the platform reported loss of connectivity.
    pub fn signal_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.offline_listeners.emit(&());
    }

    /// Signals `online` or offline.
    pub fn set_online(&self, online: bool) {
        if online {
            self.signal_online();
        } else {
            self.signal_offline();
        }
    }
}

impl Default for NetworkLinkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
