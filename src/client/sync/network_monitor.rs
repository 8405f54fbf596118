//! # Network Monitor
//!
//! Tracks whether the server is reachable and notifies on transitions.
//!
//! ## Features
//!
//! - **Connectivity Detection**: synchronous `is_reachable()` predicate
//! - **Edge-Triggered Callbacks**: one notification per actual change,
//!   never on registration
//! - **Reachability Probe**: periodic TCP connect for hosts without a
//!   platform link signal
//!
//! The signal is best effort. Callers still treat remote call failures as a
//! possible loss of reachability.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::sync::network_monitor::{ConnectivityState, NetworkMonitor};
//!
//! # async fn example() {
//! let monitor = NetworkMonitor::new(ConnectivityState::Offline);
//!
//! let subscription = monitor.on_transition(
//!     || println!("back online"),
//!     || println!("lost connection"),
//! );
//!
//! monitor.set_state(ConnectivityState::Online);
//! drop(subscription);
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Process-wide connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl From<bool> for ConnectivityState {
    fn from(online: bool) -> Self {
        if online {
            ConnectivityState::Online
        } else {
            ConnectivityState::Offline
        }
    }
}

/// Connectivity tracker shared by the engine and its host
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<ConnectivityState>>,
}

impl NetworkMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Whether the server is believed reachable right now
    pub fn is_reachable(&self) -> bool {
        self.state().is_online()
    }

    /// Report the current connectivity
    ///
    /// Returns `true` when this was an actual change. Reporting the current
    /// state again notifies nobody.
    pub fn set_state(&self, next: ConnectivityState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });

        if changed {
            tracing::info!(state = ?next, "connectivity changed");
        }
        changed
    }

    /// Watch connectivity changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Call `on_online` / `on_offline` on each transition
    ///
    /// Registration does not fire for the current state. Dropping or
    /// cancelling the returned subscription stops notifications.
    pub fn on_transition<F, G>(&self, on_online: F, on_offline: G) -> TransitionSubscription
    where
        F: Fn() + Send + 'static,
        G: Fn() + Send + 'static,
    {
        let mut rx = self.state.subscribe();
        // the current value counts as seen
        let mut last = *rx.borrow_and_update();

        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let now = *rx.borrow_and_update();
                if now == last {
                    continue;
                }
                last = now;
                match now {
                    ConnectivityState::Online => on_online(),
                    ConnectivityState::Offline => on_offline(),
                }
            }
        });

        TransitionSubscription { task: Some(task) }
    }

    /// Probe `addr` every `interval` and feed the result into this monitor
    pub fn spawn_probe(&self, addr: SocketAddr, interval: Duration) -> JoinHandle<()> {
        let probe = ReachabilityProbe::new(addr, interval.min(Duration::from_secs(3)));
        let monitor = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe.check().await;
                monitor.set_state(reachable.into());
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

/// Handle returned by [`NetworkMonitor::on_transition`]
#[derive(Debug)]
pub struct TransitionSubscription {
    task: Option<JoinHandle<()>>,
}

impl TransitionSubscription {
    /// Stop receiving notifications
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TransitionSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// TCP connect check against the server
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    addr: SocketAddr,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Whether a TCP connection can be opened within the timeout
    pub async fn check(&self) -> bool {
        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "reachability probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(addr = %self.addr, "reachability probe timed out");
                false
            }
        }
    }
}
