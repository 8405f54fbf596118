//! # Background Sync Tasks
//!
//! Wires the engine to its event sources and keeps it running unattended.
//!
//! ## Features
//!
//! - **Push Events**: every event of the real-time channel is funnelled
//!   through one task, so events apply in the order they were received
//! - **Reconnect Refresh**: each new channel connection re-fetches the queue
//!   to cover whatever was missed while disconnected
//! - **Connectivity**: going online drains the pending queue and refreshes
//! - **Periodic Drain**: optional retry of failed mutations while online
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use relief_sync::client::sync::SyncEngine;
//! # use relief_sync::client::event_channel::EventChannel;
//! # async fn example(engine: SyncEngine, channel: EventChannel) {
//! engine.start(&channel);
//! // ...
//! engine.shutdown();
//! channel.close();
//! # }
//! ```

use std::sync::PoisonError;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::event_channel::{ChannelStatus, EventChannel, Unsubscribe};
use crate::client::sync::network_monitor::{ConnectivityState, TransitionSubscription};
use crate::client::sync::sync_state::EngineNotice;
use crate::client::sync::SyncEngine;
use crate::shared::EventName;

/// Tasks and registrations owned by a started engine
#[derive(Default)]
pub(crate) struct Background {
    tasks: Vec<JoinHandle<()>>,
    handlers: Vec<Unsubscribe>,
    transitions: Option<TransitionSubscription>,
}

impl Background {
    fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        for handler in self.handlers.drain(..) {
            handler.unsubscribe();
        }
        // dropping the subscription stops its task
        self.transitions = None;
    }
}

impl SyncEngine {
    /// Start every background activity and connect `channel`
    pub fn start(&self, channel: &EventChannel) {
        self.watch_connectivity();
        self.attach_channel(channel);
        self.spawn_periodic_drain();
        tracing::info!("sync engine started");
    }

    /// Drain and refresh on every OFFLINE → ONLINE transition
    pub fn watch_connectivity(&self) {
        let on_online = self.clone();
        let on_offline = self.clone();

        let subscription = self.inner.monitor.on_transition(
            move || {
                let engine = on_online.clone();
                tokio::spawn(async move {
                    engine.notify(EngineNotice::Connectivity(ConnectivityState::Online));
                    let outcome = engine.sync_and_refresh().await;
                    tracing::info!(synced = outcome.synced, failed = outcome.failed, "back online");
                });
            },
            move || {
                tracing::info!("offline, status changes will be queued");
                on_offline.notify(EngineNotice::Connectivity(ConnectivityState::Offline));
            },
        );

        self.with_background(|bg| bg.transitions = Some(subscription));
    }

    /// Route the channel's events and status into the engine, then connect it
    pub fn attach_channel(&self, channel: &EventChannel) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handlers: Vec<Unsubscribe> = EventName::ALL
            .into_iter()
            .map(|name| {
                let tx = tx.clone();
                channel.on(name, move |event| {
                    // receiver gone means the engine shut down
                    let _ = tx.send(event);
                })
            })
            .collect();

        let engine = self.clone();
        let events = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                engine.handle_push(event).await;
            }
        });

        let engine = self.clone();
        let mut status_rx = channel.subscribe_status();
        let status = tokio::spawn(async move {
            let mut last_generation = 0;
            loop {
                let status = status_rx.borrow_and_update().clone();
                engine.inner.channel_status.send_replace(status.clone());
                engine.notify(EngineNotice::Channel(status.clone()));

                if let ChannelStatus::Connected { generation } = status {
                    if generation != last_generation {
                        last_generation = generation;
                        engine.load_queue().await;
                        engine.refresh_assigned().await;
                    }
                }

                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        self.with_background(|bg| {
            bg.handlers.extend(handlers);
            bg.tasks.push(events);
            bg.tasks.push(status);
        });

        channel.connect();
    }

    /// Retry the drain on `drain_interval` while online with pending mutations
    pub fn spawn_periodic_drain(&self) {
        let Some(interval) = self.inner.drain_interval else {
            return;
        };

        let engine = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(10)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !engine.inner.monitor.is_reachable() || engine.pending_mutations().await.is_empty() {
                    continue;
                }

                let outcome = engine.trigger_drain().await;
                if outcome.synced > 0 {
                    engine.load_queue().await;
                    engine.refresh_assigned().await;
                }
            }
        });

        self.with_background(|bg| bg.tasks.push(task));
    }

    /// Stop every background activity
    ///
    /// The engine stays usable for direct calls afterwards.
    pub fn shutdown(&self) {
        self.with_background(Background::stop);
        tracing::info!("sync engine stopped");
    }

    fn with_background<R>(&self, f: impl FnOnce(&mut Background) -> R) -> R {
        let mut bg = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut bg)
    }
}
