//! # Real-Time Event Channel
//!
//! Long-lived Server-Sent Events connection delivering queue events pushed by
//! the server, with automatic reconnection.
//!
//! ## Features
//!
//! - **Handler Registry**: `on(event, handler)` per event name, each
//!   registration individually removable
//! - **Ordered Delivery**: events of one connection reach handlers in
//!   emission order
//! - **Reconnect with Backoff**: driven by a [`RetryPolicy`]; a bounded
//!   policy ends in [`ChannelStatus::GaveUp`]
//! - **Generations**: every successful connection gets a new generation
//!   number so listeners can re-fetch state missed during the gap
//!
//! ## Usage
//!
//! ```rust,no_run
//! use relief_sync::client::event_channel::EventChannel;
//! use relief_sync::client::offline::RetryPolicy;
//! use relief_sync::shared::EventName;
//!
//! # fn example() -> Result<(), relief_sync::shared::RemoteError> {
//! let channel = EventChannel::new("http://localhost:5000/events", None, RetryPolicy::default())?;
//!
//! let subscription = channel.on(EventName::HighPriorityAlert, |event| {
//!     println!("alert: {:?}", event);
//! });
//!
//! channel.connect();
//! // ...
//! subscription.unsubscribe();
//! channel.close();
//! # Ok(())
//! # }
//! ```

use bytes::BytesMut;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::offline::retry::RetryPolicy;
use crate::shared::error::{RemoteError, SyncError};
use crate::shared::{EventName, PushEvent};

/// Connection state of the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Not started
    Idle,
    /// Opening a connection
    Connecting,
    /// Receiving events on connection number `generation`
    Connected {
        generation: u64,
    },
    /// Waiting `delay` before reconnect attempt number `attempt`
    Retrying {
        attempt: u32,
        delay: Duration,
    },
    /// The reconnect policy ran out of attempts
    GaveUp,
    /// Closed by the owner
    Closed,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelStatus::Connected { .. })
    }
}

/// One decoded SSE frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, `message` when absent
    pub event: String,
    /// `data:` lines joined with `\n`
    pub data: String,
}

/// Incremental Server-Sent Events decoder
///
/// Accepts arbitrary chunk boundaries, including ones that split a UTF-8
/// sequence or a `\r\n` pair.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every frame it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = String::from_utf8_lossy(&line[..pos]);
            let line = line.strip_suffix('\r').unwrap_or(&line);

            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are not used
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

type Handler = Arc<dyn Fn(PushEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventName, Vec<(u64, Handler)>>>,
}

impl Registry {
    fn add(&self, name: EventName, handler: Handler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name)
            .or_default()
            .push((id, handler));
        id
    }

    fn remove(&self, name: EventName, id: u64) {
        if let Some(list) = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&name)
        {
            list.retain(|(existing, _)| *existing != id);
        }
    }

    fn dispatch(&self, event: PushEvent) {
        // clone out so handlers may (un)register without deadlocking
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event.name())
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(event.clone());
        }
    }
}

/// Handle removing one handler registration
#[must_use = "dropping the handle keeps the handler registered"]
pub struct Unsubscribe {
    registry: Weak<Registry>,
    name: EventName,
    id: u64,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.name, self.id);
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

/// Server-Sent Events push channel
pub struct EventChannel {
    url: String,
    token: Option<String>,
    policy: RetryPolicy,
    client: reqwest::Client,
    registry: Arc<Registry>,
    status: Arc<watch::Sender<ChannelStatus>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventChannel {
    /// Create a channel for `url`; nothing connects until [`connect`](Self::connect)
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self, RemoteError> {
        // no overall timeout: the response body never ends on its own
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        let (status, _) = watch::channel(ChannelStatus::Idle);

        Ok(Self {
            url: url.into(),
            token,
            policy,
            client,
            registry: Arc::new(Registry::default()),
            status: Arc::new(status),
            task: Mutex::new(None),
        })
    }

    /// Register `handler` for events named `name`
    pub fn on<F>(&self, name: EventName, handler: F) -> Unsubscribe
    where
        F: Fn(PushEvent) + Send + Sync + 'static,
    {
        let id = self.registry.add(name, Arc::new(handler));
        Unsubscribe {
            registry: Arc::downgrade(&self.registry),
            name,
            id,
        }
    }

    /// Deliver an event to the registered handlers as if it had been received
    pub fn dispatch(&self, event: PushEvent) {
        self.registry.dispatch(event);
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.subscribe()
    }

    /// Wait until connected, failing with `ChannelDisconnected` after `timeout`
    /// or once the channel gave up
    pub async fn wait_connected(&self, timeout: Duration) -> Result<u64, SyncError> {
        let mut rx = self.status.subscribe();
        let wait = async {
            loop {
                match &*rx.borrow_and_update() {
                    ChannelStatus::Connected { generation } => return Ok(*generation),
                    ChannelStatus::GaveUp | ChannelStatus::Closed => {
                        return Err(SyncError::ChannelDisconnected)
                    }
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(SyncError::ChannelDisconnected);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(Err(SyncError::ChannelDisconnected))
    }

    /// Start the connection loop; a running loop is left alone
    pub fn connect(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let worker = StreamWorker {
            url: self.url.clone(),
            token: self.token.clone(),
            policy: self.policy.clone(),
            client: self.client.clone(),
            registry: self.registry.clone(),
            status: self.status.clone(),
        };
        *task = Some(tokio::spawn(worker.run()));
    }

    /// Stop the connection loop
    pub fn close(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.status.send_replace(ChannelStatus::Closed);
        tracing::info!(url = %self.url, "event channel closed");
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("url", &self.url)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

struct StreamWorker {
    url: String,
    token: Option<String>,
    policy: RetryPolicy,
    client: reqwest::Client,
    registry: Arc<Registry>,
    status: Arc<watch::Sender<ChannelStatus>>,
}

impl StreamWorker {
    async fn run(self) {
        let mut backoff = self.policy.start();
        let mut generation = 0u64;

        loop {
            self.status.send_replace(ChannelStatus::Connecting);

            match self.open().await {
                Ok(response) => {
                    generation += 1;
                    backoff.reset();
                    tracing::info!(url = %self.url, generation, "event channel connected");
                    self.status
                        .send_replace(ChannelStatus::Connected { generation });

                    match self.pump(response).await {
                        Ok(()) => tracing::info!("event stream ended, reconnecting"),
                        Err(e) => tracing::warn!(error = %e, "event stream lost, reconnecting"),
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "cannot open event channel");
                }
            }

            match backoff.next_delay() {
                Some(delay) => {
                    self.status.send_replace(ChannelStatus::Retrying {
                        attempt: backoff.attempt(),
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::warn!(attempts = backoff.attempt(), "event channel gave up reconnecting");
                    self.status.send_replace(ChannelStatus::GaveUp);
                    return;
                }
            }
        }
    }

    async fn open(&self) -> Result<reqwest::Response, RemoteError> {
        let mut request = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RemoteError::Server {
                status: response.status().as_u16(),
                message: "event stream rejected".to_string(),
            });
        }
        Ok(response)
    }

    async fn pump(&self, response: reqwest::Response) -> Result<(), RemoteError> {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| RemoteError::Network(e.to_string()))?;
            for frame in decoder.push(&chunk) {
                self.deliver(frame);
            }
        }
        Ok(())
    }

    fn deliver(&self, frame: SseFrame) {
        match PushEvent::decode(&frame.event, &frame.data) {
            Ok(Some(event)) => {
                tracing::debug!(event = frame.event.as_str(), "push event received");
                self.registry.dispatch(event);
            }
            Ok(None) => tracing::debug!(event = frame.event.as_str(), "ignoring unknown event"),
            Err(e) => tracing::warn!(event = frame.event.as_str(), error = %e, "malformed push event"),
        }
    }
}
