//! Session Message Bus Client
//!
//! Publishes typed messages to per-session channels and consumes new entries
//! through a single shared poll loop, dispatching to registered handlers.
//!
//! ## Responsibilities
//! - **Publish**: encode + append with bounded retry; returns once the log
//!   acknowledges the append.
//! - **Consume**: one lazily-started loop per client, blocking on the log
//!   with a bounded wait so shutdown is observed promptly. Cursors start at
//!   the current tail, so only future entries are delivered.
//! - **Dispatch**: per-channel append order is preserved; foreign-session
//!   entries are discarded, malformed entries dropped after logging, and a
//!   failing handler never aborts the loop or starves its siblings.
//! - **Retention**: best-effort periodic deletion of entries older than the
//!   configured age, piggybacked on the poll loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::log::MessageLog;
use super::types::{channel_name, MessageKind, SessionMessage, WireEntry, CHANNELS};
use crate::peer::types::now_ms;

/// Default entry count for cold-start `get_recent` reads.
pub const DEFAULT_RECENT_COUNT: usize = 10;

/// Type alias for a thread-safe, asynchronous message handler. Takes the
/// decoded message and returns a Future resolving to a `Result<()>`; an `Err`
/// is logged against the offending message kind.
pub type MessageHandlerFn =
    Arc<dyn Fn(SessionMessage) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

pub struct BusClient {
    session_id: String,
    log: Arc<dyn MessageLog>,
    handlers: DashMap<MessageKind, Vec<MessageHandlerFn>>,
    /// Cleared by `shutdown`; the poll loop checks it before each reschedule.
    active: AtomicBool,
    /// Set once, when the first subscription starts the poll loop.
    listening: AtomicBool,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    poll_block: Duration,
    retention_max_age_ms: u64,
    retention_sweep_interval: Duration,
}

impl BusClient {
    pub fn new(
        session_id: &str,
        log: Arc<dyn MessageLog>,
        poll_block: Duration,
        retention_max_age_ms: u64,
        retention_sweep_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.to_string(),
            log,
            handlers: DashMap::new(),
            active: AtomicBool::new(true),
            listening: AtomicBool::new(false),
            poll_handle: Mutex::new(None),
            poll_block,
            retention_max_age_ms,
            retention_sweep_interval,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publishes a message on its kind's channel. Transient append failures
    /// are retried with backoff; a final failure is returned to the caller,
    /// who may simply retry on the next natural cycle (never session-fatal).
    pub async fn publish(&self, message: &SessionMessage) -> Result<u64> {
        let entry = message.encode()?;
        let channel = channel_name(&self.session_id, message.kind.channel());

        self.append_with_retry(&channel, entry, 3).await
    }

    /// Registers a handler for a message kind and lazily starts the shared
    /// consumption loop on the first subscription.
    pub fn subscribe<F, Fut>(self: &Arc<Self>, kind: MessageKind, handler: F)
    where
        F: Fn(SessionMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        // Type-erase the handler future so mixed async functions share a map.
        let handler_fn: MessageHandlerFn = Arc::new(move |message: SessionMessage| {
            Box::pin(handler(message)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.handlers.entry(kind).or_default().push(handler_fn);

        tracing::debug!("Registered handler for {} messages", kind.as_wire());

        if !self.listening.swap(true, Ordering::SeqCst) {
            let client = self.clone();
            let handle = tokio::spawn(async move {
                client.poll_loop().await;
            });

            *self.poll_handle.lock().unwrap() = Some(handle);
        }
    }

    /// One-shot cold-start read: the most recent `count` entries of a
    /// channel, newest first. Not part of the subscription stream.
    pub async fn get_recent(&self, channel: &str, count: usize) -> Result<Vec<SessionMessage>> {
        let name = channel_name(&self.session_id, channel);
        let records = self.log.read_latest(&name, count).await?;

        Ok(records
            .iter()
            .filter_map(|record| match SessionMessage::decode(&record.entry) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Skipping malformed entry on {}: {}", name, e);
                    None
                }
            })
            .collect())
    }

    /// Deletes entries older than `max_age_ms` from every session channel.
    /// Best-effort: failures are logged and the remaining channels still run.
    pub async fn retention_cleanup(&self, max_age_ms: u64) {
        let cutoff = now_ms().saturating_sub(max_age_ms);

        for channel in CHANNELS {
            let name = channel_name(&self.session_id, channel);

            match self.log.delete_older_than(&name, cutoff).await {
                Ok(0) => {}
                Ok(deleted) => tracing::info!("Cleaned {} old entries from {}", deleted, name),
                Err(e) => tracing::warn!("Retention cleanup failed for {}: {}", name, e),
            }
        }
    }

    /// Stops the consumption loop. Idempotent; safe to call while a poll is
    /// in flight.
    pub fn shutdown(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.poll_handle.lock().unwrap().take() {
            handle.abort();
        }

        tracing::debug!("Bus client for session {} shut down", self.session_id);
    }

    async fn poll_loop(self: Arc<Self>) {
        // Start every cursor at the current tail: no historical replay.
        let mut cursors: Vec<(String, u64)> = Vec::with_capacity(CHANNELS.len());
        for channel in CHANNELS {
            let name = channel_name(&self.session_id, channel);
            let tail = match self.log.last_entry_id(&name).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::warn!("Failed to read tail of {}: {}", name, e);
                    0
                }
            };
            cursors.push((name, tail));
        }

        tracing::debug!(
            "Listening on {} channels for session {}",
            cursors.len(),
            self.session_id
        );

        let mut last_sweep = tokio::time::Instant::now();

        while self.active.load(Ordering::SeqCst) {
            match self.log.read_new(&cursors, self.poll_block).await {
                Ok(batches) => {
                    for (channel, records) in batches {
                        let Some(cursor) =
                            cursors.iter_mut().find(|(name, _)| name == &channel)
                        else {
                            continue;
                        };

                        for record in records {
                            cursor.1 = cursor.1.max(record.entry_id);
                            self.dispatch(&record.entry).await;
                        }
                    }
                }
                Err(e) => {
                    // Transient log failure: retried on the next poll tick.
                    tracing::warn!("Bus poll failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }

            if last_sweep.elapsed() >= self.retention_sweep_interval {
                last_sweep = tokio::time::Instant::now();
                self.retention_cleanup(self.retention_max_age_ms).await;
            }
        }

        tracing::debug!("Consumption loop for session {} stopped", self.session_id);
    }

    async fn dispatch(&self, entry: &WireEntry) {
        // Foreign-session entries are expected on shared infrastructure;
        // discard without side effects.
        if entry.session_id != self.session_id {
            return;
        }

        let message = match SessionMessage::decode(entry) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping malformed entry ({}): {}", entry.kind, e);
                return;
            }
        };

        let handlers: Vec<MessageHandlerFn> = self
            .handlers
            .get(&message.kind)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();

        for handler in handlers {
            if let Err(e) = handler(message.clone()).await {
                tracing::error!(
                    "Handler error for {} message: {:#}",
                    message.kind.as_wire(),
                    e
                );
            }
        }
    }

    async fn append_with_retry(
        &self,
        channel: &str,
        entry: WireEntry,
        attempts: usize,
    ) -> Result<u64> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            match self.log.append(channel, entry.clone()).await {
                Ok(entry_id) => return Ok(entry_id),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(e);
                    }

                    tracing::warn!(
                        "Append to {} failed (attempt {}): {}",
                        channel,
                        attempt + 1,
                        e
                    );

                    // Simple jitter to prevent thundering herd
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        if let Some(handle) = self.poll_handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}
