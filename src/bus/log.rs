//! Ordered Message Log Abstraction
//!
//! The session's sole coordination substrate: an external, per-channel,
//! append-only ordered log (Redis-Streams-shaped). `MessageLog` is the
//! integration seam for a real log service; `InMemoryLog` is the provided
//! backend, shared by every coordinator in the process, which also makes
//! multi-peer failover scenarios testable without external infrastructure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;

use super::types::WireEntry;

/// One appended entry together with its bus-assigned sequence id.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub entry_id: u64,
    pub entry: WireEntry,
}

/// Ordered append-only log, one stream per channel.
///
/// Entry ids are strictly increasing within a channel. Reads never mutate
/// the log; deletion happens only through retention cleanup.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Appends an entry and returns its assigned id. Returning means the log
    /// acknowledged the append.
    async fn append(&self, channel: &str, entry: WireEntry) -> Result<u64>;

    /// Returns entries newer than each channel's cursor, blocking up to
    /// `block` when nothing is available. An empty result after the bounded
    /// wait is normal, not an error.
    async fn read_new(
        &self,
        cursors: &[(String, u64)],
        block: Duration,
    ) -> Result<Vec<(String, Vec<LogRecord>)>>;

    /// The most recent `count` entries of a channel, newest first.
    async fn read_latest(&self, channel: &str, count: usize) -> Result<Vec<LogRecord>>;

    /// Current tail id of a channel (0 when empty). Used to start consumers
    /// at "now" so only future entries are delivered.
    async fn last_entry_id(&self, channel: &str) -> Result<u64>;

    /// Deletes entries with `timestamp < cutoff_ms`. Entries at or after the
    /// cutoff survive. Returns the number deleted.
    async fn delete_older_than(&self, channel: &str, cutoff_ms: u64) -> Result<usize>;
}

/// In-process log backend. A single id counter keeps ids strictly increasing
/// across every channel; a `Notify` wakes blocked readers on append.
pub struct InMemoryLog {
    streams: DashMap<String, Vec<LogRecord>>,
    next_id: AtomicU64,
    appended: Notify,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
            next_id: AtomicU64::new(1),
            appended: Notify::new(),
        }
    }

    fn collect_new(&self, cursors: &[(String, u64)]) -> Vec<(String, Vec<LogRecord>)> {
        let mut batches = Vec::new();

        for (channel, cursor) in cursors {
            if let Some(stream) = self.streams.get(channel) {
                let fresh: Vec<LogRecord> = stream
                    .iter()
                    .filter(|record| record.entry_id > *cursor)
                    .cloned()
                    .collect();

                if !fresh.is_empty() {
                    batches.push((channel.clone(), fresh));
                }
            }
        }

        batches
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLog for InMemoryLog {
    async fn append(&self, channel: &str, entry: WireEntry) -> Result<u64> {
        let entry_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.streams
            .entry(channel.to_string())
            .or_default()
            .push(LogRecord { entry_id, entry });

        self.appended.notify_waiters();

        Ok(entry_id)
    }

    async fn read_new(
        &self,
        cursors: &[(String, u64)],
        block: Duration,
    ) -> Result<Vec<(String, Vec<LogRecord>)>> {
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // Arm the wakeup before scanning so an append between the scan
            // and the wait is not missed.
            let notified = self.appended.notified();

            let batches = self.collect_new(cursors);
            if !batches.is_empty() {
                return Ok(batches);
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }

            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn read_latest(&self, channel: &str, count: usize) -> Result<Vec<LogRecord>> {
        let Some(stream) = self.streams.get(channel) else {
            return Ok(Vec::new());
        };

        Ok(stream.iter().rev().take(count).cloned().collect())
    }

    async fn last_entry_id(&self, channel: &str) -> Result<u64> {
        Ok(self
            .streams
            .get(channel)
            .and_then(|stream| stream.last().map(|record| record.entry_id))
            .unwrap_or(0))
    }

    async fn delete_older_than(&self, channel: &str, cutoff_ms: u64) -> Result<usize> {
        let Some(mut stream) = self.streams.get_mut(channel) else {
            return Ok(0);
        };

        let before = stream.len();
        stream.retain(|record| record.entry.timestamp >= cutoff_ms);

        Ok(before - stream.len())
    }
}
