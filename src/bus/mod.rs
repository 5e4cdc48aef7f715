//! Message Bus Module
//!
//! Per-session, per-channel ordered messaging over an external append-only
//! log, with at-least-once delivery to registered handlers.
//!
//! ## Architecture Overview
//! 1. **Wire types** (`types`): a closed tagged union of message kinds and
//!    payload schemas; parsing failures are caught at this boundary.
//! 2. **Log abstraction** (`log`): the `MessageLog` trait models the external
//!    ordered log service; `InMemoryLog` is the in-process backend.
//! 3. **Client** (`client`): publish with retry, a single shared consumption
//!    loop with bounded blocking reads, handler dispatch, and channel
//!    retention cleanup.
//!
//! Channels per session: `questions`, `answers`, `heartbeat`, `gamestate`,
//! `control`, each named `{sessionId}:{channelName}` on the log.

pub mod client;
pub mod log;
pub mod types;
