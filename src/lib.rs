//! P2P Quiz Session Coordination Library
//!
//! This library crate defines the core modules for host coordination in
//! peer-to-peer quiz sessions. It serves as the foundation for the demo
//! binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of five loosely coupled subsystems:
//!
//! - **`peer`**: The peer model and registry. Tracks every known device in a
//!   session (account tier, connection stability, battery, liveness) in a
//!   concurrent map keyed by peer id.
//! - **`election`**: The host election engine. A pure, deterministic total
//!   order over candidate peers; the same candidate set always produces the
//!   same winner on every device.
//! - **`bus`**: The session message bus. Encodes typed session messages onto
//!   an external append-only log, consumes new entries through registered
//!   handlers, and enforces the retention policy.
//! - **`role`**: The host role state machine and failure detector. Owns the
//!   CLIENT/HOST transitions, heartbeat emission, and the periodic liveness
//!   check that triggers elections.
//! - **`session`**: The composition root. A `SessionCoordinator` wires the
//!   other four subsystems together for exactly one session id.

pub mod bus;
pub mod election;
pub mod peer;
pub mod role;
pub mod session;
