//! Role & Failure Detection Module
//!
//! Drives who hosts the session and when that decision is revisited.
//!
//! ## Core Mechanisms
//! - **State machine** (`controller`): CLIENT/HOST transitions behind a
//!   single lock, heartbeat timer ownership, election outcome application,
//!   and `HOST_CHANGED` announcements.
//! - **Failure detection** (`detector`): fixed-period liveness checks of the
//!   believed host against both the peer registry and the heartbeat channel.
//!
//! Elections here are purely local decisions over a registry snapshot;
//! convergence relies on determinism of the election function plus
//! last-announcement-wins on the control channel, not on consensus.

pub mod controller;
pub mod detector;
