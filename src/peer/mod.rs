//! Peer Model & Registry Module
//!
//! Holds the local node's authoritative view of session membership.
//!
//! ## Core Mechanisms
//! - **Sighting-based liveness**: every registry write restamps `last_seen_at`;
//!   a peer is alive while its last sighting is strictly inside the timeout.
//! - **Partial merge**: updates carry only the fields the caller knows,
//!   merged into the existing record (peers are created on first sighting).
//! - **Host flag**: `is_host` reflects the local node's belief about which
//!   peer currently hosts, maintained by the role controller.

pub mod registry;
pub mod types;

#[cfg(test)]
mod tests;
