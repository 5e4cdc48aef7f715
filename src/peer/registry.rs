//! Local Peer Registry
//!
//! The authoritative local view of session membership: identity, capability,
//! and liveness timestamps. Each `SessionCoordinator` owns exactly one
//! registry; nothing is shared across sessions.
//!
//! Write discipline: only the coordinator's message handlers and the
//! `RoleController` call mutators, so no two writers race on a peer record
//! outside the `DashMap` entry locks.

use dashmap::DashMap;

use super::types::{now_ms, Peer, PeerId, PeerUpdate};

/// Liveness boundary rule: strictly-less-than the timeout is alive,
/// greater-or-equal is timed out. No grace window beyond the threshold.
pub fn is_alive(peer: &Peer, now_ms: u64, timeout_ms: u64) -> bool {
    now_ms.saturating_sub(peer.last_seen_at) < timeout_ms
}

/// Thread-safe map of every peer sighted in the session.
pub struct PeerRegistry {
    peers: DashMap<PeerId, Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
        }
    }

    /// Merges `update` into the existing record, creating one on first
    /// sighting. Always restamps `last_seen_at` with the current time.
    pub fn upsert(&self, peer_id: &PeerId, update: PeerUpdate) {
        let now = now_ms();

        match self.peers.get_mut(peer_id) {
            Some(mut existing) => {
                if let Some(tier) = update.account_tier {
                    existing.account_tier = tier;
                }
                if let Some(stability) = update.connection_stability {
                    existing.connection_stability = stability;
                }
                if let Some(battery) = update.battery_level {
                    existing.battery_level = battery;
                }
                if let Some(is_host) = update.is_host {
                    existing.is_host = is_host;
                }
                existing.last_seen_at = now;
            }
            None => {
                tracing::debug!("First sighting of peer {:?}", peer_id);

                let peer = Peer {
                    id: peer_id.clone(),
                    account_tier: update.account_tier.unwrap_or(super::types::AccountTier::Free),
                    connection_stability: update.connection_stability.unwrap_or(0),
                    battery_level: update.battery_level.unwrap_or(0),
                    is_host: update.is_host.unwrap_or(false),
                    last_seen_at: now,
                };

                self.peers.insert(peer_id.clone(), peer);
            }
        }
    }

    /// Removes a peer on explicit departure notice. Returns the final record.
    pub fn remove(&self, peer_id: &PeerId) -> Option<Peer> {
        self.peers.remove(peer_id).map(|(_, peer)| peer)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Peer> {
        self.peers.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Returns all peers sighted within `timeout_ms` of a single `now`
    /// captured at the start of the scan. No ordering guarantee; each peer
    /// appears at most once.
    pub fn live_snapshot(&self, timeout_ms: u64) -> Vec<Peer> {
        let now = now_ms();

        self.peers
            .iter()
            .filter(|entry| is_alive(entry.value(), now, timeout_ms))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Full snapshot regardless of liveness, for external display.
    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Sets `is_host` on exactly `host_id`, clearing the flag everywhere
    /// else. Keeps the local one-host-per-session invariant.
    pub fn mark_host(&self, host_id: &PeerId) {
        for mut entry in self.peers.iter_mut() {
            let peer = entry.value_mut();
            peer.is_host = peer.id == *host_id;
        }
    }

    /// Clears the `is_host` flag on every record.
    pub fn clear_host(&self) {
        for mut entry in self.peers.iter_mut() {
            entry.value_mut().is_host = false;
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
