use serde::{Deserialize, Serialize};

/// Unique identifier for a peer device within a session.
///
/// Wrapper around a UUID string. Ids are unique per session and double as the
/// deterministic last-resort tie-breaker during host election.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub String);

impl PeerId {
    /// Generates a new random UUID v4-based PeerId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Account tier supplied by the external auth system at session join time.
///
/// `Premium` and `Admin` rank equally for hosting purposes; both outrank
/// `Free`, which may only host in emergency mode (no tier-eligible peer live).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountTier {
    Free,
    Premium,
    Admin,
}

impl AccountTier {
    /// Whether this tier may host regardless of emergency conditions.
    pub fn can_always_host(&self) -> bool {
        matches!(self, AccountTier::Premium | AccountTier::Admin)
    }

    /// Rank used by the election comparator. Premium and Admin share a rank.
    pub fn host_rank(&self) -> u8 {
        if self.can_always_host() { 1 } else { 0 }
    }
}

/// A single member of a session as seen by the local node.
///
/// Owned by the `PeerRegistry`; mutated only through registry operations,
/// every one of which restamps `last_seen_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub account_tier: AccountTier,
    /// Connection quality estimate, 0..=100.
    pub connection_stability: u8,
    /// Device battery estimate, 0..=100.
    pub battery_level: u8,
    /// Local belief only; not a cluster-wide guarantee.
    pub is_host: bool,
    /// Epoch millis of the most recent sighting.
    pub last_seen_at: u64,
}

/// Partial update merged into an existing record by `PeerRegistry::upsert`.
///
/// Fields left `None` keep their current value. A peer created from an update
/// that omits everything gets conservative defaults (`Free`, zero stability
/// and battery) so an undescribed peer never outranks a known candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerUpdate {
    pub account_tier: Option<AccountTier>,
    pub connection_stability: Option<u8>,
    pub battery_level: Option<u8>,
    pub is_host: Option<bool>,
}

impl PeerUpdate {
    /// Update carrying the fields supplied by the account system at join time.
    pub fn joining(tier: AccountTier, connection_stability: u8, battery_level: u8) -> Self {
        Self {
            account_tier: Some(tier),
            connection_stability: Some(connection_stability),
            battery_level: Some(battery_level),
            is_host: None,
        }
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
