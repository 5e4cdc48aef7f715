//! Peer Module Tests
//!
//! Validates the peer data model and the registry's merge/liveness semantics.
//!
//! ## Test Scopes
//! - **Data Structures**: Id uniqueness and serialization of peer records.
//! - **Registry Logic**: Upsert merge behavior, removal, host flag handling.
//! - **Liveness Boundary**: The strict `age < timeout` alive rule.

#[cfg(test)]
mod tests {
    use crate::peer::registry::{is_alive, PeerRegistry};
    use crate::peer::types::{now_ms, AccountTier, Peer, PeerId, PeerUpdate};

    fn test_peer(id: &str, last_seen_at: u64) -> Peer {
        Peer {
            id: PeerId(id.to_string()),
            account_tier: AccountTier::Free,
            connection_stability: 50,
            battery_level: 50,
            is_host: false,
            last_seen_at,
        }
    }

    // ============================================================
    // PEER ID TESTS
    // ============================================================

    #[test]
    fn test_peer_id_is_unique() {
        let id1 = PeerId::new();
        let id2 = PeerId::new();

        assert_ne!(id1, id2, "Each PeerId should be unique");
    }

    #[test]
    fn test_peer_id_ordering_is_lexicographic() {
        let a = PeerId("a".to_string());
        let b = PeerId("b".to_string());

        assert!(a < b);
    }

    #[test]
    fn test_peer_serialization_round_trip() {
        let peer = test_peer("serde-peer", 1234);

        let json = serde_json::to_string(&peer).expect("Serialization failed");
        let restored: Peer = serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored.id, peer.id);
        assert_eq!(restored.account_tier, AccountTier::Free);
        assert_eq!(restored.last_seen_at, 1234);
    }

    #[test]
    fn test_account_tier_ranks() {
        assert_eq!(AccountTier::Premium.host_rank(), AccountTier::Admin.host_rank());
        assert!(AccountTier::Premium.host_rank() > AccountTier::Free.host_rank());
        assert!(!AccountTier::Free.can_always_host());
    }

    // ============================================================
    // REGISTRY UPSERT / REMOVE TESTS
    // ============================================================

    #[test]
    fn test_upsert_creates_on_first_sighting() {
        let registry = PeerRegistry::new();
        let id = PeerId("p1".to_string());

        registry.upsert(&id, PeerUpdate::default());

        let peer = registry.get(&id).expect("peer should exist");
        assert_eq!(peer.account_tier, AccountTier::Free);
        assert_eq!(peer.connection_stability, 0);
        assert_eq!(peer.battery_level, 0);
        assert!(!peer.is_host);
        assert!(peer.last_seen_at > 0);
    }

    #[test]
    fn test_upsert_merges_partial_update() {
        let registry = PeerRegistry::new();
        let id = PeerId("p1".to_string());

        registry.upsert(&id, PeerUpdate::joining(AccountTier::Premium, 80, 60));
        registry.upsert(
            &id,
            PeerUpdate {
                battery_level: Some(40),
                ..Default::default()
            },
        );

        let peer = registry.get(&id).unwrap();
        assert_eq!(peer.account_tier, AccountTier::Premium, "tier should survive merge");
        assert_eq!(peer.connection_stability, 80);
        assert_eq!(peer.battery_level, 40, "battery should be updated");
    }

    #[test]
    fn test_upsert_refreshes_last_seen() {
        let registry = PeerRegistry::new();
        let id = PeerId("p1".to_string());

        registry.upsert(&id, PeerUpdate::default());
        let first = registry.get(&id).unwrap().last_seen_at;

        std::thread::sleep(std::time::Duration::from_millis(5));
        registry.upsert(&id, PeerUpdate::default());
        let second = registry.get(&id).unwrap().last_seen_at;

        assert!(second > first, "every upsert must restamp last_seen_at");
    }

    #[test]
    fn test_remove_peer() {
        let registry = PeerRegistry::new();
        let id = PeerId("p1".to_string());

        registry.upsert(&id, PeerUpdate::default());
        assert_eq!(registry.len(), 1);

        let removed = registry.remove(&id);
        assert!(removed.is_some());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());

        // Second removal is a no-op
        assert!(registry.remove(&id).is_none());
    }

    // ============================================================
    // LIVENESS TESTS
    // ============================================================

    #[test]
    fn test_liveness_boundary_is_strict() {
        let now = now_ms();
        let timeout = 10_000;

        // One millisecond inside the window: alive.
        let alive_peer = test_peer("alive", now - (timeout - 1));
        assert!(is_alive(&alive_peer, now, timeout));

        // Exactly at the timeout: timed out.
        let dead_peer = test_peer("dead", now - timeout);
        assert!(!is_alive(&dead_peer, now, timeout));
    }

    #[test]
    fn test_live_snapshot_filters_stale_peers() {
        let registry = PeerRegistry::new();
        let fresh = PeerId("fresh".to_string());
        let stale = PeerId("stale".to_string());

        registry.upsert(&fresh, PeerUpdate::default());
        registry.upsert(&stale, PeerUpdate::default());

        // A zero timeout makes every peer stale; a generous one keeps both.
        assert!(registry.live_snapshot(0).is_empty());

        let live = registry.live_snapshot(10_000);
        assert_eq!(live.len(), 2);

        // No peer counted twice.
        let ids: std::collections::HashSet<_> = live.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids.len(), 2);
    }

    // ============================================================
    // HOST FLAG TESTS
    // ============================================================

    #[test]
    fn test_mark_host_sets_exactly_one_flag() {
        let registry = PeerRegistry::new();
        let p1 = PeerId("p1".to_string());
        let p2 = PeerId("p2".to_string());

        registry.upsert(&p1, PeerUpdate { is_host: Some(true), ..Default::default() });
        registry.upsert(&p2, PeerUpdate::default());

        registry.mark_host(&p2);

        assert!(!registry.get(&p1).unwrap().is_host);
        assert!(registry.get(&p2).unwrap().is_host);

        registry.clear_host();
        assert!(!registry.get(&p2).unwrap().is_host);
    }
}
