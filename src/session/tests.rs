//! Session Module Tests
//!
//! End-to-end scenarios over a shared in-memory log: multiple coordinators
//! in one process stand in for peer devices.
//!
//! ## Test Scopes
//! - **Bootstrap**: creator hosts, late joiners learn the host from traffic.
//! - **Failover**: host vanishes, a surviving peer is promoted and announces.
//! - **Reconciliation**: a demoted host steps down on a later announcement.
//! - **Lifecycle**: destroy stops every timer and runs the final cleanup.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::bus::log::{InMemoryLog, MessageLog};
    use crate::bus::types::{AnswerPayload, MessageKind, MessagePayload, QuestionPayload};
    use crate::peer::types::{AccountTier, PeerId, PeerUpdate};
    use crate::role::controller::Role;
    use crate::session::coordinator::{SessionConfig, SessionCoordinator};

    const SESSION: &str = "game-e2e";

    /// Shortened cadence so scenarios complete in a couple of seconds.
    fn test_config() -> SessionConfig {
        SessionConfig {
            host_timeout_ms: 400,
            liveness_check_interval: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(100),
            poll_block: Duration::from_millis(25),
            retention_max_age_ms: 3_600_000,
            retention_sweep_interval: Duration::from_secs(3600),
        }
    }

    async fn coordinator(
        log: &Arc<InMemoryLog>,
        peer_id: &str,
        tier: AccountTier,
        is_creator: bool,
    ) -> Arc<SessionCoordinator> {
        SessionCoordinator::new(
            SESSION,
            PeerId(peer_id.to_string()),
            PeerUpdate::joining(tier, 50, 50),
            is_creator,
            log.clone(),
            test_config(),
        )
        .await
    }

    // ============================================================
    // BOOTSTRAP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_creator_hosts_and_joiner_learns_from_heartbeats() {
        let log = Arc::new(InMemoryLog::new());
        let c1 = coordinator(&log, "p1", AccountTier::Premium, true).await;
        let c2 = coordinator(&log, "p2", AccountTier::Free, false).await;

        tokio::time::sleep(Duration::from_millis(300)).await;

        let s1 = c1.get_election_state().await;
        assert_eq!(s1.my_role, Role::Host);
        assert_eq!(s1.current_host_id, Some(PeerId("p1".to_string())));

        let s2 = c2.get_election_state().await;
        assert_eq!(s2.my_role, Role::Client);
        assert_eq!(
            s2.current_host_id,
            Some(PeerId("p1".to_string())),
            "joiner adopts the host seen on the heartbeat channel"
        );
        assert!(
            s2.peers.iter().any(|p| p.id.0 == "p1"),
            "heartbeats create a registry record for the host"
        );

        c1.destroy().await;
        c2.destroy().await;
    }

    // ============================================================
    // GAME TRAFFIC TESTS
    // ============================================================

    #[tokio::test]
    async fn test_question_and_answer_round_trip() {
        let log = Arc::new(InMemoryLog::new());
        let c1 = coordinator(&log, "p1", AccountTier::Premium, true).await;
        let c2 = coordinator(&log, "p2", AccountTier::Free, false).await;

        let questions = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = questions.clone();
        c2.on_message(MessageKind::NewQuestion, move |message| {
            let sink = sink.clone();
            async move {
                if let MessagePayload::NewQuestion(q) = message.payload {
                    sink.lock().unwrap().push(q.text);
                }
                Ok(())
            }
        });

        let answers = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = answers.clone();
        c1.on_message(MessageKind::AnswerSubmitted, move |message| {
            let sink = sink.clone();
            async move {
                if let MessagePayload::AnswerSubmitted(a) = message.payload {
                    sink.lock().unwrap().push((a.player_id, a.answer_index));
                }
                Ok(())
            }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;

        c1.broadcast_question(QuestionPayload {
            question_id: "q-1".to_string(),
            question_number: 1,
            text: "Capital of France?".to_string(),
            options: vec!["Paris".to_string(), "Lyon".to_string()],
            time_limit_ms: 10_000,
        })
        .await
        .expect("broadcast failed");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            questions.lock().unwrap().clone(),
            vec!["Capital of France?".to_string()]
        );

        c2.submit_answer(AnswerPayload {
            player_id: "p2".to_string(),
            question_id: "q-1".to_string(),
            answer_index: 0,
            response_time_ms: 1200,
        })
        .await
        .expect("submit failed");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            answers.lock().unwrap().clone(),
            vec![("p2".to_string(), 0)]
        );

        // The answer sighting created a registry record for p2 on the host.
        let state = c1.get_election_state().await;
        assert!(state.peers.iter().any(|p| p.id.0 == "p2"));

        c1.destroy().await;
        c2.destroy().await;
    }

    // ============================================================
    // FAILOVER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_host_vanishes_and_survivor_is_promoted() {
        let log = Arc::new(InMemoryLog::new());
        let c1 = coordinator(&log, "p1", AccountTier::Premium, true).await;
        let c2 = coordinator(&log, "p2", AccountTier::Free, false).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(c2.get_election_state().await.my_role, Role::Client);

        // The host device disappears: heartbeats stop flowing.
        c1.destroy().await;

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let state = c2.get_election_state().await;
        assert_eq!(state.my_role, Role::Host);
        assert_eq!(state.current_host_id, Some(PeerId("p2".to_string())));

        // The promotion was announced on the control channel.
        let recent = c2.recent_messages("control", 5).await.unwrap();
        let change = recent
            .iter()
            .find_map(|message| match &message.payload {
                MessagePayload::HostChanged(p) => Some(p.clone()),
                _ => None,
            })
            .expect("HOST_CHANGED should be on the control channel");

        assert_eq!(change.new_host_id, "p2");
        assert_eq!(change.reason, "ELECTION");

        c2.destroy().await;
    }

    #[tokio::test]
    async fn test_removed_host_is_replaced_and_old_host_steps_down() {
        let log = Arc::new(InMemoryLog::new());
        let c1 = coordinator(&log, "p1", AccountTier::Premium, true).await;
        let c2 = coordinator(&log, "p2", AccountTier::Free, false).await;

        tokio::time::sleep(Duration::from_millis(300)).await;

        // Explicit departure notice for the host on p2's side.
        c2.remove_peer(&PeerId("p1".to_string())).await;

        let state = c2.get_election_state().await;
        assert_eq!(state.my_role, Role::Host);

        // p1 observes the announcement and reconciles: last one wins.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let state = c1.get_election_state().await;
        assert_eq!(state.my_role, Role::Client);
        assert_eq!(state.current_host_id, Some(PeerId("p2".to_string())));

        c1.destroy().await;
        c2.destroy().await;
    }

    // ============================================================
    // ELECTION STATE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_can_i_host_tracks_emergency_mode() {
        let log = Arc::new(InMemoryLog::new());
        let c = coordinator(&log, "free-peer", AccountTier::Free, false).await;

        // Only a FREE peer live: emergency mode, anyone may host.
        assert!(c.get_election_state().await.can_i_host);

        // A live tier-eligible peer ends the emergency.
        c.update_peer(
            &PeerId("rich-peer".to_string()),
            PeerUpdate::joining(AccountTier::Premium, 80, 80),
        );
        assert!(!c.get_election_state().await.can_i_host);

        c.destroy().await;
    }

    // ============================================================
    // LIFECYCLE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_destroy_stops_heartbeats_and_is_idempotent() {
        let log = Arc::new(InMemoryLog::new());
        let c = coordinator(&log, "p1", AccountTier::Premium, true).await;

        tokio::time::sleep(Duration::from_millis(250)).await;

        c.destroy().await;
        let after_destroy = log
            .read_latest(&format!("{}:heartbeat", SESSION), 100)
            .await
            .unwrap()
            .len();

        tokio::time::sleep(Duration::from_millis(300)).await;
        let later = log
            .read_latest(&format!("{}:heartbeat", SESSION), 100)
            .await
            .unwrap()
            .len();
        assert_eq!(later, after_destroy, "no heartbeat may be emitted after destroy");

        // Safe to call again.
        c.destroy().await;
    }

    #[tokio::test]
    async fn test_destroy_runs_final_retention_cleanup() {
        let log = Arc::new(InMemoryLog::new());

        let mut config = test_config();
        config.retention_max_age_ms = 50;

        let c = SessionCoordinator::new(
            SESSION,
            PeerId("p1".to_string()),
            PeerUpdate::joining(AccountTier::Premium, 50, 50),
            true,
            log.clone(),
            config,
        )
        .await;

        // Let a few heartbeats age past the retention window.
        tokio::time::sleep(Duration::from_millis(350)).await;
        let before = log
            .read_latest(&format!("{}:heartbeat", SESSION), 100)
            .await
            .unwrap()
            .len();
        assert!(before >= 2);

        c.destroy().await;

        let after = log
            .read_latest(&format!("{}:heartbeat", SESSION), 100)
            .await
            .unwrap()
            .len();
        assert!(
            after <= 1,
            "aged entries must be deleted by the final cleanup (kept {})",
            after
        );
    }
}
