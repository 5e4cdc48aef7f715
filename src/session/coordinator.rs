//! Session Coordinator Facade
//!
//! The only entry point external collaborators use. Composes the peer
//! registry, message bus client, role controller, and failure detector into
//! one session-scoped object, wires the internal message routing between
//! them, and owns every periodic activity's lifetime.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::bus::client::BusClient;
use crate::bus::log::MessageLog;
use crate::bus::types::{
    AnswerPayload, HeartbeatPayload, HostChangedPayload, MessageKind, MessagePayload,
    QuestionPayload, SessionMessage,
};
use crate::election::engine::has_tier_eligible;
use crate::peer::registry::PeerRegistry;
use crate::peer::types::{now_ms, Peer, PeerId, PeerUpdate};
use crate::role::controller::{Role, RoleController};
use crate::role::detector::FailureDetector;

/// Every tunable interval and timeout of a session. Defaults match the
/// production cadence; tests shorten them instead of waiting wall-clock.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A host silent for this long is considered gone.
    pub host_timeout_ms: u64,
    /// Period of the failure detector's liveness check.
    pub liveness_check_interval: Duration,
    /// Period of heartbeat emission while hosting.
    pub heartbeat_interval: Duration,
    /// Bounded wait per bus poll, so shutdown is observed promptly.
    pub poll_block: Duration,
    /// Entries older than this are eligible for retention cleanup.
    pub retention_max_age_ms: u64,
    /// How often the retention sweep runs.
    pub retention_sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_timeout_ms: 10_000,
            liveness_check_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(3),
            poll_block: Duration::from_secs(1),
            retention_max_age_ms: 3_600_000,
            retention_sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Point-in-time view of the election for external display. Recomputed on
/// every call, never cached.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ElectionState {
    pub current_host_id: Option<PeerId>,
    pub peers: Vec<Peer>,
    pub my_role: Role,
    /// Tier-eligible, or emergency mode is in effect.
    pub can_i_host: bool,
}

pub struct SessionCoordinator {
    session_id: String,
    local_peer: PeerId,
    config: SessionConfig,
    registry: Arc<PeerRegistry>,
    bus: Arc<BusClient>,
    controller: Arc<RoleController>,
    detector_handle: Mutex<Option<JoinHandle<()>>>,
    active: AtomicBool,
}

impl SessionCoordinator {
    /// Creates the coordinator for one session and starts its periodic
    /// activities. `join_info` carries the identity/tier fields supplied by
    /// the external account system; `is_creator` makes the local node the
    /// initial host.
    pub async fn new(
        session_id: &str,
        local_peer: PeerId,
        join_info: PeerUpdate,
        is_creator: bool,
        log: Arc<dyn MessageLog>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let registry = Arc::new(PeerRegistry::new());
        registry.upsert(&local_peer, join_info);

        let bus = BusClient::new(
            session_id,
            log,
            config.poll_block,
            config.retention_max_age_ms,
            config.retention_sweep_interval,
        );

        let controller = RoleController::new(
            session_id,
            local_peer.clone(),
            registry.clone(),
            bus.clone(),
            config.host_timeout_ms,
            config.heartbeat_interval,
        );

        Self::wire_internal_routing(&bus, &registry, &controller);

        controller.start(is_creator).await;

        let detector = FailureDetector::new(
            local_peer.clone(),
            registry.clone(),
            bus.clone(),
            controller.clone(),
            config.liveness_check_interval,
            config.host_timeout_ms,
        );
        let detector_handle = Mutex::new(Some(detector.spawn()));

        tracing::info!(
            "Session coordinator ready: session={} peer={:?} creator={}",
            session_id,
            local_peer,
            is_creator
        );

        Arc::new(Self {
            session_id: session_id.to_string(),
            local_peer,
            config,
            registry,
            bus,
            controller,
            detector_handle,
            active: AtomicBool::new(true),
        })
    }

    /// Routes bus traffic into the registry and role controller: heartbeats
    /// and answers are liveness sightings, control announcements drive role
    /// transitions.
    fn wire_internal_routing(
        bus: &Arc<BusClient>,
        registry: &Arc<PeerRegistry>,
        controller: &Arc<RoleController>,
    ) {
        {
            let registry = registry.clone();
            let controller = controller.clone();
            bus.subscribe(MessageKind::HostHeartbeat, move |message| {
                let registry = registry.clone();
                let controller = controller.clone();
                async move {
                    if let MessagePayload::HostHeartbeat(beat) = message.payload {
                        let host = PeerId(beat.host_id);
                        registry.upsert(&host, PeerUpdate::default());
                        controller.observe_heartbeat(host).await;
                    }
                    Ok(())
                }
            });
        }

        {
            let registry = registry.clone();
            let controller = controller.clone();
            bus.subscribe(MessageKind::HostChanged, move |message| {
                let registry = registry.clone();
                let controller = controller.clone();
                async move {
                    if let MessagePayload::HostChanged(change) = message.payload {
                        let host = PeerId(change.new_host_id);
                        registry.upsert(&host, PeerUpdate::default());
                        controller.handle_host_changed(host).await;
                    }
                    Ok(())
                }
            });
        }

        {
            let registry = registry.clone();
            bus.subscribe(MessageKind::AnswerSubmitted, move |message| {
                let registry = registry.clone();
                async move {
                    if let MessagePayload::AnswerSubmitted(answer) = message.payload {
                        registry.upsert(&PeerId(answer.player_id), PeerUpdate::default());
                    }
                    Ok(())
                }
            });
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    /// Registers an external handler for a message kind.
    pub fn on_message<F, Fut>(&self, kind: MessageKind, handler: F)
    where
        F: Fn(SessionMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.bus.subscribe(kind, handler);
    }

    /// Host announces a new question to all players.
    pub async fn broadcast_question(&self, question: QuestionPayload) -> Result<()> {
        self.publish(MessagePayload::NewQuestion(question)).await
    }

    /// Client submits an answer; also counts as a liveness sighting of self.
    pub async fn submit_answer(&self, answer: AnswerPayload) -> Result<()> {
        self.registry.upsert(&self.local_peer, PeerUpdate::default());
        self.publish(MessagePayload::AnswerSubmitted(answer)).await
    }

    /// Manual heartbeat, in addition to the automatic timer while hosting.
    pub async fn send_heartbeat(&self) -> Result<()> {
        self.publish(MessagePayload::HostHeartbeat(HeartbeatPayload {
            host_id: self.local_peer.0.clone(),
        }))
        .await
    }

    /// Broadcasts an opaque game-state payload, passed through unmodified.
    pub async fn broadcast_game_state(&self, state: serde_json::Value) -> Result<()> {
        self.publish(MessagePayload::GameStateUpdate(state)).await
    }

    /// Announces a host change decided outside the automatic election (e.g.
    /// a voluntary handover) and applies it locally.
    pub async fn announce_host_change(&self, new_host: &PeerId, reason: &str) -> Result<()> {
        self.publish(MessagePayload::HostChanged(HostChangedPayload {
            new_host_id: new_host.0.clone(),
            reason: reason.to_string(),
            election_timestamp: now_ms(),
        }))
        .await?;

        self.controller.handle_host_changed(new_host.clone()).await;

        Ok(())
    }

    /// Merges peer info from any source (join roster, transport stats).
    pub fn update_peer(&self, peer_id: &PeerId, update: PeerUpdate) {
        self.registry.upsert(peer_id, update);
    }

    /// Removes a peer on explicit departure. Departure of the believed host
    /// triggers an immediate election.
    pub async fn remove_peer(&self, peer_id: &PeerId) {
        self.registry.remove(peer_id);
        self.controller.handle_host_departure(peer_id).await;
    }

    /// Snapshot of the election for external display.
    pub async fn get_election_state(&self) -> ElectionState {
        let live = self.registry.live_snapshot(self.config.host_timeout_ms);

        let tier_eligible = self
            .registry
            .get(&self.local_peer)
            .map(|peer| peer.account_tier.can_always_host())
            .unwrap_or(false);

        ElectionState {
            current_host_id: self.controller.current_host().await,
            peers: self.registry.snapshot(),
            my_role: self.controller.role().await,
            can_i_host: tier_eligible || !has_tier_eligible(&live),
        }
    }

    /// One-shot cold-start read of a channel's most recent messages.
    pub async fn recent_messages(&self, channel: &str, count: usize) -> Result<Vec<SessionMessage>> {
        self.bus.get_recent(channel, count).await
    }

    /// Stops the detector, heartbeat timer, and consumption loop, runs one
    /// final retention cleanup, and releases the log handle. Idempotent and
    /// safe to call while a poll is in flight.
    pub async fn destroy(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Destroying session coordinator for {}", self.session_id);

        if let Some(handle) = self.detector_handle.lock().unwrap().take() {
            handle.abort();
        }
        self.bus.shutdown();
        self.controller.shutdown().await;

        self.bus
            .retention_cleanup(self.config.retention_max_age_ms)
            .await;

        tracing::info!("Session coordinator for {} destroyed", self.session_id);
    }

    async fn publish(&self, payload: MessagePayload) -> Result<()> {
        let message = SessionMessage::new(&self.session_id, payload);
        self.bus.publish(&message).await.map(|_| ())
    }
}
