//! Host Role State Machine
//!
//! Owns the local node's current role (CLIENT/HOST) and every transition
//! between the two. All role state lives behind one async mutex, so election
//! outcomes, received announcements, and departure events are serialized
//! through a single owner and never interleave.
//!
//! ## Transitions
//! - `CLIENT -> HOST`: the election picks the local peer (or the sole-survivor
//!   rule applies). Starts the heartbeat emission timer, marks the registry,
//!   and announces `HOST_CHANGED` on the control channel.
//! - `HOST -> CLIENT`: a later `HOST_CHANGED` names another peer, or the
//!   local node steps down. Cancels the heartbeat timer and clears the flag.
//! - Re-confirmations are no-ops: no duplicate announcements, no timer churn.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bus::client::BusClient;
use crate::bus::types::{HeartbeatPayload, HostChangedPayload, MessagePayload, SessionMessage};
use crate::election::engine::elect_leader;
use crate::peer::registry::PeerRegistry;
use crate::peer::types::{now_ms, PeerId, PeerUpdate};

/// The local node's role within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Role {
    Host,
    Client,
}

struct RoleState {
    role: Role,
    /// The peer the local node currently believes to be host.
    current_host: Option<PeerId>,
    /// Heartbeat emission task, present exactly while `role == Host`.
    heartbeat: Option<JoinHandle<()>>,
}

pub struct RoleController {
    session_id: String,
    local_peer: PeerId,
    registry: Arc<PeerRegistry>,
    bus: Arc<BusClient>,
    host_timeout_ms: u64,
    heartbeat_interval: Duration,
    state: Mutex<RoleState>,
}

impl RoleController {
    pub fn new(
        session_id: &str,
        local_peer: PeerId,
        registry: Arc<PeerRegistry>,
        bus: Arc<BusClient>,
        host_timeout_ms: u64,
        heartbeat_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.to_string(),
            local_peer,
            registry,
            bus,
            host_timeout_ms,
            heartbeat_interval,
            state: Mutex::new(RoleState {
                role: Role::Client,
                current_host: None,
                heartbeat: None,
            }),
        })
    }

    /// Assumes the initial role. The session creator starts as host without
    /// an announcement; everyone else starts as client and learns the host
    /// from heartbeat traffic.
    pub async fn start(&self, is_creator: bool) {
        if is_creator {
            let mut state = self.state.lock().await;
            self.promote_local(&mut state, None).await;
        }
    }

    pub async fn role(&self) -> Role {
        self.state.lock().await.role
    }

    pub async fn current_host(&self) -> Option<PeerId> {
        self.state.lock().await.current_host.clone()
    }

    /// Fired by the failure detector when the believed host went silent.
    pub async fn handle_host_timeout(&self) {
        let mut state = self.state.lock().await;

        if state.role == Role::Host {
            return;
        }

        tracing::warn!("Host {:?} timed out, starting election", state.current_host);
        self.run_election(&mut state).await;
    }

    /// Fired on an explicit departure notice. Only the believed host's
    /// departure triggers an election, so removing the same peer twice
    /// produces exactly one promotion.
    pub async fn handle_host_departure(&self, departed: &PeerId) {
        let mut state = self.state.lock().await;

        if state.current_host.as_ref() != Some(departed) {
            return;
        }

        tracing::info!("Host {:?} departed, starting election", departed);
        self.run_election(&mut state).await;
    }

    /// Applies a `HOST_CHANGED` announcement observed on the control channel.
    /// Whichever announcement is seen last wins.
    pub async fn handle_host_changed(&self, new_host: PeerId) {
        let mut state = self.state.lock().await;

        if state.current_host.as_ref() == Some(&new_host) {
            return;
        }

        tracing::info!("Host changed to {:?}", new_host);

        state.current_host = Some(new_host.clone());
        self.registry.mark_host(&new_host);

        if new_host == self.local_peer {
            // Another peer's election picked us; its announcement is already
            // on the log, so promote without re-announcing.
            self.promote_local(&mut state, None).await;
        } else if state.role == Role::Host {
            self.demote_local(&mut state);
        }
    }

    /// Adopts a host observed on the heartbeat channel when no belief exists
    /// yet (a late joiner learning the session's host).
    pub async fn observe_heartbeat(&self, host: PeerId) {
        let mut state = self.state.lock().await;

        if state.current_host.is_none() {
            tracing::debug!("Adopting {:?} as current host from heartbeat", host);
            state.current_host = Some(host.clone());
            self.registry.mark_host(&host);
        }
    }

    /// Voluntary demotion.
    pub async fn step_down(&self) {
        let mut state = self.state.lock().await;

        if state.role != Role::Host {
            return;
        }

        self.demote_local(&mut state);

        if state.current_host.as_ref() == Some(&self.local_peer) {
            state.current_host = None;
        }
        self.registry.clear_host();
    }

    /// Cancels the heartbeat timer. Idempotent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
    }

    /// Runs the election over the current live snapshot and applies the
    /// outcome. Caller holds the state lock.
    async fn run_election(&self, state: &mut RoleState) {
        // The local peer is always a candidate of last resort.
        self.registry.upsert(&self.local_peer, PeerUpdate::default());

        let candidates = self.registry.live_snapshot(self.host_timeout_ms);
        let winner = elect_leader(&candidates).map(|peer| peer.id.clone());

        match winner {
            None => {
                // Sole-survivor rule: nothing live, promote unconditionally.
                tracing::warn!("No live candidates, promoting self as sole survivor");
                self.promote_local(state, Some("ELECTION")).await;
            }
            Some(winner) if state.current_host.as_ref() == Some(&winner) => {
                tracing::debug!("Election re-confirmed host {:?}", winner);
            }
            Some(winner) if winner == self.local_peer => {
                self.promote_local(state, Some("ELECTION")).await;
            }
            Some(winner) => {
                tracing::info!("Elected {:?}, awaiting its announcement", winner);
                state.current_host = Some(winner.clone());
                self.registry.mark_host(&winner);

                if state.role == Role::Host {
                    self.demote_local(state);
                }
            }
        }
    }

    /// Promotes the local node. `announce_reason` carries the `HOST_CHANGED`
    /// reason, or `None` when the promotion was already announced elsewhere
    /// (or needs none, as for the session creator).
    async fn promote_local(&self, state: &mut RoleState, announce_reason: Option<&str>) {
        state.current_host = Some(self.local_peer.clone());

        // Keeps the local record existing and fresh before flagging it.
        self.registry.upsert(&self.local_peer, PeerUpdate::default());
        self.registry.mark_host(&self.local_peer);

        if state.role != Role::Host {
            let tier_eligible = self
                .registry
                .get(&self.local_peer)
                .map(|peer| peer.account_tier.can_always_host())
                .unwrap_or(false);

            if tier_eligible {
                tracing::info!("Promoted to session host");
            } else {
                // Intentional continuity policy, not a bug: with no paying
                // peer live, any tier may host.
                tracing::warn!("Emergency promotion: no tier-eligible peer live");
            }

            state.role = Role::Host;
            state.heartbeat = Some(self.spawn_heartbeat());
        }

        if let Some(reason) = announce_reason {
            let message = SessionMessage::new(
                &self.session_id,
                MessagePayload::HostChanged(HostChangedPayload {
                    new_host_id: self.local_peer.0.clone(),
                    reason: reason.to_string(),
                    election_timestamp: now_ms(),
                }),
            );

            if let Err(e) = self.bus.publish(&message).await {
                tracing::warn!("Failed to announce host change: {:#}", e);
            }
        }
    }

    fn demote_local(&self, state: &mut RoleState) {
        if state.role != Role::Host {
            return;
        }

        tracing::info!("Stepping down to client");

        state.role = Role::Client;
        if let Some(handle) = state.heartbeat.take() {
            handle.abort();
        }
    }

    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let session_id = self.session_id.clone();
        let host_id = self.local_peer.0.clone();
        let period = self.heartbeat_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;

                let message = SessionMessage::new(
                    &session_id,
                    MessagePayload::HostHeartbeat(HeartbeatPayload {
                        host_id: host_id.clone(),
                    }),
                );

                if let Err(e) = bus.publish(&message).await {
                    tracing::warn!("Heartbeat publish failed: {:#}", e);
                }
            }
        })
    }
}
