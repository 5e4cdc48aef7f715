//! Host Failure Detection
//!
//! A fixed-period check of the believed host's liveness. Two independent
//! signals can each trigger a timeout: a stale (or missing) registry record,
//! and silence on the heartbeat channel. The channel check matters because a
//! host whose messages stopped flowing is down for practical purposes even
//! if nothing ever updated the registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::controller::{Role, RoleController};
use crate::bus::client::BusClient;
use crate::bus::types::MessagePayload;
use crate::peer::registry::{is_alive, PeerRegistry};
use crate::peer::types::{now_ms, PeerId};

pub struct FailureDetector {
    local_peer: PeerId,
    registry: Arc<PeerRegistry>,
    bus: Arc<BusClient>,
    controller: Arc<RoleController>,
    check_interval: Duration,
    host_timeout_ms: u64,
}

impl FailureDetector {
    pub fn new(
        local_peer: PeerId,
        registry: Arc<PeerRegistry>,
        bus: Arc<BusClient>,
        controller: Arc<RoleController>,
        check_interval: Duration,
        host_timeout_ms: u64,
    ) -> Self {
        Self {
            local_peer,
            registry,
            bus,
            controller,
            check_interval,
            host_timeout_ms,
        }
    }

    /// Starts the periodic check loop. The returned handle is owned (and
    /// aborted) by the session coordinator.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.check_interval);

            loop {
                interval.tick().await;
                self.check_host().await;
            }
        })
    }

    async fn check_host(&self) {
        // Nothing to watch while hosting ourselves or before a host is known.
        if self.controller.role().await == Role::Host {
            return;
        }
        let Some(host) = self.controller.current_host().await else {
            return;
        };
        if host == self.local_peer {
            return;
        }

        let now = now_ms();

        let registry_alive = self
            .registry
            .get(&host)
            .map(|peer| is_alive(&peer, now, self.host_timeout_ms))
            .unwrap_or(false);

        // Either signal alone is sufficient evidence of failure.
        if !registry_alive || !self.heartbeat_alive(&host, now).await {
            tracing::warn!("Host {:?} failed liveness check", host);
            self.controller.handle_host_timeout().await;
        }
    }

    /// Inspects the newest entry on the heartbeat channel.
    async fn heartbeat_alive(&self, host: &PeerId, now: u64) -> bool {
        let recent = match self.bus.get_recent("heartbeat", 1).await {
            Ok(messages) => messages,
            Err(e) => {
                // Transient read failure: skip this tick, retry on the next.
                tracing::warn!("Heartbeat channel check failed: {:#}", e);
                return true;
            }
        };

        let Some(latest) = recent.first() else {
            tracing::debug!("No heartbeat on channel for host {:?}", host);
            return false;
        };

        match &latest.payload {
            MessagePayload::HostHeartbeat(beat) if beat.host_id == host.0 => {
                now.saturating_sub(latest.emitted_at) < self.host_timeout_ms
            }
            // Heartbeat from a different peer: an election already happened
            // elsewhere, let the control channel catch us up.
            _ => true,
        }
    }
}
