use quizmesh::bus::client::DEFAULT_RECENT_COUNT;
use quizmesh::bus::log::{InMemoryLog, MessageLog};
use quizmesh::bus::types::{AnswerPayload, MessageKind, MessagePayload, QuestionPayload};
use quizmesh::peer::types::{AccountTier, PeerId, PeerUpdate};
use quizmesh::session::coordinator::{SessionConfig, SessionCoordinator};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut session_id = String::from("demo-session");
    let mut player_count: usize = 3;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--session" => {
                session_id = args[i + 1].clone();
                i += 2;
            }
            "--players" => {
                player_count = args[i + 1].parse()?;
                i += 2;
            }
            "--help" => {
                eprintln!("Usage: {} [--session <id>] [--players <n>]", args[0]);
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    let player_count = player_count.max(2);

    tracing::info!(
        "Starting demo: session={} players={}",
        session_id,
        player_count
    );

    // Every device in the demo shares one in-process log; in production each
    // would hold its own connection to the shared ordered log.
    let log: Arc<dyn MessageLog> = Arc::new(InMemoryLog::new());

    // Short cadence so the failover below happens within seconds.
    let config = SessionConfig {
        host_timeout_ms: 2_000,
        liveness_check_interval: Duration::from_millis(500),
        heartbeat_interval: Duration::from_millis(500),
        poll_block: Duration::from_millis(100),
        ..SessionConfig::default()
    };

    // 1. Bring up the devices. The first one creates the session and becomes
    //    the initial host; only it has a premium account.
    let mut coordinators = Vec::new();
    for n in 0..player_count {
        let peer_id = PeerId(format!("player-{}", n + 1));
        let tier = if n == 0 {
            AccountTier::Premium
        } else {
            AccountTier::Free
        };

        let coordinator = SessionCoordinator::new(
            &session_id,
            peer_id.clone(),
            PeerUpdate::joining(tier, 80 - (n as u8) * 10, 90),
            n == 0,
            log.clone(),
            config.clone(),
        )
        .await;

        tracing::info!("Device {:?} joined ({:?})", peer_id, tier);
        coordinators.push(coordinator);
    }

    // 2. Everyone except the host listens for questions and answers with a
    //    wrong answer half the time.
    for coordinator in coordinators.iter().skip(1) {
        let me = coordinator.clone();
        coordinator.on_message(MessageKind::NewQuestion, move |message| {
            let me = me.clone();
            async move {
                if let MessagePayload::NewQuestion(q) = message.payload {
                    tracing::info!("{:?} got question: {}", me.local_peer(), q.text);
                    me.submit_answer(AnswerPayload {
                        player_id: me.local_peer().0.clone(),
                        question_id: q.question_id,
                        answer_index: if rand::random::<bool>() { 0 } else { 1 },
                        response_time_ms: rand::random::<u64>() % 3000,
                    })
                    .await?;
                }
                Ok(())
            }
        });
    }

    let host = coordinators[0].clone();
    host.on_message(MessageKind::AnswerSubmitted, |message| async move {
        if let MessagePayload::AnswerSubmitted(a) = message.payload {
            tracing::info!(
                "Host received answer {} from {} after {}ms",
                a.answer_index,
                a.player_id,
                a.response_time_ms
            );
        }
        Ok(())
    });

    // 3. The host runs one question round.
    tokio::time::sleep(Duration::from_millis(500)).await;
    host.broadcast_question(QuestionPayload {
        question_id: "q-1".to_string(),
        question_number: 1,
        text: "Which planet is known as the Red Planet?".to_string(),
        options: vec!["Mars".to_string(), "Venus".to_string()],
        time_limit_ms: 10_000,
    })
    .await?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    // 4. The host device drops off the network mid-game.
    tracing::info!("--- Host device disconnecting ---");
    host.destroy().await;

    // 5. The survivors detect the silence and elect a replacement.
    tokio::time::sleep(Duration::from_secs(4)).await;

    for coordinator in coordinators.iter().skip(1) {
        let state = coordinator.get_election_state().await;
        tracing::info!(
            "{:?}: role={:?} host={:?} can_host={}",
            coordinator.local_peer(),
            state.my_role,
            state.current_host_id,
            state.can_i_host
        );
    }

    let announcements = coordinators[1]
        .recent_messages("control", DEFAULT_RECENT_COUNT)
        .await?;
    for message in &announcements {
        if let MessagePayload::HostChanged(change) = &message.payload {
            tracing::info!(
                "Control channel: host changed to {} ({})",
                change.new_host_id,
                change.reason
            );
        }
    }

    for coordinator in coordinators.iter().skip(1) {
        coordinator.destroy().await;
    }

    tracing::info!("Demo finished");
    Ok(())
}
