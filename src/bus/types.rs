//! Wire Types for Session Channels
//!
//! Every entry on the log carries the same field set: a type tag, the owning
//! session id, an emission timestamp, and a kind-specific JSON payload. The
//! payload schemas form a closed tagged union so malformed entries fail at
//! this boundary instead of inside a handler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::peer::types::now_ms;

/// Channel suffixes used within a session. Entry ordering is only guaranteed
/// within a single channel, never across channels.
pub const CHANNELS: [&str; 5] = ["questions", "answers", "heartbeat", "gamestate", "control"];

/// Fully-qualified channel name: `{sessionId}:{channelName}`.
pub fn channel_name(session_id: &str, channel: &str) -> String {
    format!("{}:{}", session_id, channel)
}

/// Error raised when a wire entry cannot be turned into a typed message.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("unknown message type: {0}")]
    UnknownKind(String),

    #[error("malformed {kind} payload: {source}")]
    MalformedPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {kind} payload: {source}")]
    EncodeFailed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The closed set of control message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    NewQuestion,
    AnswerSubmitted,
    HostHeartbeat,
    GameStateUpdate,
    HostChanged,
}

impl MessageKind {
    /// Wire-format type tag.
    pub fn as_wire(&self) -> &'static str {
        match self {
            MessageKind::NewQuestion => "NEW_QUESTION",
            MessageKind::AnswerSubmitted => "ANSWER_SUBMITTED",
            MessageKind::HostHeartbeat => "HOST_HEARTBEAT",
            MessageKind::GameStateUpdate => "GAME_STATE_UPDATE",
            MessageKind::HostChanged => "HOST_CHANGED",
        }
    }

    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "NEW_QUESTION" => Some(MessageKind::NewQuestion),
            "ANSWER_SUBMITTED" => Some(MessageKind::AnswerSubmitted),
            "HOST_HEARTBEAT" => Some(MessageKind::HostHeartbeat),
            "GAME_STATE_UPDATE" => Some(MessageKind::GameStateUpdate),
            "HOST_CHANGED" => Some(MessageKind::HostChanged),
            _ => None,
        }
    }

    /// The channel this kind is published on.
    pub fn channel(&self) -> &'static str {
        match self {
            MessageKind::NewQuestion => "questions",
            MessageKind::AnswerSubmitted => "answers",
            MessageKind::HostHeartbeat => "heartbeat",
            MessageKind::GameStateUpdate => "gamestate",
            MessageKind::HostChanged => "control",
        }
    }
}

/// Host announces a new question to all players.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    pub question_id: String,
    pub question_number: u32,
    pub text: String,
    pub options: Vec<String>,
    pub time_limit_ms: u64,
}

/// A client's answer to the current question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub player_id: String,
    pub question_id: String,
    pub answer_index: u32,
    pub response_time_ms: u64,
}

/// Periodic liveness signal from the current host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub host_id: String,
}

/// Announcement that the host role moved to another peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostChangedPayload {
    pub new_host_id: String,
    pub reason: String,
    pub election_timestamp: u64,
}

/// Kind-specific payloads. Game state is deliberately opaque and passed
/// through unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    NewQuestion(QuestionPayload),
    AnswerSubmitted(AnswerPayload),
    HostHeartbeat(HeartbeatPayload),
    GameStateUpdate(serde_json::Value),
    HostChanged(HostChangedPayload),
}

impl MessagePayload {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessagePayload::NewQuestion(_) => MessageKind::NewQuestion,
            MessagePayload::AnswerSubmitted(_) => MessageKind::AnswerSubmitted,
            MessagePayload::HostHeartbeat(_) => MessageKind::HostHeartbeat,
            MessagePayload::GameStateUpdate(_) => MessageKind::GameStateUpdate,
            MessagePayload::HostChanged(_) => MessageKind::HostChanged,
        }
    }

    fn to_data(&self) -> Result<String, BusError> {
        let kind = self.kind().as_wire();
        let encode = |r: serde_json::Result<String>| {
            r.map_err(|source| BusError::EncodeFailed { kind, source })
        };

        match self {
            MessagePayload::NewQuestion(p) => encode(serde_json::to_string(p)),
            MessagePayload::AnswerSubmitted(p) => encode(serde_json::to_string(p)),
            MessagePayload::HostHeartbeat(p) => encode(serde_json::to_string(p)),
            MessagePayload::GameStateUpdate(p) => encode(serde_json::to_string(p)),
            MessagePayload::HostChanged(p) => encode(serde_json::to_string(p)),
        }
    }

    fn from_data(kind: MessageKind, data: &str) -> Result<Self, BusError> {
        let malformed = |source: serde_json::Error| BusError::MalformedPayload {
            kind: kind.as_wire(),
            source,
        };

        match kind {
            MessageKind::NewQuestion => serde_json::from_str(data)
                .map(MessagePayload::NewQuestion)
                .map_err(malformed),
            MessageKind::AnswerSubmitted => serde_json::from_str(data)
                .map(MessagePayload::AnswerSubmitted)
                .map_err(malformed),
            MessageKind::HostHeartbeat => serde_json::from_str(data)
                .map(MessagePayload::HostHeartbeat)
                .map_err(malformed),
            MessageKind::GameStateUpdate => serde_json::from_str(data)
                .map(MessagePayload::GameStateUpdate)
                .map_err(malformed),
            MessageKind::HostChanged => serde_json::from_str(data)
                .map(MessagePayload::HostChanged)
                .map_err(malformed),
        }
    }
}

/// The raw field set appended to a channel. Field order on the wire is
/// insensitive; `data` holds the JSON-serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub timestamp: u64,
    pub data: String,
}

/// A typed control message flowing over a session channel. Immutable once
/// constructed; instances are transient and never outlive the log's
/// retention window.
#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub kind: MessageKind,
    pub session_id: String,
    /// Epoch millis at construction time.
    pub emitted_at: u64,
    pub payload: MessagePayload,
}

impl SessionMessage {
    pub fn new(session_id: &str, payload: MessagePayload) -> Self {
        Self {
            kind: payload.kind(),
            session_id: session_id.to_string(),
            emitted_at: now_ms(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<WireEntry, BusError> {
        Ok(WireEntry {
            kind: self.kind.as_wire().to_string(),
            session_id: self.session_id.clone(),
            timestamp: self.emitted_at,
            data: self.payload.to_data()?,
        })
    }

    pub fn decode(entry: &WireEntry) -> Result<Self, BusError> {
        let kind = MessageKind::from_wire(&entry.kind)
            .ok_or_else(|| BusError::UnknownKind(entry.kind.clone()))?;

        Ok(Self {
            kind,
            session_id: entry.session_id.clone(),
            emitted_at: entry.timestamp,
            payload: MessagePayload::from_data(kind, &entry.data)?,
        })
    }
}
