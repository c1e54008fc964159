use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::events::ChangeEvent;
use crate::error::RemoteError;

/// A JSON payload we pass through without interpreting.
pub type ArbitraryJson = Value;

/// Envelopes sent by this client over the control channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "session.update")]
    SessionUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        instructions: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        voice: Option<String>,
    },
    #[serde(rename = "ping")]
    Ping,
}

/// Envelopes received from the remote endpoint over the control channel.
///
/// An envelope whose `type` tag is not recognized deserializes to `Unknown`
/// with the raw payload preserved, so new server message kinds never break
/// the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SessionCreated {
        session_id: String,
    },
    Pong,
    TranscriptDelta {
        text: String,
    },
    TranscriptDone {
        text: String,
    },
    Change {
        event: ChangeEvent,
    },
    Error {
        error: RemoteError,
    },
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ServerMessageRepr {
    #[serde(rename = "session.created")]
    SessionCreated { session_id: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "transcript.delta")]
    TranscriptDelta { text: String },
    #[serde(rename = "transcript.done")]
    TranscriptDone { text: String },
    #[serde(rename = "change.event")]
    Change { event: ChangeEvent },
    #[serde(rename = "error")]
    Error { error: RemoteError },
}

impl From<ServerMessageRepr> for ServerMessage {
    fn from(repr: ServerMessageRepr) -> Self {
        match repr {
            ServerMessageRepr::SessionCreated { session_id } => Self::SessionCreated { session_id },
            ServerMessageRepr::Pong => Self::Pong,
            ServerMessageRepr::TranscriptDelta { text } => Self::TranscriptDelta { text },
            ServerMessageRepr::TranscriptDone { text } => Self::TranscriptDone { text },
            ServerMessageRepr::Change { event } => Self::Change { event },
            ServerMessageRepr::Error { error } => Self::Error { error },
        }
    }
}

impl Serialize for ServerMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::SessionCreated { session_id } => ServerMessageRepr::SessionCreated {
                session_id: session_id.clone(),
            }
            .serialize(serializer),
            Self::Pong => ServerMessageRepr::Pong.serialize(serializer),
            Self::TranscriptDelta { text } => ServerMessageRepr::TranscriptDelta {
                text: text.clone(),
            }
            .serialize(serializer),
            Self::TranscriptDone { text } => ServerMessageRepr::TranscriptDone {
                text: text.clone(),
            }
            .serialize(serializer),
            Self::Change { event } => ServerMessageRepr::Change {
                event: event.clone(),
            }
            .serialize(serializer),
            Self::Error { error } => ServerMessageRepr::Error {
                error: error.clone(),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerMessageRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Unrecognized server message: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerMessage {
    /// The raw `type` tag, including tags this crate does not model.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::SessionCreated { .. } => Some("session.created"),
            Self::Pong => Some("pong"),
            Self::TranscriptDelta { .. } => Some("transcript.delta"),
            Self::TranscriptDone { .. } => Some("transcript.done"),
            Self::Change { .. } => Some("change.event"),
            Self::Error { .. } => Some("error"),
            Self::Unknown(value) => value.get("type").and_then(Value::as_str),
        }
    }
}
