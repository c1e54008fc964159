use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload carried by `error` envelopes on the control channel.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteError {
    pub code: Option<String>,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP protocol error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote endpoint error: {0:?}")]
    Remote(RemoteError),

    #[error("Failed to acquire input capability: {0}")]
    Capability(String),

    #[error("Session negotiation failed: {0}")]
    Negotiation(String),

    #[error("Invalid session configuration: {0}")]
    Config(String),

    #[error("A connect attempt is already in flight")]
    ConnectInFlight,

    #[error("The connection was closed unexpectedly")]
    ConnectionClosed,

    #[error("Could not (re)establish connection after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
