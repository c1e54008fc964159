use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::from_str;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::capability::Signaling;
use super::session::ConnectConfig;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::signaling::SessionCredential;
use crate::transport::ws::{self, WsStream};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// The duplex side-channel a connected session exchanges envelopes over.
pub trait ControlChannel: Send {
    fn send(&mut self, message: ClientMessage) -> BoxFuture<'_, Result<()>>;
    /// `Ok(None)` means the remote endpoint closed the channel.
    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<ServerMessage>>>;
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// Establishes the transport and control channel for one connect attempt.
///
/// Injected into the session so tests can drive the lifecycle without a
/// network, and so other transports can slot in behind the same state machine.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        credential: &SessionCredential,
        config: &ConnectConfig,
    ) -> Result<Box<dyn ControlChannel>>;
}

/// Control channel over the WebSocket transport.
pub struct WsControlChannel {
    stream: WsStream,
}

impl WsControlChannel {
    #[must_use]
    pub const fn new(stream: WsStream) -> Self {
        Self { stream }
    }

    async fn send_message(&mut self, message: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        tracing::trace!("Sending message: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn recv_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!(
                        "Received message: {}",
                        safe_truncate(&text, TRACE_LOG_MAX_BYTES)
                    );
                    // Malformed envelopes are dropped, never fatal.
                    match from_str::<ServerMessage>(&text) {
                        Ok(message) => return Ok(Some(message)),
                        Err(err) => tracing::debug!("Dropping malformed envelope: {err}"),
                    }
                }
                Message::Close(_) => {
                    tracing::info!("Control channel closed by remote endpoint");
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }
}

impl ControlChannel for WsControlChannel {
    fn send(&mut self, message: ClientMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.send_message(message))
    }

    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<ServerMessage>>> {
        Box::pin(self.recv_message())
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.stream.close().await?;
            Ok(())
        })
    }
}

/// Default connector: negotiates session parameters through the signaling
/// collaborator, then attaches the control channel over WebSocket.
pub struct WsConnector {
    signaling: Arc<dyn Signaling>,
    ws_base_url: String,
}

impl WsConnector {
    #[must_use]
    pub fn new(signaling: Arc<dyn Signaling>, ws_base_url: impl Into<String>) -> Self {
        Self {
            signaling,
            ws_base_url: ws_base_url.into(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        credential: &SessionCredential,
        config: &ConnectConfig,
    ) -> Result<Box<dyn ControlChannel>> {
        let offer = serde_json::to_string(&serde_json::json!({
            "voice": config.voice,
            "model_id": config.model_id,
        }))?;
        let answer = self.signaling.negotiate(credential, offer).await?;
        if answer.trim().is_empty() {
            return Err(Error::Negotiation(
                "remote endpoint returned an empty session description".to_string(),
            ));
        }
        tracing::debug!(bytes = answer.len(), "Session negotiated");

        let stream = ws::connect(&self.ws_base_url, &credential.token, &config.model_id).await?;
        Ok(Box::new(WsControlChannel::new(stream)))
    }
}

fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}
