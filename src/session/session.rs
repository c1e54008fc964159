use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval};

use super::backoff::ReconnectPolicy;
use super::capability::{AudioCapability, CapabilityProvider, CredentialProvider};
use super::channel::{Connector, ControlChannel};
use crate::error::{Error, Result};
use crate::protocol::{ChangeEvent, ClientMessage, ServerMessage};
use crate::transport::signaling::CredentialRequest;

/// Connection lifecycle of a session, as observed by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Parameters for one connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub voice: String,
    pub model_id: String,
    pub system_instructions: Option<String>,
}

/// What a session forwards to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State(ConnectionState),
    /// Incremental transcript text, forwarded as it arrives.
    TranscriptDelta { text: String },
    TranscriptDone { text: String },
    /// A structured change event, forwarded unchanged.
    Change(ChangeEvent),
}

/// One logical realtime connection with its own lifecycle.
///
/// The session owns its control channel, capability handle, and heartbeat
/// timer exclusively; nothing is shared across session instances. It spawns no
/// tasks: the caller drives it by awaiting [`RealtimeSession::next_event`],
/// which is where inbound dispatch, liveness probing, and reconnection happen.
pub struct RealtimeSession {
    credentials: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    capabilities: Arc<dyn CapabilityProvider>,
    reconnect: ReconnectPolicy,
    heartbeat_interval: Duration,

    state: ConnectionState,
    connect_in_flight: bool,
    config: Option<ConnectConfig>,
    capability: Option<Box<dyn AudioCapability>>,
    channel: Option<Box<dyn ControlChannel>>,
    heartbeat: Option<Interval>,
    awaiting_pong: bool,
    attempts: u32,
    queued: VecDeque<SessionEvent>,
}

enum Wake {
    Inbound(Result<Option<ServerMessage>>),
    Probe,
}

impl RealtimeSession {
    pub(super) fn new(
        credentials: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
        capabilities: Arc<dyn CapabilityProvider>,
        reconnect: ReconnectPolicy,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            credentials,
            connector,
            capabilities,
            reconnect,
            heartbeat_interval,
            state: ConnectionState::Disconnected,
            connect_in_flight: false,
            config: None,
            capability: None,
            channel: None,
            heartbeat: None,
            awaiting_pong: false,
            attempts: 0,
            queued: VecDeque::new(),
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Establish the session.
    ///
    /// A no-op when already connected. Fails with [`Error::ConnectInFlight`]
    /// when a previous connect attempt is still outstanding, so a handshake is
    /// never duplicated. Dropping the returned future mid-flight leaves the
    /// attempt marked in flight; call [`Self::disconnect`] to clear it before
    /// connecting again.
    ///
    /// # Errors
    /// Credential, capability, or negotiation failures are returned to the
    /// caller directly; they never trigger the reconnect policy. Everything
    /// partially acquired is released before returning.
    pub async fn connect(&mut self, config: ConnectConfig) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }
        if self.connect_in_flight || self.state == ConnectionState::Connecting {
            return Err(Error::ConnectInFlight);
        }

        self.connect_in_flight = true;
        let result = self.try_connect(config).await;
        self.connect_in_flight = false;

        match result {
            Ok(()) => {
                self.attempts = 0;
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(err) => {
                self.release_handles().await;
                self.capability = None;
                self.set_state(ConnectionState::Disconnected);
                Err(err)
            }
        }
    }

    async fn try_connect(&mut self, config: ConnectConfig) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(model_id = %config.model_id, "Connecting session");

        if self.capability.is_none() {
            self.capability = Some(self.capabilities.acquire().await?);
        }
        self.config = Some(config);
        self.open_channel().await
    }

    /// Mint a credential and open the control channel for the stored config.
    ///
    /// Shared by `connect` and the reconnect loop; the capability handle is
    /// reused, never re-acquired here.
    async fn open_channel(&mut self) -> Result<()> {
        let config = self.config.as_ref().ok_or(Error::ConnectionClosed)?;
        let request = CredentialRequest {
            voice: config.voice.clone(),
            model_id: config.model_id.clone(),
            system_instructions: config.system_instructions.clone(),
        };
        let credential = self.credentials.mint(&request).await?;
        let mut channel = self.connector.connect(&credential, config).await?;

        channel
            .send(ClientMessage::SessionUpdate {
                instructions: config.system_instructions.clone(),
                voice: Some(config.voice.clone()),
            })
            .await?;

        self.channel = Some(channel);
        let start = Instant::now() + self.heartbeat_interval;
        self.heartbeat = Some(tokio::time::interval_at(start, self.heartbeat_interval));
        self.awaiting_pong = false;
        Ok(())
    }

    /// Tear the session down. Safe to call from any state; suppresses any
    /// reconnect and releases the capability handle. Terminal for this
    /// session instance.
    pub async fn disconnect(&mut self) {
        tracing::info!("Disconnecting session");
        self.connect_in_flight = false;
        self.release_handles().await;
        self.capability = None;
        self.config = None;
        self.attempts = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Await the next event for the consumer.
    ///
    /// Returns `Ok(None)` once the session is disconnected and all queued
    /// events have been delivered.
    ///
    /// # Errors
    /// Returns [`Error::ReconnectExhausted`] when an unsolicited disconnect
    /// could not be recovered within the reconnect policy's attempt budget.
    pub async fn next_event(&mut self) -> Result<Option<SessionEvent>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(Some(event));
            }

            let (Some(channel), Some(heartbeat)) =
                (self.channel.as_mut(), self.heartbeat.as_mut())
            else {
                return Ok(None);
            };

            let wake = tokio::select! {
                message = channel.next_message() => Wake::Inbound(message),
                _ = heartbeat.tick() => Wake::Probe,
            };

            match wake {
                Wake::Inbound(Ok(Some(message))) => {
                    if let Some(event) = self.dispatch(message) {
                        return Ok(Some(event));
                    }
                }
                Wake::Inbound(Ok(None)) => {
                    tracing::warn!("Control channel closed unexpectedly");
                    self.recover().await?;
                }
                Wake::Inbound(Err(err)) => {
                    tracing::warn!("Control channel failed: {err}");
                    self.recover().await?;
                }
                Wake::Probe => self.probe().await?,
            }
        }
    }

    /// Mute or unmute the captured input without releasing it.
    pub fn set_muted(&mut self, muted: bool) {
        if let Some(capability) = self.capability.as_mut() {
            capability.set_muted(muted);
        }
    }

    /// Whether the captured input is currently muted.
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.capability.as_ref().is_some_and(|c| c.is_muted())
    }

    fn dispatch(&mut self, message: ServerMessage) -> Option<SessionEvent> {
        match message {
            ServerMessage::Pong => {
                self.awaiting_pong = false;
                None
            }
            ServerMessage::SessionCreated { session_id } => {
                tracing::info!(%session_id, "Session created by remote endpoint");
                None
            }
            ServerMessage::TranscriptDelta { text } => {
                Some(SessionEvent::TranscriptDelta { text })
            }
            ServerMessage::TranscriptDone { text } => Some(SessionEvent::TranscriptDone { text }),
            ServerMessage::Change { event } => Some(SessionEvent::Change(event)),
            ServerMessage::Error { error } => {
                tracing::warn!(?error, "Remote endpoint reported an error");
                None
            }
            ServerMessage::Unknown(value) => {
                tracing::debug!(
                    tag = value.get("type").and_then(serde_json::Value::as_str),
                    "Dropping unrecognized envelope"
                );
                None
            }
        }
    }

    /// One liveness tick: tear down an unresponsive peer, otherwise probe it.
    async fn probe(&mut self) -> Result<()> {
        if self.awaiting_pong {
            tracing::warn!("Peer failed to acknowledge probe, tearing down");
            return self.recover().await;
        }
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        match channel.send(ClientMessage::Ping).await {
            Ok(()) => {
                self.awaiting_pong = true;
                Ok(())
            }
            Err(err) => {
                tracing::warn!("Probe send failed: {err}");
                self.recover().await
            }
        }
    }

    /// Reconnect after an unsolicited closure, backing off per policy.
    async fn recover(&mut self) -> Result<()> {
        self.release_handles().await;
        self.set_state(ConnectionState::Reconnecting);

        while self.attempts < self.reconnect.max_attempts {
            self.attempts += 1;
            let delay = self.reconnect.delay_for(self.attempts);
            tracing::warn!(attempt = self.attempts, ?delay, "Reconnecting after delay");
            tokio::time::sleep(delay).await;

            match self.open_channel().await {
                Ok(()) => {
                    tracing::info!(attempt = self.attempts, "Reconnected");
                    self.attempts = 0;
                    self.set_state(ConnectionState::Connected);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(attempt = self.attempts, "Reconnect attempt failed: {err}");
                    self.release_handles().await;
                }
            }
        }

        let attempts = self.attempts;
        self.capability = None;
        self.set_state(ConnectionState::Disconnected);
        Err(Error::ReconnectExhausted { attempts })
    }

    /// Close and drop the channel and heartbeat. Leaves the capability alone;
    /// callers decide whether the teardown is terminal.
    async fn release_handles(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.close().await {
                tracing::debug!("Error closing control channel: {err}");
            }
        }
        self.heartbeat = None;
        self.awaiting_pong = false;
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.queued.push_back(SessionEvent::State(state));
        }
    }
}
