#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Streaming integration between realtime LLM output and a whiteboard
//! editor's change-event pipeline.
//!
//! Two cores cooperate:
//!
//! - [`extract::EventExtractor`] consumes a growing completion stream and
//!   emits each change event exactly once, in order, as soon as the bytes
//!   prove it complete — without waiting for the full response.
//! - [`session::RealtimeSession`] manages one bidirectional realtime
//!   connection (negotiation, heartbeat liveness, bounded reconnect backoff)
//!   and relays transcript deltas and change events to the consumer.
//!
//! The editor itself, speech handling, and credential issuance are external
//! collaborators reached through the traits in [`session`].

pub mod error;
pub mod extract;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use extract::{DONE_SENTINEL, EventExtractor, SseDecoder, SseFrame};
pub use protocol::{ChangeEvent, ClientMessage, ServerMessage};
pub use session::{
    AudioCapability, CapabilityProvider, ConnectConfig, ConnectionState, Connector,
    ControlChannel, CredentialProvider, RealtimeSession, ReconnectPolicy, SessionBuilder,
    SessionEvent, Signaling, WsConnector,
};
pub use transport::{CredentialRequest, SessionCredential, SignalingAdapter};
