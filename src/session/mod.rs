//! The realtime transport session: lifecycle, liveness, reconnection, and
//! dispatch of control-channel envelopes to the consumer.

mod backoff;
mod builder;
mod capability;
mod channel;
#[allow(clippy::module_inception)]
mod session;

pub use backoff::ReconnectPolicy;
pub use builder::SessionBuilder;
pub use capability::{AudioCapability, CapabilityProvider, CredentialProvider, Signaling};
pub use channel::{BoxFuture, Connector, ControlChannel, WsConnector, WsControlChannel};
pub use session::{ConnectConfig, ConnectionState, RealtimeSession, SessionEvent};
