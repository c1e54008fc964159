//! Network plumbing: the control-channel WebSocket and the HTTP signaling
//! endpoints used to mint credentials and negotiate sessions.

pub mod signaling;
pub mod ws;

pub use signaling::{CredentialRequest, SessionCredential, SignalingAdapter};
