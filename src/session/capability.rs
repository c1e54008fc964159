use async_trait::async_trait;

use crate::Result;
use crate::transport::signaling::{
    CredentialRequest, SessionCredential, SignalingAdapter,
};

/// Mints short-lived session credentials. Token issuance mechanics are the
/// provider's business; the session only carries the result around.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn mint(&self, request: &CredentialRequest) -> Result<SessionCredential>;
}

/// Exchanges a local session description for the remote endpoint's answer.
#[async_trait]
pub trait Signaling: Send + Sync {
    async fn negotiate(&self, credential: &SessionCredential, offer: String) -> Result<String>;
}

/// A captured audio input source that can be muted without being released.
///
/// Releasing the capability is dropping it; implementations free the
/// underlying device in `Drop`.
pub trait AudioCapability: Send {
    fn set_muted(&mut self, muted: bool);
    fn is_muted(&self) -> bool;
}

/// Acquires the audio input capability. Acquisition may prompt the user, so
/// the session acquires once and reuses the handle across reconnects.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn AudioCapability>>;
}

#[async_trait]
impl CredentialProvider for SignalingAdapter {
    async fn mint(&self, request: &CredentialRequest) -> Result<SessionCredential> {
        self.create_credential(request).await
    }
}

#[async_trait]
impl Signaling for SignalingAdapter {
    async fn negotiate(&self, credential: &SessionCredential, offer: String) -> Result<String> {
        self.post_offer(credential, offer).await
    }
}
