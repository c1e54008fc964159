use crate::error::Result;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderValue},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters the credential endpoint needs to mint a session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRequest {
    pub voice: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instructions: Option<String>,
}

/// A short-lived token scoped to one realtime session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
    pub expires_at: u64,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP adapter for the session-signaling endpoints: credential minting and
/// the offer/answer exchange that negotiates session parameters.
#[derive(Clone, Debug)]
pub struct SignalingAdapter {
    client: Client,
    base_url: String,
    auth_header: HeaderValue,
}

impl SignalingAdapter {
    /// Create a new adapter against `base_url` using the given API key.
    ///
    /// # Errors
    /// Returns an error if the API key makes an invalid header or the client
    /// cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        Self::new_with_timeouts(base_url, api_key, DEFAULT_TIMEOUT, DEFAULT_POOL_IDLE_TIMEOUT)
    }

    /// Create a new adapter with custom timeouts.
    ///
    /// # Errors
    /// Returns an error if the API key makes an invalid header or the client
    /// cannot be built.
    pub fn new_with_timeouts(
        base_url: impl Into<String>,
        api_key: &str,
        timeout: Duration,
        pool_idle_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(pool_idle_timeout)
            .build()?;

        let auth_header = HeaderValue::from_str(&format!("Bearer {api_key}"))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_header,
        })
    }

    /// Mint a short-lived session credential for the given voice and model.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn create_credential(&self, request: &CredentialRequest) -> Result<SessionCredential> {
        let res = self
            .client
            .post(format!("{}/credentials", self.base_url))
            .header(AUTHORIZATION, &self.auth_header)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        Ok(res.json().await?)
    }

    /// Post a local session description and return the remote one.
    ///
    /// # Errors
    /// Returns an error if the HTTP request fails.
    pub async fn post_offer(&self, credential: &SessionCredential, offer: String) -> Result<String> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.token))?;
        let res = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .header(AUTHORIZATION, auth)
            .header("Content-Type", "application/sdp")
            .body(offer)
            .send()
            .await?
            .error_for_status()?;

        Ok(res.text().await?)
    }
}
