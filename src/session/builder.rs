use std::sync::Arc;
use std::time::Duration;

use super::backoff::ReconnectPolicy;
use super::capability::{CapabilityProvider, CredentialProvider};
use super::channel::Connector;
use super::session::RealtimeSession;
use crate::error::{Error, Result};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Builds a [`RealtimeSession`] from its injected collaborators.
///
/// The credential, connector, and capability collaborators are required; the
/// reconnect policy and heartbeat interval have defaults.
#[derive(Default)]
pub struct SessionBuilder {
    credentials: Option<Arc<dyn CredentialProvider>>,
    connector: Option<Arc<dyn Connector>>,
    capabilities: Option<Arc<dyn CapabilityProvider>>,
    reconnect: Option<ReconnectPolicy>,
    heartbeat_interval: Option<Duration>,
}

impl SessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Assemble the session.
    ///
    /// # Errors
    /// Returns an error if a required collaborator is missing.
    pub fn build(self) -> Result<RealtimeSession> {
        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config("credential provider required".to_string()))?;
        let connector = self
            .connector
            .ok_or_else(|| Error::Config("connector required".to_string()))?;
        let capabilities = self
            .capabilities
            .ok_or_else(|| Error::Config("capability provider required".to_string()))?;

        Ok(RealtimeSession::new(
            credentials,
            connector,
            capabilities,
            self.reconnect.unwrap_or_default(),
            self.heartbeat_interval
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
        ))
    }
}
