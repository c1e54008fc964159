use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use canvas_rt_rs::error::RemoteError;
use canvas_rt_rs::session::BoxFuture;
use canvas_rt_rs::{
    AudioCapability, CapabilityProvider, ChangeEvent, ClientMessage, ConnectConfig,
    ConnectionState, Connector, ControlChannel, CredentialProvider, CredentialRequest, Error,
    RealtimeSession, ReconnectPolicy, Result, ServerMessage, SessionBuilder, SessionCredential,
    SessionEvent,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

struct MockChannel {
    incoming: mpsc::Receiver<ServerMessage>,
    outgoing: mpsc::Sender<ClientMessage>,
}

impl ControlChannel for MockChannel {
    fn send(&mut self, message: ClientMessage) -> BoxFuture<'_, Result<()>> {
        let outgoing = self.outgoing.clone();
        Box::pin(async move {
            outgoing
                .send(message)
                .await
                .map_err(|_| Error::ConnectionClosed)
        })
    }

    fn next_message(&mut self) -> BoxFuture<'_, Result<Option<ServerMessage>>> {
        Box::pin(async move { Ok(self.incoming.recv().await) })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { Ok(()) })
    }
}

fn mock_channel() -> (
    Box<dyn ControlChannel>,
    mpsc::Sender<ServerMessage>,
    mpsc::Receiver<ClientMessage>,
) {
    let (in_tx, in_rx) = mpsc::channel(16);
    let (out_tx, out_rx) = mpsc::channel(16);
    (
        Box::new(MockChannel {
            incoming: in_rx,
            outgoing: out_tx,
        }),
        in_tx,
        out_rx,
    )
}

struct StaticCredentials;

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn mint(&self, _request: &CredentialRequest) -> Result<SessionCredential> {
        Ok(SessionCredential {
            token: "tok_test".to_string(),
            expires_at: 0,
        })
    }
}

struct TrackedCapability {
    muted: bool,
    released: Arc<AtomicUsize>,
}

impl AudioCapability for TrackedCapability {
    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_muted(&self) -> bool {
        self.muted
    }
}

impl Drop for TrackedCapability {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CountingCapabilities {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl CapabilityProvider for CountingCapabilities {
    async fn acquire(&self) -> Result<Box<dyn AudioCapability>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedCapability {
            muted: false,
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedConnector {
    channels: Mutex<VecDeque<Result<Box<dyn ControlChannel>>>>,
    connects: AtomicUsize,
}

impl ScriptedConnector {
    fn new(channels: Vec<Result<Box<dyn ControlChannel>>>) -> Self {
        Self {
            channels: Mutex::new(channels.into_iter().collect()),
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        _credential: &SessionCredential,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn ControlChannel>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.channels
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Negotiation("connector script exhausted".to_string())))
    }
}

/// Connector whose connect attempt never resolves.
struct PendingConnector;

#[async_trait]
impl Connector for PendingConnector {
    async fn connect(
        &self,
        _credential: &SessionCredential,
        _config: &ConnectConfig,
    ) -> Result<Box<dyn ControlChannel>> {
        futures::future::pending().await
    }
}

fn config() -> ConnectConfig {
    ConnectConfig {
        voice: "sage".to_string(),
        model_id: "model-realtime".to_string(),
        system_instructions: Some("Draw what the user asks for.".to_string()),
    }
}

fn build_session(
    connector: Arc<dyn Connector>,
    capabilities: Arc<CountingCapabilities>,
    policy: ReconnectPolicy,
    heartbeat: Duration,
) -> RealtimeSession {
    SessionBuilder::new()
        .credentials(Arc::new(StaticCredentials))
        .connector(connector)
        .capabilities(capabilities)
        .reconnect_policy(policy)
        .heartbeat_interval(heartbeat)
        .build()
        .unwrap()
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(60),
        max_attempts,
    }
}

#[tokio::test]
async fn connect_delivers_states_and_forwards_events() {
    let (channel, in_tx, mut out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    assert_eq!(session.state(), ConnectionState::Connected);

    // The session pushes its parameters over the channel right after connect.
    let first = out_rx.recv().await.unwrap();
    match first {
        ClientMessage::SessionUpdate { instructions, voice } => {
            assert_eq!(instructions.as_deref(), Some("Draw what the user asks for."));
            assert_eq!(voice.as_deref(), Some("sage"));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::State(ConnectionState::Connecting))
    );
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::State(ConnectionState::Connected))
    );

    in_tx
        .send(ServerMessage::TranscriptDelta {
            text: "draw a ".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::TranscriptDelta {
            text: "draw a ".to_string()
        })
    );

    let change = ChangeEvent::DeleteShape {
        shape_id: "shape:1".to_string(),
    };
    in_tx
        .send(ServerMessage::Change {
            event: change.clone(),
        })
        .await
        .unwrap();
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::Change(change))
    );
}

#[tokio::test]
async fn connect_is_idempotent_when_connected() {
    let (channel, _in_tx, _out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    session.connect(config()).await.unwrap();

    assert_eq!(capabilities.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connect_while_in_flight_is_rejected_without_second_acquisition() {
    let connector = Arc::new(PendingConnector);
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    {
        let fut = session.connect(config());
        futures::pin_mut!(fut);
        assert!(futures::poll!(fut.as_mut()).is_pending());
        // Dropping the future leaves the attempt flagged as in flight.
    }

    let err = session.connect(config()).await.unwrap_err();
    assert!(matches!(err, Error::ConnectInFlight));
    assert_eq!(capabilities.acquired.load(Ordering::SeqCst), 1);

    // disconnect() clears the stuck attempt and releases the capability.
    session.disconnect().await;
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disconnect_releases_everything_and_ends_the_stream() {
    let (channel, _in_tx, mut out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = out_rx.recv().await; // session.update

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 1);

    // Queued state events drain, then the stream ends.
    let mut saw_disconnected = false;
    while let Some(event) = session.next_event().await.unwrap() {
        if event == SessionEvent::State(ConnectionState::Disconnected) {
            saw_disconnected = true;
        }
    }
    assert!(saw_disconnected);
}

#[tokio::test]
async fn failed_connect_releases_capability_and_reports() {
    let connector = Arc::new(ScriptedConnector::new(vec![Err(Error::Negotiation(
        "remote rejected the session".to_string(),
    ))]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        Arc::clone(&connector) as Arc<dyn Connector>,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    let err = session.connect(config()).await.unwrap_err();
    assert!(matches!(err, Error::Negotiation(_)));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 1);
    // Setup failure never enters the reconnect path.
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn unsolicited_close_reconnects_with_backoff() {
    let (channel1, in_tx1, mut out_rx1) = mock_channel();
    let (channel2, _in_tx2, mut out_rx2) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel1), Ok(channel2)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(5),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = out_rx1.recv().await; // session.update
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    drop(in_tx1); // remote endpoint drops the connection

    let started = Instant::now();
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::State(ConnectionState::Reconnecting))
    );
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::State(ConnectionState::Connected))
    );
    assert_eq!(started.elapsed(), Duration::from_millis(100));

    // The new channel got its own session.update; the capability was reused.
    match out_rx2.recv().await.unwrap() {
        ClientMessage::SessionUpdate { .. } => {}
        other => panic!("unexpected message: {other:?}"),
    }
    assert_eq!(capabilities.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_exhaustion_is_terminal() {
    let (channel1, in_tx1, _out_rx1) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel1)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    drop(in_tx1);

    let started = Instant::now();
    let err = session.next_event().await.unwrap_err();
    match err {
        Error::ReconnectExhausted { attempts } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
    // 100ms + 200ms + 400ms of doubling delays.
    assert_eq!(started.elapsed(), Duration::from_millis(700));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 1);

    // No further attempts: the stream just drains and ends.
    while let Some(event) = session.next_event().await.unwrap() {
        assert!(matches!(event, SessionEvent::State(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn disconnect_while_reconnecting_releases_the_capability() {
    let (channel1, in_tx1, _out_rx1) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel1)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(5),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    drop(in_tx1);

    // Drive the loop into the backoff sleep, then abandon it mid-recovery.
    {
        let fut = session.next_event();
        futures::pin_mut!(fut);
        assert!(futures::poll!(fut.as_mut()).is_pending());
    }
    assert_eq!(session.state(), ConnectionState::Reconnecting);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 0);

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(capabilities.released.load(Ordering::SeqCst), 1);

    // Nothing reconnects afterwards; the stream drains and ends.
    while let Some(event) = session.next_event().await.unwrap() {
        assert!(matches!(event, SessionEvent::State(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn unanswered_probe_tears_the_peer_down() {
    let (channel, _in_tx, mut out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(1),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    // First probe at 30s goes unanswered; the 60s probe tears down, and the
    // single reconnect attempt finds the connector script exhausted.
    let started = Instant::now();
    let err = session.next_event().await.unwrap_err();
    assert!(matches!(err, Error::ReconnectExhausted { attempts: 1 }));
    assert_eq!(
        started.elapsed(),
        Duration::from_secs(60) + Duration::from_millis(100)
    );

    let _ = out_rx.recv().await; // session.update
    match out_rx.recv().await.unwrap() {
        ClientMessage::Ping => {}
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn pong_acknowledges_the_probe() {
    let (channel, in_tx, mut out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(1),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    // Acknowledge the 30s probe at 35s, then hand the loop a transcript at
    // 40s so next_event returns instead of waiting out the next probe.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(35)).await;
        let _ = in_tx.send(ServerMessage::Pong).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let _ = in_tx
            .send(ServerMessage::TranscriptDelta {
                text: "ok".to_string(),
            })
            .await;
    });

    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::TranscriptDelta {
            text: "ok".to_string()
        })
    );
    assert_eq!(session.state(), ConnectionState::Connected);

    let _ = out_rx.recv().await; // session.update
    match out_rx.recv().await.unwrap() {
        ClientMessage::Ping => {}
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn remote_errors_and_unknown_envelopes_are_absorbed() {
    let (channel, in_tx, _out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    let _ = session.next_event().await.unwrap(); // Connecting
    let _ = session.next_event().await.unwrap(); // Connected

    in_tx
        .send(ServerMessage::Error {
            error: RemoteError {
                code: Some("rate_limited".to_string()),
                message: "slow down".to_string(),
            },
        })
        .await
        .unwrap();
    in_tx
        .send(ServerMessage::Unknown(serde_json::json!({
            "type": "diagnostics.report"
        })))
        .await
        .unwrap();
    in_tx
        .send(ServerMessage::TranscriptDone {
            text: "done".to_string(),
        })
        .await
        .unwrap();

    // Both problem envelopes are swallowed; the transcript comes through.
    assert_eq!(
        session.next_event().await.unwrap(),
        Some(SessionEvent::TranscriptDone {
            text: "done".to_string()
        })
    );
}

#[tokio::test]
async fn mute_control_reaches_the_capability() {
    let (channel, _in_tx, _out_rx) = mock_channel();
    let connector = Arc::new(ScriptedConnector::new(vec![Ok(channel)]));
    let capabilities = Arc::new(CountingCapabilities::default());
    let mut session = build_session(
        connector,
        Arc::clone(&capabilities),
        fast_policy(3),
        Duration::from_secs(30),
    );

    session.connect(config()).await.unwrap();
    assert!(!session.is_muted());
    session.set_muted(true);
    assert!(session.is_muted());
    session.set_muted(false);
    assert!(!session.is_muted());
}
