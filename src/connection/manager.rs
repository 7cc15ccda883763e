//! Connection lifecycle manager
//!
//! Owns the single live channel for a participant session: TLS connect,
//! authentication handshake, typed event dispatch, and the
//! reconnect-on-failure loop. The channel itself is never shared outside
//! this module; downstream components subscribe to the event bus and
//! call [`ConnectionManager::send`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use super::frames::{ClientFrame, ServerEvent};
use super::reconnect::{close_disposition, reconnect_with_backoff, CloseDisposition, ReconnectConfig};

// ============================================================================
// Constants
// ============================================================================

/// Sentinel sent as the first frame when no bearer credential is available
pub const NO_AUTH_SENTINEL: &str = "no-auth";

/// Delay between transport-open and the handshake send. The transport may
/// report open before its buffers settle; sending immediately has been
/// observed to race on some stacks.
const HANDSHAKE_SETTLE_MS: u64 = 100;

/// Capacity of the broadcast event bus
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Types
// ============================================================================

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Connection-level errors: transport vs handshake vs not-ready vs
/// retry exhaustion.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Authentication handshake failed: {0}")]
    AuthHandshakeFailed(String),

    #[error("Channel not ready")]
    NotReady,

    #[error("Reconnection failed after max attempts")]
    RetriesExhausted,
}

/// Channel lifecycle state. `Open` is the raw transport; `Ready` is only
/// reached after the authentication frame was sent successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Closed,
    Connecting,
    Open,
    Authenticating,
    Ready,
}

/// Events published on the manager's broadcast bus.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake completed; channel is usable
    Ready,
    /// A decoded inbound frame
    Server(ServerEvent),
    /// Server parked the session intentionally; no reconnect will happen
    SessionHeld { reason: String },
    /// Retry budget exhausted; emitted at most once per connect() cycle
    ConnectivityLost,
    /// Channel closed (intentional disconnect)
    Closed,
}

/// Supplies the short-lived bearer credential. External identity flows
/// live behind this trait; the manager only ever sees the token string.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current bearer credential, or None when the participant has no
    /// identity-provider session (recruitment-platform flows).
    async fn bearer_token(&self) -> Option<String>;
}

/// Fixed-token credential source for recruitment flows and tests.
pub struct StaticCredentials(pub Option<String>);

#[async_trait]
impl CredentialSource for StaticCredentials {
    async fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

// ============================================================================
// Manager
// ============================================================================

struct Inner {
    ws_url: String,
    reconnect: ReconnectConfig,
    credentials: Arc<dyn CredentialSource>,
    state: RwLock<ChannelState>,
    writer: Mutex<Option<WsWriter>>,
    events: broadcast::Sender<ClientEvent>,
    /// Set by disconnect(); suppresses the reconnect loop
    intentional_close: AtomicBool,
    /// Guards the exactly-once ConnectivityLost emission
    lost_emitted: AtomicBool,
    participant_id: RwLock<Option<String>>,
    /// Always tracks the current channel's reader task, including the
    /// replacement channels opened by the reconnect loop
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        ws_url: impl Into<String>,
        reconnect: ReconnectConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                ws_url: ws_url.into(),
                reconnect,
                credentials,
                state: RwLock::new(ChannelState::Closed),
                writer: Mutex::new(None),
                events,
                intentional_close: AtomicBool::new(false),
                lost_emitted: AtomicBool::new(false),
                participant_id: RwLock::new(None),
                reader_handle: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to the typed event stream. Each downstream component
    /// subscribes once at construction time.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    pub async fn state(&self) -> ChannelState {
        *self.inner.state.read().await
    }

    /// Open the channel for a participant and perform the auth handshake.
    ///
    /// Calling connect while a channel is connecting, open or ready is a
    /// no-op; at most one channel is ever open per participant.
    pub async fn connect(&self, participant_id: &str) -> Result<(), ConnectionError> {
        let state = *self.inner.state.read().await;
        if state != ChannelState::Closed {
            tracing::debug!(participant_id, ?state, "connect ignored: channel in use");
            return Ok(());
        }

        *self.inner.participant_id.write().await = Some(participant_id.to_string());
        self.inner.intentional_close.store(false, Ordering::SeqCst);
        self.inner.lost_emitted.store(false, Ordering::SeqCst);

        let handle = Inner::open(&self.inner).await?;
        *self.inner.reader_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Send an action frame. Fails with `NotReady` unless the handshake
    /// has completed on the current channel instance.
    pub async fn send(&self, frame: &ClientFrame) -> Result<(), ConnectionError> {
        if *self.inner.state.read().await != ChannelState::Ready {
            return Err(ConnectionError::NotReady);
        }

        let payload = serde_json::to_string(frame)
            .map_err(|e| ConnectionError::Transport(format!("frame encode: {}", e)))?;

        let mut writer = self.inner.writer.lock().await;
        match writer.as_mut() {
            Some(w) => w
                .send(Message::Text(payload))
                .await
                .map_err(|e| ConnectionError::Transport(e.to_string())),
            None => Err(ConnectionError::NotReady),
        }
    }

    /// Close intentionally. No reconnection is attempted.
    pub async fn disconnect(&self) {
        self.inner.intentional_close.store(true, Ordering::SeqCst);

        if let Some(mut w) = self.inner.writer.lock().await.take() {
            let _ = w.send(Message::Close(None)).await;
        }
        if let Some(handle) = self.inner.reader_handle.lock().await.take() {
            handle.abort();
        }

        *self.inner.state.write().await = ChannelState::Closed;
        let _ = self.inner.events.send(ClientEvent::Closed);
        tracing::info!("channel closed intentionally");
    }
}

impl Inner {
    fn trader_url(&self, participant_id: &str) -> String {
        format!("{}{}", self.ws_url, participant_id)
    }

    /// Connect the transport, run the handshake, spawn the reader task.
    ///
    /// Boxed rather than `async fn`: the reader task's reconnect branch
    /// awaits `open` again, and the resulting recursive opaque future
    /// cannot satisfy the `Send` bound `tokio::spawn` requires. A failed
    /// open always leaves the state at `Closed` so a later connect can
    /// retry.
    fn open(
        inner: &Arc<Inner>,
    ) -> Pin<Box<dyn Future<Output = Result<JoinHandle<()>, ConnectionError>> + Send>> {
        let inner = Arc::clone(inner);
        Box::pin(async move {
            let result = Inner::open_channel(&inner).await;
            if result.is_err() {
                *inner.state.write().await = ChannelState::Closed;
            }
            result
        })
    }

    async fn open_channel(inner: &Arc<Inner>) -> Result<JoinHandle<()>, ConnectionError> {
        let participant_id = inner
            .participant_id
            .read()
            .await
            .clone()
            .ok_or_else(|| ConnectionError::Transport("no participant id".to_string()))?;
        let url = inner.trader_url(&participant_id);

        *inner.state.write().await = ChannelState::Connecting;
        let stream = connect_tls(&url).await?;
        *inner.state.write().await = ChannelState::Open;

        let (mut writer, reader) = stream.split();

        // Transport open is not authenticated: wait for the transport to
        // settle, then send the credential as the first application frame.
        tokio::time::sleep(Duration::from_millis(HANDSHAKE_SETTLE_MS)).await;
        *inner.state.write().await = ChannelState::Authenticating;

        let token = inner
            .credentials
            .bearer_token()
            .await
            .unwrap_or_else(|| NO_AUTH_SENTINEL.to_string());
        writer
            .send(Message::Text(token))
            .await
            .map_err(|e| ConnectionError::AuthHandshakeFailed(e.to_string()))?;

        *inner.writer.lock().await = Some(writer);
        *inner.state.write().await = ChannelState::Ready;
        let _ = inner.events.send(ClientEvent::Ready);
        tracing::info!(participant_id = %participant_id, "channel ready");

        let task_inner = Arc::clone(inner);
        Ok(tokio::spawn(async move {
            run_reader(task_inner, reader).await;
        }))
    }
}

/// Read frames until the channel dies, then apply the close disposition.
async fn run_reader(inner: Arc<Inner>, mut reader: WsReader) {
    let disposition = loop {
        match reader.next().await {
            Some(Ok(Message::Text(raw))) => match ServerEvent::decode(&raw) {
                Ok(Some(event)) => {
                    let _ = inner.events.send(ClientEvent::Server(event));
                }
                Ok(None) => {}
                Err(e) => {
                    // Malformed frames are absorbed, never fatal
                    tracing::warn!(error = %e, "malformed frame dropped");
                }
            },
            Some(Ok(Message::Ping(payload))) => {
                let mut writer = inner.writer.lock().await;
                if let Some(w) = writer.as_mut() {
                    let _ = w.send(Message::Pong(payload)).await;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = match &frame {
                    Some(f) => (u16::from(f.code), f.reason.to_string()),
                    None => (1006, String::new()),
                };
                tracing::info!(code, reason = %reason, "channel closed by server");
                break close_disposition(code, &reason);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "transport error, channel lost");
                break CloseDisposition::Reconnect;
            }
            None => break CloseDisposition::Reconnect,
        }
    };

    *inner.state.write().await = ChannelState::Closed;
    inner.writer.lock().await.take();

    if inner.intentional_close.load(Ordering::SeqCst) {
        return;
    }

    match disposition {
        CloseDisposition::Hold { reason } => {
            // Expected server-side park; resolution arrives via HTTP
            // polling or an explicit restart signal.
            let _ = inner.events.send(ClientEvent::SessionHeld { reason });
        }
        CloseDisposition::Reconnect => {
            let policy = inner.reconnect.clone();
            let result = reconnect_with_backoff(&policy, || {
                let inner = Arc::clone(&inner);
                async move {
                    // A connect() during the backoff window already opened
                    // a replacement channel; opening another here would
                    // leave two live sockets.
                    if *inner.state.read().await != ChannelState::Closed {
                        tracing::debug!("reconnect superseded by an active channel");
                        return Ok(());
                    }
                    let handle = Inner::open(&inner).await?;
                    *inner.reader_handle.lock().await = Some(handle);
                    Ok(())
                }
            })
            .await;

            if result.is_err() && !inner.lost_emitted.swap(true, Ordering::SeqCst) {
                tracing::error!("reconnect budget exhausted, connectivity lost");
                let _ = inner.events.send(ClientEvent::ConnectivityLost);
            }
        }
    }
}

/// Connect to a WebSocket endpoint with TLS (TLSv1.2 minimum). Plain
/// `ws://` URLs bypass TLS, which the tests rely on.
async fn connect_tls(url: &str) -> Result<WsStream, ConnectionError> {
    let tls = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ConnectionError::Transport(format!("TLS error: {}", e)))?;

    let (ws_stream, _response) =
        connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(tls)))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

    Ok(ws_stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_default_is_closed() {
        assert_eq!(ChannelState::default(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_send_before_connect_is_not_ready() {
        let manager = ConnectionManager::new(
            "ws://127.0.0.1:9/trader/",
            ReconnectConfig::default(),
            Arc::new(StaticCredentials(None)),
        );
        let frame = ClientFrame::CancelOrder { id: "X".into() };
        let err = manager.send(&frame).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NotReady));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_host_is_transport_error() {
        // Port 9 (discard) is not listening; initial connect errors rather
        // than entering the reconnect loop.
        let manager = ConnectionManager::new(
            "ws://127.0.0.1:9/trader/",
            ReconnectConfig::default(),
            Arc::new(StaticCredentials(None)),
        );
        let err = manager.connect("t-1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)), "got {:?}", err);
        // State falls back to Closed so the next connect can retry
        assert_eq!(manager.state().await, ChannelState::Closed);
    }

    #[tokio::test]
    async fn test_failed_connect_can_be_retried() {
        let manager = ConnectionManager::new(
            "ws://127.0.0.1:9/trader/",
            ReconnectConfig::default(),
            Arc::new(StaticCredentials(None)),
        );
        assert!(manager.connect("t-1").await.is_err());
        // A second attempt is not short-circuited by a stuck state
        let err = manager.connect("t-1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::Transport(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let with = StaticCredentials(Some("tok".into()));
        assert_eq!(with.bearer_token().await.as_deref(), Some("tok"));
        let without = StaticCredentials(None);
        assert!(without.bearer_token().await.is_none());
    }
}
