//! Shared hub connection with reference-counted lifecycle.
//!
//! One [`ConnectionManager`] backs every realtime consumer in the process.
//! Consumers call [`ConnectionManager::acquire`] when they start caring
//! about live events and [`ConnectionManager::release`] when they stop;
//! the WebSocket is torn down only when the last consumer releases.
//!
//! Subscriptions live in the [`SubscriptionRegistry`] rather than on the
//! socket, so a reconnect re-subscribes every registered channel and
//! previously bound listeners keep firing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskstream_proto::event;
use taskstream_proto::hub::{self, HubMessage};

use super::subscriptions::{ChannelHandle, SubscriptionRegistry};
use super::{ConnectionState, RealtimeError};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the hub.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for waiting for the hub's `Connected` greeting.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for the hub connection.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Hub WebSocket URL (ws:// or wss://).
    pub hub_url: String,
    /// How long to wait for the TCP/WebSocket connect.
    pub connect_timeout: Duration,
    /// How long to wait for the `Connected` greeting.
    pub handshake_timeout: Duration,
}

impl RealtimeConfig {
    /// Config pointing at the given hub URL with default timeouts.
    #[must_use]
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// State owned by one live WebSocket connection.
struct ActiveConnection {
    /// Write half of the WebSocket (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Cleared on teardown so the reader drops in-flight events instead of
    /// dispatching them after disconnect.
    live: Arc<AtomicBool>,
    /// Background reader task.
    reader_handle: tokio::task::JoinHandle<()>,
    /// Hub-assigned socket id from the greeting.
    socket_id: String,
}

/// Reference-counted manager for the process-wide hub connection.
///
/// Created once and shared via `Arc`. All methods take `&self`; the
/// connection slot is guarded by an async mutex so concurrent
/// `initialize` calls coalesce into one attempt.
pub struct ConnectionManager {
    config: RealtimeConfig,
    registry: Arc<SubscriptionRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    /// Receiver kept alive so `state_tx` never loses all subscribers.
    _state_rx: watch::Receiver<ConnectionState>,
    refs: AtomicUsize,
    inner: Mutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(config: RealtimeConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            state_tx,
            _state_rx: state_rx,
            refs: AtomicUsize::new(0),
            inner: Mutex::new(None),
        }
    }

    /// Establishes the hub connection if one is not already live.
    ///
    /// Idempotent: calling while connected is a no-op. On success the
    /// state becomes `Connected` and every channel in the registry has
    /// been re-subscribed, so listeners bound before the call (or before
    /// a previous disconnect) receive events without re-binding.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError`] and leaves the state at `Failed` if the
    /// connect or the greeting handshake fails.
    pub async fn initialize(&self) -> Result<(), RealtimeError> {
        let mut inner = self.inner.lock().await;
        if let Some(conn) = inner.as_ref()
            && conn.live.load(Ordering::Relaxed)
        {
            tracing::debug!("initialize called while already connected");
            return Ok(());
        }

        // Keep Reconnecting visible through the retry; otherwise announce
        // a fresh attempt.
        if *self.state_tx.borrow() != ConnectionState::Reconnecting {
            self.state_tx.send_replace(ConnectionState::Connecting);
        }

        match self.connect().await {
            Ok(conn) => {
                tracing::info!(
                    url = %self.config.hub_url,
                    socket_id = %conn.socket_id,
                    "hub connection established"
                );
                *inner = Some(conn);
                self.state_tx.send_replace(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(url = %self.config.hub_url, err = %e, "hub connection failed");
                *inner = None;
                self.state_tx.send_replace(ConnectionState::Failed);
                Err(e)
            }
        }
    }

    /// Performs one connection attempt: connect, await greeting,
    /// re-subscribe registered channels, spawn the reader.
    async fn connect(&self) -> Result<ActiveConnection, RealtimeError> {
        let url = &self.config.hub_url;

        let (ws_stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = %url, "hub WebSocket connect timed out");
                    RealtimeError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = %url, err = %e, "hub WebSocket connect failed");
                    map_ws_connect_error(e)
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        // The hub speaks first: wait for the Connected greeting.
        let greeting = tokio::time::timeout(self.config.handshake_timeout, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = %url, "hub greeting timed out");
                RealtimeError::Timeout
            })?;

        let socket_id = match greeting {
            Some(Ok(Message::Binary(data))) => match hub::decode(&data) {
                Ok(HubMessage::Connected { socket_id }) => socket_id,
                Ok(other) => {
                    tracing::warn!(?other, "unexpected hub frame during handshake");
                    return Err(RealtimeError::Handshake(
                        "expected Connected greeting".to_string(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed hub greeting");
                    return Err(RealtimeError::Handshake(e));
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("hub closed connection during handshake");
                return Err(RealtimeError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                return Err(RealtimeError::Handshake(
                    "unexpected non-binary frame during handshake".to_string(),
                ));
            }
            Some(Err(e)) => {
                return Err(RealtimeError::Handshake(format!(
                    "WebSocket error during handshake: {e}"
                )));
            }
        };

        // Re-apply the durable subscription table onto the fresh socket.
        for channel in self.registry.channels() {
            let frame = HubMessage::Subscribe {
                channel: channel.clone(),
            };
            let bytes = hub::encode(&frame).map_err(RealtimeError::Handshake)?;
            ws_sender
                .send(Message::Binary(bytes.into()))
                .await
                .map_err(|e| {
                    tracing::warn!(channel = %channel, err = %e, "failed to re-subscribe channel");
                    RealtimeError::ConnectionClosed
                })?;
            tracing::debug!(channel = %channel, "re-subscribed channel");
        }

        let live = Arc::new(AtomicBool::new(true));
        let reader_handle = tokio::spawn(reader_loop(
            ws_reader,
            Arc::clone(&self.registry),
            Arc::clone(&live),
            self.state_tx.clone(),
        ));

        Ok(ActiveConnection {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            live,
            reader_handle,
            socket_id,
        })
    }

    /// Tears the connection down and reports `Disconnected`.
    ///
    /// Safe to call while disconnected. Listener bindings stay in the
    /// registry and come back to life on the next `initialize`.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown(&mut inner).await;
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Tears down any existing connection and establishes a new one.
    ///
    /// The state passes through `Reconnecting` so observers can tell a
    /// deliberate retry from a fresh connect.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError`] if the new connection cannot be
    /// established; the state is then `Failed`.
    pub async fn reconnect(&self) -> Result<(), RealtimeError> {
        {
            let mut inner = self.inner.lock().await;
            self.teardown(&mut inner).await;
            self.state_tx.send_replace(ConnectionState::Reconnecting);
        }
        self.initialize().await
    }

    /// Closes the socket and aborts the reader. Does not touch the state
    /// channel; callers pick the state that fits.
    async fn teardown(&self, inner: &mut Option<ActiveConnection>) {
        let Some(conn) = inner.take() else {
            return;
        };

        // Mark dead first so in-flight events are dropped, not dispatched.
        conn.live.store(false, Ordering::Relaxed);

        {
            let mut sender = conn.ws_sender.lock().await;
            let _ = sender.send(Message::Close(None)).await;
        }
        conn.reader_handle.abort();
        tracing::info!(socket_id = %conn.socket_id, "hub connection torn down");
    }

    /// Registers one more consumer of the shared connection.
    ///
    /// Returns the new reference count. The caller is expected to pair
    /// this with exactly one [`Self::release`].
    pub fn acquire(&self) -> usize {
        let count = self.refs.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(refs = count, "connection reference acquired");
        count
    }

    /// Releases one consumer of the shared connection.
    ///
    /// When the last reference is released, the connection is torn down.
    /// Extra releases are ignored. Returns the remaining count.
    pub async fn release(&self) -> usize {
        let prev = self
            .refs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        let count = prev.saturating_sub(1);
        tracing::debug!(refs = count, "connection reference released");
        if prev == 1 {
            self.disconnect().await;
        }
        count
    }

    /// Subscribes to a channel, returning a handle for binding listeners.
    ///
    /// The channel is recorded in the durable registry immediately; the
    /// Subscribe frame is only sent if a connection is live. Offline
    /// subscriptions are applied by the next `initialize`.
    pub async fn subscribe(&self, channel: &str) -> ChannelHandle {
        let newly_registered = self.registry.ensure_channel(channel);

        if newly_registered {
            let inner = self.inner.lock().await;
            if let Some(conn) = inner.as_ref()
                && conn.live.load(Ordering::Relaxed)
            {
                self.send_frame(conn, &HubMessage::Subscribe {
                    channel: channel.to_string(),
                })
                .await;
            }
        }

        ChannelHandle::new(Arc::clone(&self.registry), channel.to_string())
    }

    /// Drops and immediately re-issues the subscription for a channel on
    /// the live connection. Listener bindings are untouched. No-op while
    /// disconnected.
    pub async fn resubscribe(&self, channel: &str) {
        let inner = self.inner.lock().await;
        let Some(conn) = inner.as_ref() else {
            return;
        };
        if !conn.live.load(Ordering::Relaxed) {
            return;
        }
        self.send_frame(conn, &HubMessage::Unsubscribe {
            channel: channel.to_string(),
        })
        .await;
        self.send_frame(conn, &HubMessage::Subscribe {
            channel: channel.to_string(),
        })
        .await;
        tracing::info!(channel = %channel, "channel re-subscribed in place");
    }

    /// Sends a frame on a live connection, best-effort.
    ///
    /// A failed send means the socket is gone: the connection is marked
    /// dead and the state reports `Disconnected` immediately rather than
    /// waiting for the reader to notice.
    async fn send_frame(&self, conn: &ActiveConnection, msg: &HubMessage) {
        let Ok(bytes) = hub::encode(msg) else {
            tracing::error!("failed to encode hub frame");
            return;
        };
        let mut sender = conn.ws_sender.lock().await;
        if let Err(e) = sender.send(Message::Binary(bytes.into())).await {
            tracing::warn!(err = %e, "hub frame send failed");
            conn.live.store(false, Ordering::Relaxed);
            self.state_tx.send_replace(ConnectionState::Disconnected);
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch channel for observing lifecycle transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether the connection is currently usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Current consumer reference count.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    /// The shared subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

/// Background task reading hub frames and dispatching decoded events.
///
/// Malformed frames and unknown event tags are logged and skipped; the
/// task does not disconnect on bad data. When the socket closes, the
/// state is flipped to `Disconnected` unless a deliberate teardown
/// already claimed the connection.
async fn reader_loop(
    mut ws_reader: WsReader,
    registry: Arc<SubscriptionRegistry>,
    live: Arc<AtomicBool>,
    state_tx: watch::Sender<ConnectionState>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match hub::decode(&data) {
                Ok(HubMessage::Event { channel, payload }) => {
                    if !live.load(Ordering::Relaxed) {
                        tracing::debug!(channel = %channel, "dropping event after teardown");
                        break;
                    }
                    match event::decode(&payload) {
                        Ok(task_event) => {
                            let dispatched = registry.dispatch(&channel, &task_event);
                            tracing::debug!(
                                channel = %channel,
                                event = task_event.name(),
                                dispatched = dispatched,
                                "event dispatched"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(channel = %channel, err = %e, "undecodable event payload, skipping");
                        }
                    }
                }
                Ok(HubMessage::Subscribed { channel }) => {
                    tracing::debug!(channel = %channel, "subscription acknowledged");
                }
                Ok(HubMessage::Error { reason }) => {
                    tracing::warn!(reason = %reason, "hub reported error");
                }
                Ok(other) => {
                    tracing::debug!(?other, "unexpected hub message type");
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed hub frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("hub WebSocket closed by server");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_) | Message::Frame(_)) => {
                // Ignore control and text frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "hub WebSocket read error");
                break;
            }
        }
    }

    // Only the task that actually owned the live connection reports the
    // loss; a deliberate teardown already cleared the flag.
    if live.swap(false, Ordering::Relaxed) {
        state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!("hub connection lost");
    }
}

/// Map a `tokio_tungstenite` connection error to a [`RealtimeError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> RealtimeError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                RealtimeError::Unreachable(io_err.to_string())
            } else {
                RealtimeError::Io(io_err)
            }
        }
        WsError::Tls(_) => RealtimeError::Unreachable(format!("TLS error: {err}")),
        WsError::Http(response) => {
            RealtimeError::Unreachable(format!("hub HTTP error: status {}", response.status()))
        }
        other => RealtimeError::Unreachable(format!("hub connection error: {other}")),
    }
}
