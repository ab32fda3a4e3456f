//! Hub server core: shared state, WebSocket handler, subscription registry,
//! and channel fan-out.
//!
//! The hub accepts WebSocket connections, greets each one with a socket id,
//! and tracks which channels each connection is subscribed to. A publish on
//! a channel is delivered to every current subscriber, best-effort: the hub
//! keeps no history, so a client that subscribes after a publish never sees
//! that payload.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use taskstream_proto::hub::{self, HubMessage};
use tokio::sync::{RwLock, mpsc};

/// Default maximum allowed publish payload size in bytes (64 KiB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Shared hub state holding the connection and subscription registries.
pub struct HubState {
    /// Writer channel for every open connection, keyed by hub-internal
    /// client id. Covers sockets that never subscribe (publishers, idle
    /// clients) so server-wide operations can reach them.
    connections: RwLock<HashMap<u64, mpsc::UnboundedSender<Message>>>,
    /// Maps channel name to the subscribed clients' message senders,
    /// keyed by hub-internal client id.
    subscribers: RwLock<HashMap<String, HashMap<u64, mpsc::UnboundedSender<Message>>>>,
    /// Next hub-internal client id.
    next_client_id: AtomicU64,
    /// Maximum allowed publish payload size in bytes.
    max_payload_size: usize,
}

impl Default for HubState {
    fn default() -> Self {
        Self::new()
    }
}

impl HubState {
    /// Creates a new hub state with no subscriptions and the default
    /// payload size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Creates a new hub state with a custom payload size limit.
    #[must_use]
    pub fn with_config(max_payload_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            max_payload_size,
        }
    }

    /// Allocates a hub-internal id for a new connection.
    fn next_client_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Records a connection's writer channel.
    pub async fn register_connection(
        &self,
        client_id: u64,
        sender: mpsc::UnboundedSender<Message>,
    ) {
        self.connections.write().await.insert(client_id, sender);
    }

    /// Drops a connection from the registry.
    pub async fn unregister_connection(&self, client_id: u64) {
        self.connections.write().await.remove(&client_id);
    }

    /// Number of currently open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Adds a client to a channel's subscriber set.
    ///
    /// Returns `false` if the client was already subscribed, in which case
    /// the existing sender is left in place and no duplicate delivery can
    /// occur.
    pub async fn subscribe(
        &self,
        channel: &str,
        client_id: u64,
        sender: mpsc::UnboundedSender<Message>,
    ) -> bool {
        let mut subs = self.subscribers.write().await;
        let entry = subs.entry(channel.to_string()).or_default();
        if entry.contains_key(&client_id) {
            return false;
        }
        entry.insert(client_id, sender);
        true
    }

    /// Removes a client from a channel's subscriber set.
    ///
    /// Returns `true` if the client was subscribed. Empty channels are
    /// dropped from the registry.
    pub async fn unsubscribe(&self, channel: &str, client_id: u64) -> bool {
        let mut subs = self.subscribers.write().await;
        let Some(entry) = subs.get_mut(channel) else {
            return false;
        };
        let existed = entry.remove(&client_id).is_some();
        if entry.is_empty() {
            subs.remove(channel);
        }
        existed
    }

    /// Removes a client from every channel it is subscribed to.
    pub async fn unsubscribe_all(&self, client_id: u64) {
        let mut subs = self.subscribers.write().await;
        subs.retain(|_, entry| {
            entry.remove(&client_id);
            !entry.is_empty()
        });
    }

    /// Number of current subscribers on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let subs = self.subscribers.read().await;
        subs.get(channel).map_or(0, HashMap::len)
    }

    /// Fans a payload out to every current subscriber of a channel.
    ///
    /// Delivery is best-effort: senders whose connection has gone away are
    /// skipped, and nothing is retained for future subscribers. Returns the
    /// number of subscribers the payload was handed to.
    pub async fn publish(&self, channel: &str, payload: Vec<u8>) -> usize {
        let frame = HubMessage::Event {
            channel: channel.to_string(),
            payload,
        };
        let Ok(bytes) = hub::encode(&frame) else {
            tracing::error!(channel = %channel, "failed to encode event frame");
            return 0;
        };

        let subs = self.subscribers.read().await;
        let Some(entry) = subs.get(channel) else {
            tracing::debug!(channel = %channel, "publish on channel with no subscribers");
            return 0;
        };

        let mut delivered = 0;
        for (client_id, sender) in entry {
            if sender
                .send(Message::Binary(bytes.clone().into()))
                .is_err()
            {
                tracing::warn!(client_id = %client_id, channel = %channel, "subscriber channel closed, skipping");
            } else {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send a WebSocket Close frame to every open connection, subscribed
    /// or not.
    ///
    /// Each writer task forwards the close frame, which triggers the
    /// client-side reader to detect disconnection. Useful for graceful
    /// shutdown and testing.
    pub async fn close_all_connections(&self) {
        let connections = self.connections.read().await;
        for (client_id, sender) in connections.iter() {
            tracing::info!(client_id = %client_id, "sending close frame to connection");
            let _ = sender.send(Message::Close(None));
        }
    }
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Assign a socket id and send `Connected`.
/// 2. Register the connection's writer channel, then enter the message
///    loop, handling subscribes, unsubscribes, and publishes.
/// 3. On disconnect, drop the connection registration and all of the
///    client's subscriptions.
pub async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let client_id = state.next_client_id();
    let socket_id = uuid::Uuid::now_v7().to_string();

    // Greet the connection before accepting any client frames.
    let greeting = HubMessage::Connected {
        socket_id: socket_id.clone(),
    };
    if let Err(e) = send_hub_msg(&mut ws_sender, &greeting).await {
        tracing::error!(client_id = %client_id, error = %e, "failed to send Connected greeting");
        return;
    }

    tracing::info!(client_id = %client_id, socket_id = %socket_id, "client connected");

    // Channel feeding this client's WebSocket writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register_connection(client_id, tx.clone()).await;

    let writer_client_id = client_id;
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(client_id = %writer_client_id, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: process incoming frames from this client.
    let reader_state = Arc::clone(&state);
    let reader_tx = tx.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(client_id, &data, &reader_tx, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(client_id = %client_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Clean up: drop the connection and every subscription held by it.
    state.unregister_connection(client_id).await;
    state.unsubscribe_all(client_id).await;
    tracing::info!(client_id = %client_id, "client disconnected, subscriptions dropped");
}

/// Handles a binary WebSocket frame from a connected client.
async fn handle_binary_message(
    client_id: u64,
    data: &[u8],
    tx: &mpsc::UnboundedSender<Message>,
    state: &Arc<HubState>,
) {
    let msg = match hub::decode(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(client_id = %client_id, error = %e, "failed to decode frame");
            return;
        }
    };

    match msg {
        HubMessage::Subscribe { channel } => {
            if channel.is_empty() {
                tracing::warn!(client_id = %client_id, "received Subscribe with empty channel");
                send_frame(tx, &HubMessage::Error {
                    reason: "channel name must not be empty".to_string(),
                });
                return;
            }
            let added = state.subscribe(&channel, client_id, tx.clone()).await;
            tracing::info!(
                client_id = %client_id,
                channel = %channel,
                added = added,
                "subscribe"
            );
            // Ack even when the subscription already existed.
            send_frame(tx, &HubMessage::Subscribed { channel });
        }
        HubMessage::Unsubscribe { channel } => {
            let existed = state.unsubscribe(&channel, client_id).await;
            tracing::info!(
                client_id = %client_id,
                channel = %channel,
                existed = existed,
                "unsubscribe"
            );
        }
        HubMessage::Publish { channel, payload } => {
            if payload.len() > state.max_payload_size {
                tracing::warn!(
                    client_id = %client_id,
                    size = payload.len(),
                    max = state.max_payload_size,
                    "publish payload exceeds size limit"
                );
                send_frame(tx, &HubMessage::Error {
                    reason: format!(
                        "payload too large: {} bytes (max {})",
                        payload.len(),
                        state.max_payload_size
                    ),
                });
                return;
            }
            let delivered = state.publish(&channel, payload).await;
            tracing::debug!(
                client_id = %client_id,
                channel = %channel,
                delivered = delivered,
                "publish fanned out"
            );
        }
        other => {
            tracing::warn!(
                client_id = %client_id,
                msg = ?other,
                "unexpected message type from client"
            );
        }
    }
}

/// Encodes a hub message and pushes it onto a client's writer channel.
fn send_frame(tx: &mpsc::UnboundedSender<Message>, msg: &HubMessage) {
    if let Ok(bytes) = hub::encode(msg) {
        let _ = tx.send(Message::Binary(bytes.into()));
    }
}

/// Encodes and sends a hub message directly on a WebSocket sender.
async fn send_hub_msg(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &HubMessage,
) -> Result<(), String> {
    let bytes = hub::encode(msg)?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the hub server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub server with a pre-configured [`HubState`].
///
/// Use [`HubState::with_config`] to create a state with a custom payload
/// size limit from the resolved [`crate::config::HubConfig`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<HubState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
