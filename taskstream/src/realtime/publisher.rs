//! Server-side event publishing.
//!
//! [`EventPublisher`] is the seam between task mutations and the broadcast
//! fabric: the task service fires events through it without knowing how
//! they travel. [`HubPublisher`] is the production implementation, holding
//! its own WebSocket to the hub and publishing each event's JSON envelope
//! on the event's channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use taskstream_proto::event::{self, TaskEvent};
use taskstream_proto::hub::{self, HubMessage};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Timeout for connecting to the hub.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the hub's `Connected` greeting.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from publishing an event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The event could not be serialized.
    #[error("event encode failed: {0}")]
    Encode(String),

    /// The hub connection is down.
    #[error("hub connection closed")]
    ConnectionClosed,

    /// Connecting to the hub failed.
    #[error("hub connect failed: {0}")]
    Connect(String),
}

/// Outbound side of the event pipeline.
///
/// Implementations must be cheap to share; the task service holds one for
/// its lifetime and publishes after every successful mutation.
pub trait EventPublisher: Send + Sync {
    /// Publishes one event to the broadcast fabric.
    fn publish(
        &self,
        event: &TaskEvent,
    ) -> impl std::future::Future<Output = Result<(), PublishError>> + Send;
}

/// Publishes events over a dedicated WebSocket connection to the hub.
pub struct HubPublisher {
    ws_sender: Arc<Mutex<WsSender>>,
    connected: Arc<AtomicBool>,
    /// Drains server frames (acks, errors) for the connection's lifetime.
    _reader_handle: tokio::task::JoinHandle<()>,
}

impl HubPublisher {
    /// Connects to the hub and waits for the `Connected` greeting.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Connect`] if the connection or greeting
    /// fails or times out.
    pub async fn connect(hub_url: &str) -> Result<Self, PublishError> {
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(hub_url))
            .await
            .map_err(|_| PublishError::Connect("connect timed out".to_string()))?
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        let (ws_sender, mut ws_reader) = ws_stream.split();

        let greeting = tokio::time::timeout(HANDSHAKE_TIMEOUT, ws_reader.next())
            .await
            .map_err(|_| PublishError::Connect("greeting timed out".to_string()))?;

        match greeting {
            Some(Ok(Message::Binary(data))) => match hub::decode(&data) {
                Ok(HubMessage::Connected { socket_id }) => {
                    tracing::info!(socket_id = %socket_id, url = hub_url, "publisher connected to hub");
                }
                Ok(other) => {
                    return Err(PublishError::Connect(format!(
                        "unexpected hub frame during handshake: {other:?}"
                    )));
                }
                Err(e) => return Err(PublishError::Connect(e)),
            },
            _ => {
                return Err(PublishError::Connect(
                    "hub closed connection during handshake".to_string(),
                ));
            }
        }

        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        if let Ok(HubMessage::Error { reason }) = hub::decode(&data) {
                            tracing::warn!(reason = %reason, "hub rejected publish");
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            reader_connected.store(false, Ordering::Relaxed);
            tracing::info!("publisher connection to hub lost");
        });

        Ok(Self {
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            connected,
            _reader_handle: reader_handle,
        })
    }

    /// Whether the publisher's hub connection is active.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl EventPublisher for HubPublisher {
    /// Wraps the event's JSON envelope in a Publish frame on the event's
    /// channel.
    ///
    /// # Errors
    ///
    /// - [`PublishError::ConnectionClosed`] if the hub connection is down.
    /// - [`PublishError::Encode`] if serialization fails.
    async fn publish(&self, event: &TaskEvent) -> Result<(), PublishError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(PublishError::ConnectionClosed);
        }

        let payload = event::encode(event).map_err(|e| PublishError::Encode(e.to_string()))?;
        let frame = HubMessage::Publish {
            channel: event.channel().to_string(),
            payload,
        };
        let bytes = hub::encode(&frame).map_err(PublishError::Encode)?;

        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "publish send failed");
                self.connected.store(false, Ordering::Relaxed);
                PublishError::ConnectionClosed
            })?;

        tracing::debug!(event = event.name(), channel = event.channel(), "event published");
        Ok(())
    }
}
