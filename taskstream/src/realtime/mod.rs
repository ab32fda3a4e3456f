//! Real-time pipeline: hub connection lifecycle, channel subscriptions,
//! event publishing, and reconciliation into the local stores.
//!
//! The [`ConnectionManager`] owns a single shared WebSocket connection to
//! the broadcast hub, reference-counted across consumers. Listener bindings
//! live in the [`SubscriptionRegistry`], which is durable across
//! disconnects: a reconnect re-subscribes every registered channel and
//! events flow to the same listeners without re-binding.

mod connection;
mod reconciler;
mod subscriptions;

pub mod publisher;

pub use connection::{ConnectionManager, RealtimeConfig};
pub use reconciler::EventReconciler;
pub use subscriptions::{ChannelHandle, EventListener, SubscriptionRegistry};

/// Lifecycle state of the shared hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The hub greeted us and subscriptions are live.
    Connected,
    /// A deliberate teardown-and-retry is in progress.
    Reconnecting,
    /// The last connection attempt failed.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Errors from establishing or using the hub connection.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// Connecting or waiting for the hub greeting timed out.
    #[error("hub connection timed out")]
    Timeout,

    /// The hub URL could not be reached.
    #[error("hub unreachable: {0}")]
    Unreachable(String),

    /// The hub closed the connection.
    #[error("hub connection closed")]
    ConnectionClosed,

    /// The hub sent something other than the expected greeting.
    #[error("hub handshake failed: {0}")]
    Handshake(String),

    /// Underlying I/O failure.
    #[error("hub I/O error: {0}")]
    Io(#[from] std::io::Error),
}
