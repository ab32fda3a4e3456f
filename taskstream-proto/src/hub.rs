//! Hub wire protocol types for the `TaskStream` broadcast hub.
//!
//! Defines the [`HubMessage`] enum that is postcard-encoded and sent over
//! WebSocket binary frames between hub clients and the hub server.

use serde::{Deserialize, Serialize};

/// Messages exchanged between hub clients and the hub server.
///
/// The hub protocol is simple: the server greets each connection with a
/// socket id, clients subscribe to named channels, and publishes fan out
/// to every current subscriber of the channel. The hub never inspects
/// payload contents, it only reads channel names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubMessage {
    /// Server greets a freshly accepted connection.
    ///
    /// Always the first message on a new socket. Clients must wait for it
    /// before subscribing or publishing.
    Connected {
        /// Server-assigned identifier for this socket.
        socket_id: String,
    },

    /// Client asks to receive events published on a channel.
    ///
    /// Subscribing twice to the same channel is a no-op; the server still
    /// acknowledges with [`HubMessage::Subscribed`].
    Subscribe {
        /// Channel name to subscribe to.
        channel: String,
    },

    /// Server acknowledges a subscription.
    Subscribed {
        /// The channel that was subscribed (echoed back for confirmation).
        channel: String,
    },

    /// Client stops receiving events on a channel.
    Unsubscribe {
        /// Channel name to unsubscribe from.
        channel: String,
    },

    /// Client publishes an opaque payload to every subscriber of a channel.
    ///
    /// The publisher does not receive its own publish back unless it is
    /// also subscribed to the channel.
    Publish {
        /// Channel to fan the payload out on.
        channel: String,
        /// Opaque payload bytes (event envelope JSON in practice).
        payload: Vec<u8>,
    },

    /// Server delivers a published payload to a subscriber.
    Event {
        /// Channel the payload was published on.
        channel: String,
        /// Opaque payload bytes as published.
        payload: Vec<u8>,
    },

    /// Server reports an error condition.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`HubMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns a human-readable message if serialization fails.
pub fn encode(msg: &HubMessage) -> Result<Vec<u8>, String> {
    postcard::to_allocvec(msg).map_err(|e| format!("hub encode error: {e}"))
}

/// Decodes a [`HubMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns a human-readable message if the bytes are not a valid frame.
pub fn decode(bytes: &[u8]) -> Result<HubMessage, String> {
    postcard::from_bytes(bytes).map_err(|e| format!("hub decode error: {e}"))
}
