//! Durable channel subscription registry.
//!
//! The registry records which channels the client wants and which listener
//! handles each event kind on each channel. It outlives any single socket:
//! the connection manager re-subscribes every registered channel after a
//! reconnect, so bindings made while offline or before a connection drop
//! keep working without being re-registered.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use taskstream_proto::event::{EventKind, TaskEvent};

/// Callback invoked with each decoded event on a subscribed channel.
///
/// Shared so dispatch can run the callback without holding the registry
/// lock, letting a listener bind or remove channels itself.
pub type EventListener = Arc<dyn Fn(&TaskEvent) + Send + Sync>;

/// Channel-and-kind keyed listener table, shared between the connection
/// manager (dispatch side) and consumers (binding side).
#[derive(Default)]
pub struct SubscriptionRegistry {
    table: RwLock<HashMap<String, HashMap<EventKind, EventListener>>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records interest in a channel, with no listeners yet.
    ///
    /// Returns `true` if the channel was not already registered.
    pub fn ensure_channel(&self, channel: &str) -> bool {
        let mut table = self.table.write();
        if table.contains_key(channel) {
            return false;
        }
        table.insert(channel.to_string(), HashMap::new());
        true
    }

    /// Binds a listener for one event kind on a channel, replacing any
    /// previous listener for that kind.
    pub fn bind(&self, channel: &str, kind: EventKind, listener: EventListener) {
        let mut table = self.table.write();
        table
            .entry(channel.to_string())
            .or_default()
            .insert(kind, listener);
    }

    /// Every channel currently registered, for re-subscription after a
    /// reconnect.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    /// Whether a channel is registered.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.table.read().contains_key(channel)
    }

    /// Dispatches an event to the listener bound for its kind on the given
    /// channel. Returns the number of listeners invoked (0 or 1).
    pub fn dispatch(&self, channel: &str, event: &TaskEvent) -> usize {
        // Clone the listener out so the table lock is released before the
        // callback runs.
        let listener = {
            let table = self.table.read();
            let Some(listeners) = table.get(channel) else {
                tracing::debug!(channel = %channel, "event on unregistered channel, dropping");
                return 0;
            };
            let Some(listener) = listeners.get(&event.kind()) else {
                tracing::debug!(
                    channel = %channel,
                    kind = %event.kind(),
                    "no listener bound for event kind, dropping"
                );
                return 0;
            };
            Arc::clone(listener)
        };
        listener(event);
        1
    }

    /// Drops a channel and all its listeners.
    ///
    /// Returns `true` if the channel was registered.
    pub fn remove_channel(&self, channel: &str) -> bool {
        self.table.write().remove(channel).is_some()
    }
}

/// Consumer-facing handle to one subscribed channel.
///
/// Obtained from [`super::ConnectionManager::subscribe`]; binding a
/// listener through the handle survives reconnects because the binding
/// lives in the shared registry, not on the socket.
pub struct ChannelHandle {
    registry: Arc<SubscriptionRegistry>,
    channel: String,
}

impl ChannelHandle {
    /// Creates a handle over a registered channel.
    pub(crate) fn new(registry: Arc<SubscriptionRegistry>, channel: String) -> Self {
        Self { registry, channel }
    }

    /// Binds a listener for one event kind on this channel.
    pub fn on(&self, kind: EventKind, listener: EventListener) -> &Self {
        self.registry.bind(&self.channel, kind, listener);
        self
    }

    /// The channel name this handle is bound to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}
