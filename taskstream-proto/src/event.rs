//! Domain events broadcast after task mutations.
//!
//! [`TaskEvent`] is a closed tagged union over the three mutation kinds.
//! On the wire each event is a JSON envelope `{"event": <name>, "data":
//! <payload>}`, dispatched by the `event` tag. Unknown tags are rejected
//! explicitly rather than silently ignored.
//!
//! Events are ephemeral: never persisted, never replayed. A client that
//! connects after an event was published has missed it permanently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{ChangeSet, Task, TaskId};

/// The single public broadcast topic carrying all task events.
pub const TASKS_CHANNEL: &str = "tasks";

/// Discriminates the three task event kinds, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A task was created.
    Created,
    /// A task was updated in place.
    Updated,
    /// A task was deleted.
    Deleted,
}

impl EventKind {
    /// The wire name for this event kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "TaskCreated",
            Self::Updated => "TaskUpdated",
            Self::Deleted => "TaskDeleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A domain event emitted as the immediate side effect of a task mutation.
///
/// Created/Updated carry the full post-mutation snapshot; Deleted carries
/// only the id and title because the row no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task was created.
    Created {
        /// Full snapshot of the new task.
        task: Task,
        /// Human-readable announcement.
        message: String,
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
    },
    /// A task was updated.
    Updated {
        /// Full post-mutation snapshot (authoritative, not a patch).
        task: Task,
        /// Fields that changed, with before/after values.
        changes: ChangeSet,
        /// Human-readable announcement.
        message: String,
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
    },
    /// A task was deleted.
    Deleted {
        /// Identifier of the deleted task.
        task_id: TaskId,
        /// Title captured before deletion.
        task_title: String,
        /// Human-readable announcement.
        message: String,
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Builds a `TaskCreated` event for a freshly stored task.
    #[must_use]
    pub fn created(task: Task) -> Self {
        Self::Created {
            task,
            message: "A new task has been created!".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `TaskUpdated` event carrying the post-mutation snapshot
    /// and the set of changed fields.
    #[must_use]
    pub fn updated(task: Task, changes: ChangeSet) -> Self {
        Self::Updated {
            task,
            changes,
            message: "A task has been updated!".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a `TaskDeleted` event from the id and title captured before
    /// the row was removed.
    #[must_use]
    pub fn deleted(task_id: TaskId, task_title: String) -> Self {
        Self::Deleted {
            task_id,
            task_title,
            message: "A task has been deleted!".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Created { .. } => EventKind::Created,
            Self::Updated { .. } => EventKind::Updated,
            Self::Deleted { .. } => EventKind::Deleted,
        }
    }

    /// The wire name used as the dispatch tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The broadcast channel this event is published on.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        TASKS_CHANNEL
    }
}

/// Errors from encoding or decoding an event envelope.
#[derive(Debug, thiserror::Error)]
pub enum EventCodecError {
    /// The event could not be serialized to JSON.
    #[error("event encode error: {0}")]
    Encode(String),
    /// The bytes were not a well-formed event envelope.
    #[error("malformed event envelope: {0}")]
    Malformed(String),
    /// The envelope carried an event name outside the closed set.
    #[error("unknown event tag: {0}")]
    UnknownEvent(String),
}

/// JSON envelope wrapping every event on the wire.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    event: String,
    data: serde_json::Value,
}

/// `TaskCreated` payload.
#[derive(Serialize, Deserialize)]
struct CreatedData {
    task: Task,
    message: String,
    timestamp: DateTime<Utc>,
}

/// `TaskUpdated` payload.
#[derive(Serialize, Deserialize)]
struct UpdatedData {
    task: Task,
    changes: ChangeSet,
    message: String,
    timestamp: DateTime<Utc>,
}

/// `TaskDeleted` payload.
#[derive(Serialize, Deserialize)]
struct DeletedData {
    task_id: TaskId,
    task_title: String,
    message: String,
    timestamp: DateTime<Utc>,
}

/// Encodes a [`TaskEvent`] into its JSON envelope bytes.
///
/// # Errors
///
/// Returns [`EventCodecError::Encode`] if serialization fails.
pub fn encode(event: &TaskEvent) -> Result<Vec<u8>, EventCodecError> {
    let data = match event {
        TaskEvent::Created {
            task,
            message,
            timestamp,
        } => serde_json::to_value(CreatedData {
            task: task.clone(),
            message: message.clone(),
            timestamp: *timestamp,
        }),
        TaskEvent::Updated {
            task,
            changes,
            message,
            timestamp,
        } => serde_json::to_value(UpdatedData {
            task: task.clone(),
            changes: changes.clone(),
            message: message.clone(),
            timestamp: *timestamp,
        }),
        TaskEvent::Deleted {
            task_id,
            task_title,
            message,
            timestamp,
        } => serde_json::to_value(DeletedData {
            task_id: *task_id,
            task_title: task_title.clone(),
            message: message.clone(),
            timestamp: *timestamp,
        }),
    }
    .map_err(|e| EventCodecError::Encode(e.to_string()))?;

    let envelope = WireEnvelope {
        event: event.name().to_string(),
        data,
    };
    serde_json::to_vec(&envelope).map_err(|e| EventCodecError::Encode(e.to_string()))
}

/// Decodes a [`TaskEvent`] from JSON envelope bytes.
///
/// Dispatches on the `event` tag. Tags outside the closed set are rejected
/// with [`EventCodecError::UnknownEvent`].
///
/// # Errors
///
/// Returns [`EventCodecError::Malformed`] for envelopes or payloads that do
/// not parse, and [`EventCodecError::UnknownEvent`] for unrecognized tags.
pub fn decode(bytes: &[u8]) -> Result<TaskEvent, EventCodecError> {
    let envelope: WireEnvelope =
        serde_json::from_slice(bytes).map_err(|e| EventCodecError::Malformed(e.to_string()))?;

    match envelope.event.as_str() {
        "TaskCreated" => {
            let data: CreatedData = serde_json::from_value(envelope.data)
                .map_err(|e| EventCodecError::Malformed(e.to_string()))?;
            Ok(TaskEvent::Created {
                task: data.task,
                message: data.message,
                timestamp: data.timestamp,
            })
        }
        "TaskUpdated" => {
            let data: UpdatedData = serde_json::from_value(envelope.data)
                .map_err(|e| EventCodecError::Malformed(e.to_string()))?;
            Ok(TaskEvent::Updated {
                task: data.task,
                changes: data.changes,
                message: data.message,
                timestamp: data.timestamp,
            })
        }
        "TaskDeleted" => {
            let data: DeletedData = serde_json::from_value(envelope.data)
                .map_err(|e| EventCodecError::Malformed(e.to_string()))?;
            Ok(TaskEvent::Deleted {
                task_id: data.task_id,
                task_title: data.task_title,
                message: data.message,
                timestamp: data.timestamp,
            })
        }
        other => Err(EventCodecError::UnknownEvent(other.to_string())),
    }
}
