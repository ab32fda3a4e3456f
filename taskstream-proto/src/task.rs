//! Task snapshot and change-set types for `TaskStream`.
//!
//! A [`Task`] is the server's authoritative view of one todo item. Update
//! events carry a [`ChangeSet`] alongside the full snapshot so clients can
//! render a description of what changed without diffing on their own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Server-assigned, immutable task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for the user that owns a task.
///
/// Issued by the auth collaborator; the core only uses it to scope task
/// operations to their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full task snapshot as stored by the server.
///
/// Owned exclusively by its creating user and mutated only through
/// owner-scoped operations. Timestamps serialize as ISO-8601 strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier, immutable for the task's lifetime.
    pub id: TaskId,
    /// Owning user.
    pub user_id: UserId,
    /// Short title, non-empty, at most [`MAX_TASK_TITLE_LENGTH`] characters.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Completion flag, toggled via owner-scoped operations.
    pub is_completed: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Before/after values for one changed field.
///
/// Values are JSON so heterogeneous field types (strings, booleans, nulls)
/// share one representation on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Value before the mutation.
    pub from: serde_json::Value,
    /// Value after the mutation.
    pub to: serde_json::Value,
}

/// Map of field name to its before/after values.
///
/// Contains only fields that were present in the update request and whose
/// value actually differs from the pre-mutation snapshot.
pub type ChangeSet = BTreeMap<String, FieldChange>;
