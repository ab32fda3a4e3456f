//! Capped in-memory notification feed.
//!
//! Notifications are ephemeral and purely client-local. The feed keeps the
//! newest [`MAX_NOTIFICATIONS`] entries, newest first, evicting the oldest
//! when the cap is reached.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

/// Maximum number of notifications retained in the feed.
pub const MAX_NOTIFICATIONS: usize = 50;

/// Visual severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Positive outcome (e.g. task created).
    Success,
    /// Something went wrong.
    Error,
    /// Neutral information (e.g. task updated).
    Info,
    /// Attention-worthy change (e.g. task deleted).
    Warning,
}

/// A single notification entry.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Unique, time-ordered identifier.
    pub id: Uuid,
    /// Visual severity.
    pub severity: Severity,
    /// Short heading.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// When the notification was pushed.
    pub timestamp: DateTime<Utc>,
    /// Whether the user has seen it.
    pub read: bool,
    /// Optional structured payload carried alongside the text.
    pub payload: Option<serde_json::Value>,
}

/// Newest-first notification feed, capped at [`MAX_NOTIFICATIONS`].
#[derive(Debug, Default)]
pub struct NotificationStore {
    entries: RwLock<VecDeque<Notification>>,
}

impl NotificationStore {
    /// Creates an empty feed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a notification onto the front of the feed, evicting the
    /// oldest entry when the cap is exceeded. Returns the new entry's id.
    pub fn push(
        &self,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> Uuid {
        let notification = Notification {
            id: Uuid::now_v7(),
            severity,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            read: false,
            payload,
        };
        let id = notification.id;

        let mut entries = self.entries.write();
        entries.push_front(notification);
        while entries.len() > MAX_NOTIFICATIONS {
            entries.pop_back();
        }
        id
    }

    /// Pushes a success notification.
    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(Severity::Success, title, message, None)
    }

    /// Pushes an error notification.
    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(Severity::Error, title, message, None)
    }

    /// Pushes an info notification.
    pub fn info(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(Severity::Info, title, message, None)
    }

    /// Pushes a warning notification.
    pub fn warning(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(Severity::Warning, title, message, None)
    }

    /// Marks one notification as read. Unknown ids are ignored.
    pub fn mark_read(&self, id: Uuid) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|n| n.id == id) {
            entry.read = true;
        }
    }

    /// Marks every notification as read.
    pub fn mark_all_read(&self) {
        let mut entries = self.entries.write();
        for entry in entries.iter_mut() {
            entry.read = true;
        }
    }

    /// Removes one notification. Unknown ids are ignored.
    pub fn remove(&self, id: Uuid) {
        self.entries.write().retain(|n| n.id != id);
    }

    /// Removes every notification.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Removes notifications already marked read.
    pub fn clear_read(&self) {
        self.entries.write().retain(|n| !n.read);
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.entries.read().iter().filter(|n| !n.read).count()
    }

    /// Number of notifications in the feed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the feed is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the feed, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Notification> {
        self.entries.read().iter().cloned().collect()
    }
}
