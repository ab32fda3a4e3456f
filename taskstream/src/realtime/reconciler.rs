//! Applies incoming task events to the local stores.
//!
//! Each event mutates the [`TaskStore`] idempotently and pushes exactly one
//! notification describing the change. Because store mutations converge
//! under duplicate delivery and the hub may redeliver, a repeated event
//! leaves the task list unchanged (though it does produce another
//! notification, matching the at-least-once feed semantics).

use std::sync::Arc;

use taskstream_proto::event::{EventKind, TaskEvent};
use taskstream_proto::task::{ChangeSet, Task, TaskId};

use crate::store::{NotificationStore, Severity, TaskStore};

use super::subscriptions::ChannelHandle;

/// Bridges decoded task events into the local task list and notification
/// feed.
pub struct EventReconciler {
    tasks: Arc<TaskStore>,
    notifications: Arc<NotificationStore>,
}

impl EventReconciler {
    /// Creates a reconciler over the given stores.
    #[must_use]
    pub fn new(tasks: Arc<TaskStore>, notifications: Arc<NotificationStore>) -> Self {
        Self {
            tasks,
            notifications,
        }
    }

    /// Applies one event: mutate the task store, then push one
    /// notification.
    pub fn apply(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Created { task, .. } => self.apply_created(task),
            TaskEvent::Updated { task, changes, .. } => self.apply_updated(task, changes),
            TaskEvent::Deleted {
                task_id,
                task_title,
                ..
            } => self.apply_deleted(*task_id, task_title),
        }
    }

    /// Binds this reconciler's three event handlers onto a channel.
    pub fn bind(self: &Arc<Self>, handle: &ChannelHandle) {
        for kind in [EventKind::Created, EventKind::Updated, EventKind::Deleted] {
            let reconciler = Arc::clone(self);
            handle.on(kind, Arc::new(move |event| reconciler.apply(event)));
        }
    }

    fn apply_created(&self, task: &Task) {
        let inserted = self.tasks.apply_created(task.clone());
        if !inserted {
            tracing::debug!(task_id = %task.id, "created event for known task, list unchanged");
        }
        self.notifications.push(
            Severity::Success,
            "New Task Created",
            format!("Task \"{}\" has been created successfully!", task.title),
            Some(serde_json::json!({ "task": task })),
        );
    }

    fn apply_updated(&self, task: &Task, changes: &ChangeSet) {
        let replaced = self.tasks.apply_updated(task);
        if !replaced {
            tracing::debug!(task_id = %task.id, "updated event for unknown task, list unchanged");
        }
        self.notifications.push(
            Severity::Info,
            "Task Updated",
            update_message(task, changes),
            Some(serde_json::json!({ "task": task, "changes": changes })),
        );
    }

    fn apply_deleted(&self, task_id: TaskId, task_title: &str) {
        let removed = self.tasks.apply_deleted(task_id);
        if !removed {
            tracing::debug!(task_id = %task_id, "deleted event for unknown task, list unchanged");
        }
        self.notifications.push(
            Severity::Warning,
            "Task Deleted",
            format!("Task \"{task_title}\" has been deleted!"),
            Some(serde_json::json!({ "task_id": task_id, "task_title": task_title })),
        );
    }
}

/// Builds the update notification body from the change set.
///
/// Completion changes take precedence over title changes; anything else
/// falls back to a generic message.
fn update_message(task: &Task, changes: &ChangeSet) -> String {
    if let Some(change) = changes.get("is_completed") {
        return if change.to.as_bool() == Some(true) {
            format!("Task \"{}\" has been completed!", task.title)
        } else {
            format!("Task \"{}\" has been marked as pending!", task.title)
        };
    }
    if let Some(change) = changes.get("title") {
        return format!(
            "Task title updated from \"{}\" to \"{}\"!",
            value_text(&change.from),
            value_text(&change.to)
        );
    }
    format!("Task \"{}\" has been updated!", task.title)
}

/// Renders a change-set value for display without JSON quoting.
fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
