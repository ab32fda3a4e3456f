//! Task mutation service.
//!
//! The service is the only code path that mutates tasks. Every successful
//! mutation fires exactly one domain event through the configured
//! [`EventPublisher`] as its immediate side effect. Broadcast failures are
//! logged and swallowed: the mutation's outcome never depends on whether
//! the event made it out.

use std::sync::Arc;

use serde_json::json;
use taskstream_proto::event::TaskEvent;
use taskstream_proto::task::{ChangeSet, FieldChange, MAX_TASK_TITLE_LENGTH, Task, TaskId, UserId};

use crate::realtime::publisher::EventPublisher;

use super::repository::{NewTask, TaskRepository, UpdateTask};
use super::TaskError;

/// Owner-scoped task CRUD with post-mutation event publishing.
pub struct TaskService<R, P> {
    repository: Arc<R>,
    publisher: Arc<P>,
}

impl<R: TaskRepository, P: EventPublisher> TaskService<R, P> {
    /// Creates a service over the given repository and publisher.
    pub fn new(repository: Arc<R>, publisher: Arc<P>) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// Creates a task for the user and fires `TaskCreated`.
    ///
    /// New tasks always start pending regardless of caller input.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::TitleEmpty`] or [`TaskError::TitleTooLong`] on
    /// invalid titles, or a repository error.
    pub async fn create_task(
        &self,
        user_id: UserId,
        title: &str,
        description: Option<String>,
    ) -> Result<Task, TaskError> {
        let title = normalize_title(title)?;

        let task = self
            .repository
            .create(NewTask {
                user_id,
                title,
                description,
                is_completed: false,
            })
            .await?;

        tracing::info!(task_id = %task.id, user_id = %user_id, "task created");
        self.fire_event(TaskEvent::created(task.clone())).await;
        Ok(task)
    }

    /// Applies a partial update to a task the user owns and fires
    /// `TaskUpdated` carrying the changed fields.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist or is
    /// owned by someone else, title validation errors, or a repository
    /// error.
    pub async fn update_task(
        &self,
        user_id: UserId,
        task_id: TaskId,
        mut update: UpdateTask,
    ) -> Result<Task, TaskError> {
        let before = self
            .repository
            .get_by_id_and_user(task_id, user_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        if let Some(title) = update.title.take() {
            update.title = Some(normalize_title(&title)?);
        }

        let changes = compute_changes(&before, &update);

        let task = self
            .repository
            .update(task_id, update)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        tracing::info!(
            task_id = %task.id,
            user_id = %user_id,
            changed = changes.len(),
            "task updated"
        );
        self.fire_event(TaskEvent::updated(task.clone(), changes)).await;
        Ok(task)
    }

    /// Flips a task's completion flag and fires `TaskUpdated` with the
    /// `is_completed` change.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist or is
    /// owned by someone else, or a repository error.
    pub async fn toggle_completion(
        &self,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<Task, TaskError> {
        let before = self
            .repository
            .get_by_id_and_user(task_id, user_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        let update = UpdateTask {
            is_completed: Some(!before.is_completed),
            ..Default::default()
        };
        let changes = compute_changes(&before, &update);

        let task = self
            .repository
            .update(task_id, update)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        tracing::info!(
            task_id = %task.id,
            user_id = %user_id,
            is_completed = task.is_completed,
            "task completion toggled"
        );
        self.fire_event(TaskEvent::updated(task.clone(), changes)).await;
        Ok(task)
    }

    /// Deletes a task the user owns and fires `TaskDeleted` with the id
    /// and title captured before removal.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist or is
    /// owned by someone else, or a repository error.
    pub async fn delete_task(&self, user_id: UserId, task_id: TaskId) -> Result<(), TaskError> {
        let task = self
            .repository
            .get_by_id_and_user(task_id, user_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        // Capture before the row disappears.
        let title = task.title.clone();

        self.repository
            .delete(task_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))?;

        tracing::info!(task_id = %task_id, user_id = %user_id, "task deleted");
        self.fire_event(TaskEvent::deleted(task_id, title)).await;
        Ok(())
    }

    /// Every task the user owns, newest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn list_tasks(&self, user_id: UserId) -> Result<Vec<Task>, TaskError> {
        Ok(self.repository.get_by_user(user_id).await?)
    }

    /// Completed tasks the user owns, newest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn completed_tasks(&self, user_id: UserId) -> Result<Vec<Task>, TaskError> {
        Ok(self.repository.get_completed_by_user(user_id).await?)
    }

    /// Pending tasks the user owns, newest first.
    ///
    /// # Errors
    ///
    /// Returns a repository error.
    pub async fn pending_tasks(&self, user_id: UserId) -> Result<Vec<Task>, TaskError> {
        Ok(self.repository.get_pending_by_user(user_id).await?)
    }

    /// One task by id, if the user owns it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if the task does not exist or is
    /// owned by someone else, or a repository error.
    pub async fn get_task(&self, user_id: UserId, task_id: TaskId) -> Result<Task, TaskError> {
        self.repository
            .get_by_id_and_user(task_id, user_id)
            .await?
            .ok_or(TaskError::NotFound(task_id))
    }

    /// Publishes an event, swallowing failures. The mutation already
    /// succeeded; observers just miss this one.
    async fn fire_event(&self, event: TaskEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(event = event.name(), err = %e, "event broadcast failed, continuing");
        }
    }
}

/// Validates and trims a title.
fn normalize_title(title: &str) -> Result<String, TaskError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if trimmed.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    Ok(trimmed.to_string())
}

/// Builds the change set: one entry per field that was supplied in the
/// update and actually differs from the pre-mutation snapshot.
fn compute_changes(before: &Task, update: &UpdateTask) -> ChangeSet {
    let mut changes = ChangeSet::new();

    if let Some(title) = &update.title
        && *title != before.title
    {
        changes.insert("title".to_string(), FieldChange {
            from: json!(before.title),
            to: json!(title),
        });
    }
    if let Some(description) = &update.description
        && *description != before.description
    {
        changes.insert("description".to_string(), FieldChange {
            from: json!(before.description),
            to: json!(description),
        });
    }
    if let Some(is_completed) = update.is_completed
        && is_completed != before.is_completed
    {
        changes.insert("is_completed".to_string(), FieldChange {
            from: json!(before.is_completed),
            to: json!(is_completed),
        });
    }

    changes
}
