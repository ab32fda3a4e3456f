//! Task persistence seam.
//!
//! [`TaskRepository`] abstracts storage so the service can be tested
//! against the in-memory implementation and later backed by a database.
//! All read and write operations are owner-scoped: a task is only visible
//! to, and mutable by, the user that created it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use taskstream_proto::task::{Task, TaskId, UserId};

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fields for creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Owning user.
    pub user_id: UserId,
    /// Validated title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Initial completion flag.
    pub is_completed: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    /// New title, if changing.
    pub title: Option<String>,
    /// New description, if changing; `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// New completion flag, if changing.
    pub is_completed: Option<bool>,
}

/// Owner-scoped task storage.
pub trait TaskRepository: Send + Sync {
    /// Persists a new task, assigning its id and timestamps.
    fn create(
        &self,
        new_task: NewTask,
    ) -> impl std::future::Future<Output = Result<Task, RepositoryError>> + Send;

    /// Applies a partial update to an existing task, bumping `updated_at`.
    fn update(
        &self,
        task_id: TaskId,
        update: UpdateTask,
    ) -> impl std::future::Future<Output = Result<Option<Task>, RepositoryError>> + Send;

    /// Removes a task. Returns the removed task if it existed.
    fn delete(
        &self,
        task_id: TaskId,
    ) -> impl std::future::Future<Output = Result<Option<Task>, RepositoryError>> + Send;

    /// One task by id, only if owned by the given user.
    fn get_by_id_and_user(
        &self,
        task_id: TaskId,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Option<Task>, RepositoryError>> + Send;

    /// Every task owned by the user, newest first.
    fn get_by_user(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RepositoryError>> + Send;

    /// Completed tasks owned by the user, newest first.
    fn get_completed_by_user(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RepositoryError>> + Send;

    /// Pending tasks owned by the user, newest first.
    fn get_pending_by_user(
        &self,
        user_id: UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, RepositoryError>> + Send;
}

/// Lock-based in-memory repository.
#[derive(Debug, Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<TaskId, Task>>,
    next_id: AtomicU64,
}

impl InMemoryTaskRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Tasks for one user sorted newest first (by id, since ids are
    /// monotonic).
    fn user_tasks_sorted(&self, user_id: UserId, filter: impl Fn(&Task) -> bool) -> Vec<Task> {
        let tasks = self.tasks.read();
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| t.user_id == user_id && filter(t))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.id.cmp(&a.id));
        result
    }
}

impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, new_task: NewTask) -> Result<Task, RepositoryError> {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        let task = Task {
            id,
            user_id: new_task.user_id,
            title: new_task.title,
            description: new_task.description,
            is_completed: new_task.is_completed,
            created_at: now,
            updated_at: now,
        };
        self.tasks.write().insert(id, task.clone());
        Ok(task)
    }

    async fn update(
        &self,
        task_id: TaskId,
        update: UpdateTask,
    ) -> Result<Option<Task>, RepositoryError> {
        let mut tasks = self.tasks.write();
        let Some(task) = tasks.get_mut(&task_id) else {
            return Ok(None);
        };
        if let Some(title) = update.title {
            task.title = title;
        }
        if let Some(description) = update.description {
            task.description = description;
        }
        if let Some(is_completed) = update.is_completed {
            task.is_completed = is_completed;
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn delete(&self, task_id: TaskId) -> Result<Option<Task>, RepositoryError> {
        Ok(self.tasks.write().remove(&task_id))
    }

    async fn get_by_id_and_user(
        &self,
        task_id: TaskId,
        user_id: UserId,
    ) -> Result<Option<Task>, RepositoryError> {
        let tasks = self.tasks.read();
        Ok(tasks
            .get(&task_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn get_by_user(&self, user_id: UserId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.user_tasks_sorted(user_id, |_| true))
    }

    async fn get_completed_by_user(&self, user_id: UserId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.user_tasks_sorted(user_id, |t| t.is_completed))
    }

    async fn get_pending_by_user(&self, user_id: UserId) -> Result<Vec<Task>, RepositoryError> {
        Ok(self.user_tasks_sorted(user_id, |t| !t.is_completed))
    }
}
