//! Client-side task list mirror.
//!
//! Holds the tasks the client currently believes exist, newest first.
//! Mutated by event reconciliation and by optimistic local updates after
//! direct service calls. Every `apply_*` operation is idempotent so a
//! duplicated event delivery converges to the same state.

use parking_lot::RwLock;
use taskstream_proto::task::{Task, TaskId};

/// In-memory, newest-first task list.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entire list, e.g. after an initial fetch.
    pub fn replace_all(&self, tasks: Vec<Task>) {
        *self.tasks.write() = tasks;
    }

    /// Applies a created event: prepends the task unless a task with the
    /// same id is already present. Returns `true` if the task was inserted.
    pub fn apply_created(&self, task: Task) -> bool {
        let mut tasks = self.tasks.write();
        if tasks.iter().any(|t| t.id == task.id) {
            return false;
        }
        tasks.insert(0, task);
        true
    }

    /// Applies an updated event: replaces the stored task with the event's
    /// full snapshot. Unknown ids are ignored. Returns `true` if a task
    /// was replaced.
    pub fn apply_updated(&self, task: &Task) -> bool {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                *slot = task.clone();
                true
            }
            None => false,
        }
    }

    /// Applies a deleted event: removes the task if present. Returns `true`
    /// if a task was removed.
    pub fn apply_deleted(&self, task_id: TaskId) -> bool {
        let mut tasks = self.tasks.write();
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        tasks.len() != before
    }

    /// Inserts or replaces a task, used for optimistic local updates.
    ///
    /// A new task is prepended; an existing one is replaced in place.
    pub fn upsert(&self, task: Task) {
        let mut tasks = self.tasks.write();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => tasks.insert(0, task),
        }
    }

    /// Returns the task with the given id, if present.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.read().iter().find(|t| t.id == task_id).cloned()
    }

    /// Whether a task with the given id is present.
    #[must_use]
    pub fn contains(&self, task_id: TaskId) -> bool {
        self.tasks.read().iter().any(|t| t.id == task_id)
    }

    /// Snapshot of all tasks in display order (newest first).
    #[must_use]
    pub fn all(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Snapshot of completed tasks, preserving display order.
    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.tasks
            .read()
            .iter()
            .filter(|t| t.is_completed)
            .cloned()
            .collect()
    }

    /// Snapshot of pending tasks, preserving display order.
    #[must_use]
    pub fn pending(&self) -> Vec<Task> {
        self.tasks
            .read()
            .iter()
            .filter(|t| !t.is_completed)
            .cloned()
            .collect()
    }

    /// Number of tasks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    /// Whether the store holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Number of completed tasks.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.tasks.read().iter().filter(|t| t.is_completed).count()
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.tasks.read().iter().filter(|t| !t.is_completed).count()
    }

    /// Removes every task.
    pub fn clear(&self) {
        self.tasks.write().clear();
    }
}
