//! Owner-scoped task operations.
//!
//! [`service::TaskService`] is the mutation authority: it validates input,
//! persists through a [`repository::TaskRepository`], and fires a domain
//! event after every successful mutation. Event publishing is best-effort;
//! a broadcast failure never fails the mutation.

pub mod repository;
pub mod service;

pub use repository::{InMemoryTaskRepository, NewTask, RepositoryError, TaskRepository, UpdateTask};
pub use service::TaskService;

use taskstream_proto::task::{MAX_TASK_TITLE_LENGTH, TaskId};

/// Errors from task operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The title was empty or all whitespace.
    #[error("task title must not be empty")]
    TitleEmpty,

    /// The title exceeded [`MAX_TASK_TITLE_LENGTH`] characters.
    #[error("task title exceeds {MAX_TASK_TITLE_LENGTH} characters")]
    TitleTooLong,

    /// No task with this id is owned by the requesting user.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// The underlying storage failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
