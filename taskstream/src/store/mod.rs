//! Client-local state stores.
//!
//! [`TaskStore`] mirrors the server's task list as events arrive;
//! [`NotificationStore`] holds the capped in-memory notification feed.
//! Both are synchronous and lock-based so event reconciliation can update
//! them from any task without awaiting.

mod notifications;
mod tasks;

pub use notifications::{MAX_NOTIFICATIONS, Notification, NotificationStore, Severity};
pub use tasks::TaskStore;
