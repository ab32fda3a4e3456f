//! `TaskStream` client library.
//!
//! A todo-list core whose centerpiece is the real-time pipeline: task
//! mutations fire domain events through a publisher, the broadcast hub fans
//! them out, and every connected client reconciles them into its local task
//! and notification stores.
//!
//! Module map:
//! - [`tasks`]: owner-scoped task CRUD service and repository.
//! - [`realtime`]: hub connection lifecycle, subscriptions, reconciliation.
//! - [`store`]: client-local task and notification stores.
//! - [`config`]: layered client configuration.

pub mod config;
pub mod realtime;
pub mod store;
pub mod tasks;
