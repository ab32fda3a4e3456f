//! Shared protocol definitions for the `TaskStream` wire format.

pub mod event;
pub mod hub;
pub mod task;
