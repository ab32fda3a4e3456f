//! `TaskStream` broadcast hub library.
//!
//! Exposes the hub server for use in tests and embedding. The hub accepts
//! WebSocket connections, tracks channel subscriptions, and fans published
//! payloads out to every current subscriber.

pub mod config;
pub mod hub;
