//! Taskboard server library.
//!
//! Exposes the task mutation service, the realtime board notifier and the
//! HTTP/websocket server for use in tests and embedding.

pub mod actions;
pub mod api;
pub mod balancer;
pub mod config;
pub mod conflict;
pub mod notifier;
pub mod server;
pub mod service;
pub mod store;
pub mod users;
