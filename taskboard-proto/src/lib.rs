//! Shared domain and wire definitions for Taskboard.

pub mod action;
pub mod session;
pub mod task;
