//! Dependency graph and scheduling for todo items.
//!
//! - [`graph`] holds the directed graph of todo ids with cycle detection and
//!   a deterministic topological order.
//! - [`schedule`] derives an earliest-start timestamp per todo from that order.
//!
//! Both are plain values rebuilt from the current todo set; nothing here
//! performs I/O.

pub mod graph;
pub mod schedule;

pub use graph::{DependencyGraph, GraphError, TodoId, TodoNode};
pub use schedule::Schedule;
