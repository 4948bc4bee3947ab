//! Task execution module
//!
//! This module runs a flow request: it snapshots the dependency graph,
//! schedules every task at most once, and runs each action on its own worker
//! thread.

pub mod dependencies;
pub mod runner;
pub mod worker;

pub use dependencies::{Graph, TaskSnapshot};
pub use runner::{scheduler_executor, ExecuteOptions};
pub use worker::action_runner;
