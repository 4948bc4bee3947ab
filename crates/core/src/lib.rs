//! Taskmill Core Library
//!
//! This is the core library of taskmill, a task runner whose tasks are plain
//! Rust closures. It provides the task registry, the scheduler, the action
//! runtime, the middleware pipelines and the output multiplexing that keeps
//! concurrent task output readable.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`flow`] - The caller-owned entry point tying everything together
//! - [`registry`] - Task definitions, name uniqueness and cycle detection
//! - [`tasks`] - Task builders, handles and actions
//! - [`execution`] - Dependency resolution, scheduling and worker threads
//! - [`context`] - The per-run handle given to task actions
//! - [`middleware`] - Runner and executor pipelines with built-in middlewares
//! - [`output`] - Thread-safe writers, buffers and stream recording
//! - [`configs`] - Configuration file parsing
//! - [`results`] - Result types for task runs
//! - [`types`] - Common error types and type aliases
//!
//! ## Usage
//!
//! ```rust
//! use taskmill_core::middleware::{report_flow, report_status};
//! use taskmill_core::{ActionContext, ExecuteOptions, Flow, TaskDef};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut flow = Flow::new();
//! flow.use_executor(report_flow);
//! flow.use_runner(report_status);
//!
//! let fmt = flow
//!     .define(TaskDef::new("fmt").action(|ctx: &ActionContext| ctx.log("formatted")))
//!     .unwrap();
//! flow.define(TaskDef::new("check").deps([fmt]).usage("Run all checks"))
//!     .unwrap();
//!
//! let result = flow.execute(&CancellationToken::new(), ["check"], ExecuteOptions::new());
//! assert!(result.is_ok());
//! ```

pub mod configs;
pub mod context;
pub mod execution;
pub mod flow;
pub mod middleware;
pub mod output;
pub mod registry;
pub mod results;
pub mod tasks;
pub mod types;

// Re-export the main types for easier usage
pub use context::ActionContext;
pub use execution::ExecuteOptions;
pub use flow::Flow;
pub use output::Output;
pub use registry::Registry;
pub use results::{RunResult, Status};
pub use tasks::{Action, Task, TaskDef, TaskHandle};
pub use types::{ExecuteError, RegistryError, TaskmillError, TaskmillResult};
