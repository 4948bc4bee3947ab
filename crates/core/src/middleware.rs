//! Middleware pipelines
//!
//! Two independent decorator chains wrap execution:
//!
//! - runner middlewares wrap a single task run (`Input -> RunResult`)
//! - executor middlewares wrap a whole flow execution
//!   (`ExecuteInput -> Result<(), ExecuteError>`)
//!
//! Chains are composed once, when a middleware is added. The first
//! middleware added is the outermost one.

pub mod buffer;
pub mod filter;
pub mod report;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::execution::ExecuteOptions;
use crate::output::Output;
use crate::results::RunResult;
use crate::types::ExecuteError;

pub use buffer::{buffer_parallel, silent_non_failing};
pub use filter::{dry_run, no_run};
pub use report::{report_flow, report_long_run, report_status};

/// Everything a runner needs to run one task.
#[derive(Debug, Clone)]
pub struct Input {
    pub task_name: String,
    pub parallel: bool,
    pub cancel: CancellationToken,
    /// Standard stream; this is what the action writes to.
    pub output: Output,
    /// Messaging stream for status and report lines.
    pub messages: Output,
}

/// Runs one task.
pub type Runner = Arc<dyn Fn(Input) -> RunResult + Send + Sync>;

/// Decorates a [`Runner`].
pub type RunnerMiddleware = Arc<dyn Fn(Runner) -> Runner + Send + Sync>;

/// A whole flow execution request.
#[derive(Debug, Clone)]
pub struct ExecuteInput {
    pub cancel: CancellationToken,
    pub tasks: Vec<String>,
    pub options: ExecuteOptions,
    pub output: Output,
    pub messages: Output,
}

/// Runs a whole flow execution.
pub type Executor = Arc<dyn Fn(ExecuteInput) -> Result<(), ExecuteError> + Send + Sync>;

/// Decorates an [`Executor`].
pub type ExecutorMiddleware = Arc<dyn Fn(Executor) -> Executor + Send + Sync>;

/// Ordered composition of middlewares of one kind.
pub struct Chain<T> {
    compose: Option<Arc<dyn Fn(T) -> T + Send + Sync>>,
}

impl<T: 'static> Chain<T> {
    pub fn new() -> Self {
        Self { compose: None }
    }

    /// Add a middleware inside every middleware added before it.
    pub fn push(&mut self, middleware: Arc<dyn Fn(T) -> T + Send + Sync>) {
        self.compose = Some(match self.compose.take() {
            None => middleware,
            Some(outer) => Arc::new(move |next: T| outer(middleware(next))),
        });
    }

    /// Wrap `base` with every middleware of the chain.
    pub fn wrap(&self, base: T) -> T {
        match &self.compose {
            Some(compose) => compose(base),
            None => base,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.compose.is_none()
    }
}

impl<T: 'static> Default for Chain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Chain<T> {
    fn clone(&self) -> Self {
        Self {
            compose: self.compose.clone(),
        }
    }
}
