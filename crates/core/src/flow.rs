//! Flow
//!
//! A [`Flow`] ties a task registry to the two middleware chains and the
//! output sinks. It is an ordinary value owned by the caller; nothing in the
//! engine keeps global state about registered tasks.
//!
//! ```rust
//! use taskmill_core::{ActionContext, ExecuteOptions, Flow, TaskDef};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut flow = Flow::new();
//! let build = flow
//!     .define(TaskDef::new("build").action(|ctx: &ActionContext| ctx.log("building")))
//!     .unwrap();
//! flow.define(TaskDef::new("test").deps([build])).unwrap();
//!
//! flow.execute(&CancellationToken::new(), ["test"], ExecuteOptions::new())
//!     .unwrap();
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::execution::{scheduler_executor, ExecuteOptions, Graph};
use crate::middleware::{Chain, ExecuteInput, Executor, Runner};
use crate::output::Output;
use crate::registry::Registry;
use crate::tasks::{TaskDef, TaskHandle};
use crate::types::{ExecuteError, RegistryError};

pub struct Flow {
    registry: Registry,
    runners: Chain<Runner>,
    executors: Chain<Executor>,
    output: Output,
    messages: Output,
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl Flow {
    /// A flow writing both task output and reports to stdout.
    pub fn new() -> Self {
        let stdout = Output::stdout();
        Self {
            registry: Registry::new(),
            runners: Chain::new(),
            executors: Chain::new(),
            output: stdout.clone(),
            messages: stdout,
        }
    }

    /// Register a task.
    pub fn define(&mut self, def: TaskDef) -> Result<TaskHandle, RegistryError> {
        self.registry.register(def)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Add a runner middleware. Middlewares added first wrap those added later.
    pub fn use_runner<M>(&mut self, middleware: M)
    where
        M: Fn(Runner) -> Runner + Send + Sync + 'static,
    {
        self.runners.push(Arc::new(middleware));
    }

    /// Add an executor middleware. Middlewares added first wrap those added
    /// later.
    pub fn use_executor<M>(&mut self, middleware: M)
    where
        M: Fn(Executor) -> Executor + Send + Sync + 'static,
    {
        self.executors.push(Arc::new(middleware));
    }

    /// Sink for task output.
    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }

    /// Sink for status and report lines.
    pub fn set_messages(&mut self, messages: Output) {
        self.messages = messages;
    }

    /// Run the requested tasks and their dependencies.
    ///
    /// Blocks until every started task has finished. The registry is
    /// snapshotted first, so the flow can be reconfigured between calls.
    pub fn execute<I, S>(
        &self,
        cancel: &CancellationToken,
        tasks: I,
        options: ExecuteOptions,
    ) -> Result<(), ExecuteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<String> = tasks.into_iter().map(Into::into).collect();
        let graph = Arc::new(Graph::snapshot(&self.registry));
        graph.validate(&tasks)?;

        let executor = self
            .executors
            .wrap(scheduler_executor(graph, self.runners.clone()));
        executor(ExecuteInput {
            cancel: cancel.clone(),
            tasks,
            options,
            output: self.output.clone(),
            messages: self.messages.clone(),
        })
    }

    /// Order in which [`execute`](Self::execute) would resolve the request.
    pub fn plan<I, S>(&self, tasks: I, options: &ExecuteOptions) -> Result<Vec<String>, ExecuteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks: Vec<String> = tasks.into_iter().map(Into::into).collect();
        Graph::snapshot(&self.registry).plan(&tasks, options.no_deps)
    }
}
