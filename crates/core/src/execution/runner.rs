//! Flow scheduler
//!
//! This module provides the base executor of the executor pipeline. It walks
//! the requested tasks depth first, runs each task at most once, launches
//! parallel tasks on scoped threads and joins every worker before returning.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Scope};

use tracing::{debug, warn};

use crate::execution::dependencies::{Graph, TaskSnapshot};
use crate::execution::worker::action_runner;
use crate::middleware::{Chain, ExecuteInput, Executor, Input, Runner};
use crate::results::{PanicReport, Status};
use crate::types::ExecuteError;

/// Options of a flow execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Run only the requested tasks, ignoring their dependencies.
    pub no_deps: bool,
    /// Tasks whose action must not run.
    pub skip: Vec<String>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_deps(mut self) -> Self {
        self.no_deps = true;
        self
    }

    pub fn skip<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Final state of a task within one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished(Status),
    Skipped,
    Blocked,
    Canceled,
}

impl Outcome {
    fn blocks_dependents(self) -> bool {
        matches!(
            self,
            Outcome::Finished(Status::Failed) | Outcome::Blocked | Outcome::Canceled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Queued,
    Running,
    Done(Outcome),
}

#[derive(Default)]
struct RunState {
    slots: HashMap<String, Slot>,
    first_failure: Option<String>,
    canceled: bool,
}

/// Build the executor that schedules a request over `graph`, running every
/// task through the runner `chain`.
pub fn scheduler_executor(graph: Arc<Graph>, chain: Chain<Runner>) -> Executor {
    Arc::new(move |input: ExecuteInput| {
        graph.validate(&input.tasks)?;
        let scheduler = Scheduler::new(&graph, &chain, &input);
        scheduler.run();
        scheduler.verdict()
    })
}

struct Scheduler<'a> {
    graph: &'a Graph,
    chain: &'a Chain<Runner>,
    input: &'a ExecuteInput,
    skip: HashSet<&'a str>,
    state: Mutex<RunState>,
    changed: Condvar,
}

impl<'a> Scheduler<'a> {
    fn new(graph: &'a Graph, chain: &'a Chain<Runner>, input: &'a ExecuteInput) -> Self {
        Self {
            graph,
            chain,
            input,
            skip: input.options.skip.iter().map(String::as_str).collect(),
            state: Mutex::new(RunState::default()),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self) {
        thread::scope(|scope| {
            for name in &self.input.tasks {
                self.visit(scope, name);
            }
        });
    }

    fn verdict(&self) -> Result<(), ExecuteError> {
        let state = self.lock();
        let interrupted = self.input.cancel.is_cancelled() && state.first_failure.is_some();
        if state.canceled || interrupted {
            return Err(ExecuteError::Canceled);
        }
        match &state.first_failure {
            Some(name) => Err(ExecuteError::TaskFailed(name.clone())),
            None => Ok(()),
        }
    }

    /// Claim `name` for this execution, expand its dependencies and start it.
    /// Only the calling thread visits; parallel tasks are handed to `scope`.
    fn visit<'scope>(&'scope self, scope: &'scope Scope<'scope, '_>, name: &str) {
        if !self.claim(name) {
            return;
        }
        let Some(task) = self.graph.get(name) else {
            return;
        };
        if !self.input.options.no_deps {
            for dep in &task.dependencies {
                self.visit(scope, dep);
            }
        }

        if task.parallel {
            scope.spawn(move || self.start(task));
        } else {
            self.start(task);
        }
    }

    fn claim(&self, name: &str) -> bool {
        let mut state = self.lock();
        if state.slots.contains_key(name) {
            return false;
        }
        state.slots.insert(name.to_string(), Slot::Queued);
        true
    }

    fn start(&self, task: &TaskSnapshot) {
        let name = task.name.as_str();
        let outcome = if let Some(blocker) = self.wait_for_dependencies(task) {
            debug!(task = %name, dependency = %blocker, "not started: dependency did not pass");
            Outcome::Blocked
        } else if self.skip.contains(name) {
            debug!(task = %name, "skipped on request");
            Outcome::Skipped
        } else if self.input.cancel.is_cancelled() {
            debug!(task = %name, "not started: execution canceled");
            Outcome::Canceled
        } else {
            self.set_slot(name, Slot::Running);
            Outcome::Finished(self.run_task(task))
        };
        self.finish(name, outcome);
    }

    /// Block until every dependency is done. Returns the first dependency
    /// that prevents the task from starting.
    fn wait_for_dependencies(&self, task: &TaskSnapshot) -> Option<String> {
        if self.input.options.no_deps {
            return None;
        }
        let mut state = self.lock();
        loop {
            let mut pending = false;
            for dep in &task.dependencies {
                match state.slots.get(dep) {
                    Some(Slot::Done(outcome)) if outcome.blocks_dependents() => {
                        return Some(dep.clone());
                    }
                    Some(Slot::Done(_)) => {}
                    _ => pending = true,
                }
            }
            if !pending {
                return None;
            }
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn run_task(&self, task: &TaskSnapshot) -> Status {
        debug!(task = %task.name, parallel = task.parallel, "starting task");
        let runner = self.chain.wrap(action_runner(task.action.clone()));
        let input = Input {
            task_name: task.name.clone(),
            parallel: task.parallel,
            cancel: self.input.cancel.clone(),
            output: self.input.output.clone(),
            messages: self.input.messages.clone(),
        };

        let status = match panic::catch_unwind(AssertUnwindSafe(|| runner(input))) {
            Ok(result) => result.status,
            Err(payload) => {
                let report = PanicReport::from_payload(payload.as_ref(), "");
                warn!(task = %task.name, %report, "runner middleware panicked");
                Status::Failed
            }
        };
        debug!(task = %task.name, %status, "finished task");
        status
    }

    fn set_slot(&self, name: &str, slot: Slot) {
        self.lock().slots.insert(name.to_string(), slot);
    }

    fn finish(&self, name: &str, outcome: Outcome) {
        {
            let mut state = self.lock();
            match outcome {
                Outcome::Finished(Status::Failed) => {
                    state.first_failure.get_or_insert_with(|| name.to_string());
                }
                Outcome::Canceled => state.canceled = true,
                _ => {}
            }
            state.slots.insert(name.to_string(), Slot::Done(outcome));
        }
        self.changed.notify_all();
    }
}
