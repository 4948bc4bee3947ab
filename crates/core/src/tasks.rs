//! Task definitions
//!
//! A [`TaskDef`] describes a task before registration; the registry stores it
//! as a [`Task`] and hands back a [`TaskHandle`] that other tasks of the same
//! registry can depend on.

use std::fmt;
use std::sync::Arc;

use crate::context::ActionContext;

/// Executable body of a task.
pub type Action = Arc<dyn Fn(&ActionContext) + Send + Sync>;

/// Opaque reference to a task registered in a specific registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    pub(crate) registry: u64,
    pub(crate) index: usize,
}

/// Builder describing a task to register.
#[derive(Clone, Default)]
pub struct TaskDef {
    pub(crate) name: String,
    pub(crate) usage: String,
    pub(crate) action: Option<Action>,
    pub(crate) dependencies: Vec<TaskHandle>,
    pub(crate) parallel: bool,
}

impl TaskDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// One-line description shown in task listings.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn action<F>(mut self, action: F) -> Self
    where
        F: Fn(&ActionContext) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    pub fn deps(mut self, dependencies: impl IntoIterator<Item = TaskHandle>) -> Self {
        self.dependencies = dependencies.into_iter().collect();
        self
    }

    /// Allow the task to run concurrently with unrelated ready tasks.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("usage", &self.usage)
            .field("has_action", &self.action.is_some())
            .field("dependencies", &self.dependencies)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// A registered task.
#[derive(Clone)]
pub struct Task {
    pub(crate) name: String,
    pub(crate) usage: String,
    pub(crate) action: Option<Action>,
    pub(crate) dependencies: Vec<TaskHandle>,
    pub(crate) parallel: bool,
}

impl Task {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }

    pub fn dependencies(&self) -> &[TaskHandle] {
        &self.dependencies
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }
}

impl From<TaskDef> for Task {
    fn from(def: TaskDef) -> Self {
        Self {
            name: def.name,
            usage: def.usage,
            action: def.action,
            dependencies: def.dependencies,
            parallel: def.parallel,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("has_action", &self.action.is_some())
            .field("dependencies", &self.dependencies)
            .field("parallel", &self.parallel)
            .finish()
    }
}
