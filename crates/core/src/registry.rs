//! Task registry
//!
//! The registry owns every task definition of a flow. It guarantees that task
//! names are unique, that dependencies only point at tasks of the same
//! registry, and that the dependency graph stays acyclic. Every mutation that
//! touches the graph is validated against a candidate graph first and only
//! committed when the whole candidate is valid.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::tasks::{Action, Task, TaskDef, TaskHandle};
use crate::types::RegistryError;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Collection of named tasks and their dependency edges.
///
/// Not safe for concurrent mutation; all mutating methods take `&mut self`.
#[derive(Debug)]
pub struct Registry {
    id: u64,
    slots: Vec<Option<Task>>,
    names: HashMap<String, usize>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            slots: Vec::new(),
            names: HashMap::new(),
        }
    }

    /// Register a task and return its handle.
    pub fn register(&mut self, def: TaskDef) -> Result<TaskHandle, RegistryError> {
        if def.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.names.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName(def.name));
        }
        self.check_handles(&def.name, &def.dependencies)?;

        let index = self.slots.len();
        let name = def.name.clone();
        self.slots.push(Some(Task::from(def)));
        self.names.insert(name.clone(), index);
        debug!(task = %name, "registered task");

        Ok(self.handle(index))
    }

    /// Replace the dependencies of a task.
    pub fn set_dependencies(
        &mut self,
        handle: TaskHandle,
        dependencies: impl IntoIterator<Item = TaskHandle>,
    ) -> Result<(), RegistryError> {
        let dependencies: Vec<TaskHandle> = dependencies.into_iter().collect();
        let name = self.task(handle)?.name.clone();
        self.check_handles(&name, &dependencies)?;
        self.check_acyclic(Some((handle.index, dependencies.as_slice())), None)?;

        self.task_mut(handle)?.dependencies = dependencies;
        Ok(())
    }

    /// Rename a task. Dependents keep pointing at it through its handle.
    pub fn set_name(
        &mut self,
        handle: TaskHandle,
        name: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let old = self.task(handle)?.name.clone();
        if old == name {
            return Ok(());
        }
        if self.names.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        self.names.remove(&old);
        self.names.insert(name.clone(), handle.index);
        self.task_mut(handle)?.name = name;
        Ok(())
    }

    pub fn set_usage(
        &mut self,
        handle: TaskHandle,
        usage: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.task_mut(handle)?.usage = usage.into();
        Ok(())
    }

    pub fn set_parallel(&mut self, handle: TaskHandle, parallel: bool) -> Result<(), RegistryError> {
        self.task_mut(handle)?.parallel = parallel;
        Ok(())
    }

    pub fn set_action(
        &mut self,
        handle: TaskHandle,
        action: Option<Action>,
    ) -> Result<(), RegistryError> {
        self.task_mut(handle)?.action = action;
        Ok(())
    }

    /// Remove a task, pruning it from the dependency list of every other task.
    pub fn remove(&mut self, handle: TaskHandle) -> Result<Task, RegistryError> {
        self.task(handle)?;
        self.check_acyclic(None, Some(handle.index))?;

        let task = self.slots[handle.index]
            .take()
            .ok_or(RegistryError::UnknownHandle)?;
        self.names.remove(&task.name);
        for other in self.slots.iter_mut().flatten() {
            other.dependencies.retain(|dep| *dep != handle);
        }
        debug!(task = %task.name, "removed task");

        Ok(task)
    }

    pub fn lookup(&self, name: &str) -> Option<TaskHandle> {
        self.names.get(name).map(|&index| self.handle(index))
    }

    pub fn get(&self, handle: TaskHandle) -> Option<&Task> {
        self.task(handle).ok()
    }

    /// All registered tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskHandle, &Task)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|task| (self.handle(index), task)))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn handle(&self, index: usize) -> TaskHandle {
        TaskHandle {
            registry: self.id,
            index,
        }
    }

    fn task(&self, handle: TaskHandle) -> Result<&Task, RegistryError> {
        if handle.registry != self.id {
            return Err(RegistryError::UnknownHandle);
        }
        self.slots
            .get(handle.index)
            .and_then(Option::as_ref)
            .ok_or(RegistryError::UnknownHandle)
    }

    fn task_mut(&mut self, handle: TaskHandle) -> Result<&mut Task, RegistryError> {
        if handle.registry != self.id {
            return Err(RegistryError::UnknownHandle);
        }
        self.slots
            .get_mut(handle.index)
            .and_then(Option::as_mut)
            .ok_or(RegistryError::UnknownHandle)
    }

    fn check_handles(&self, task: &str, dependencies: &[TaskHandle]) -> Result<(), RegistryError> {
        for dep in dependencies {
            if dep.registry != self.id {
                return Err(RegistryError::ForeignHandle {
                    task: task.to_string(),
                });
            }
            self.task(*dep)?;
        }
        Ok(())
    }

    /// Validate the graph that would result from replacing the dependencies of
    /// one task and/or removing another.
    fn check_acyclic(
        &self,
        replaced: Option<(usize, &[TaskHandle])>,
        removed: Option<usize>,
    ) -> Result<(), RegistryError> {
        let mut graph = DiGraphMap::<usize, ()>::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(task) = slot else { continue };
            if Some(index) == removed {
                continue;
            }
            graph.add_node(index);

            let dependencies = match replaced {
                Some((target, deps)) if target == index => deps,
                _ => task.dependencies.as_slice(),
            };
            for dep in dependencies {
                if Some(dep.index) == removed {
                    continue;
                }
                if dep.index == index {
                    return Err(RegistryError::Cycle(self.describe(&[index, index])));
                }
                graph.add_edge(index, dep.index, ());
            }
        }

        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let path = cycle_path(&graph, cycle.node_id());
                Err(RegistryError::Cycle(self.describe(&path)))
            }
        }
    }

    fn describe(&self, path: &[usize]) -> String {
        path.iter()
            .map(|&index| {
                self.slots
                    .get(index)
                    .and_then(Option::as_ref)
                    .map_or("?", |task| task.name.as_str())
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Find a path that starts and ends at `start`.
fn cycle_path(graph: &DiGraphMap<usize, ()>, start: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut stack = vec![(start, vec![start])];

    while let Some((node, path)) = stack.pop() {
        for next in graph.neighbors(node) {
            if next == start {
                let mut cycle = path.clone();
                cycle.push(start);
                return cycle;
            }
            if seen.insert(next) {
                let mut extended = path.clone();
                extended.push(next);
                stack.push((next, extended));
            }
        }
    }

    vec![start, start]
}
