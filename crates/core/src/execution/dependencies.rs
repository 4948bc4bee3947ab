//! Task dependency resolution
//!
//! An execution never looks at the live registry. It works on a [`Graph`]
//! snapshot keyed by task name, taken when the execution starts.

use std::collections::{HashMap, HashSet};

use crate::registry::Registry;
use crate::tasks::Action;
use crate::types::ExecuteError;

/// What the scheduler needs to know about one task.
#[derive(Clone)]
pub struct TaskSnapshot {
    pub name: String,
    pub action: Option<Action>,
    pub dependencies: Vec<String>,
    pub parallel: bool,
}

impl std::fmt::Debug for TaskSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSnapshot")
            .field("name", &self.name)
            .field("has_action", &self.action.is_some())
            .field("dependencies", &self.dependencies)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Immutable, name-keyed copy of a registry's dependency graph.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    tasks: HashMap<String, TaskSnapshot>,
}

impl Graph {
    pub fn snapshot(registry: &Registry) -> Self {
        let tasks = registry
            .tasks()
            .map(|(_, task)| {
                let dependencies = task
                    .dependencies()
                    .iter()
                    .filter_map(|dep| registry.get(*dep))
                    .map(|dep| dep.name().to_string())
                    .collect();
                let snapshot = TaskSnapshot {
                    name: task.name().to_string(),
                    action: task.action().cloned(),
                    dependencies,
                    parallel: task.is_parallel(),
                };
                (snapshot.name.clone(), snapshot)
            })
            .collect();
        Self { tasks }
    }

    pub fn get(&self, name: &str) -> Option<&TaskSnapshot> {
        self.tasks.get(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check a request before anything runs.
    pub fn validate(&self, names: &[String]) -> Result<(), ExecuteError> {
        if names.is_empty() {
            return Err(ExecuteError::NoTasks);
        }
        match names.iter().find(|name| !self.tasks.contains_key(name.as_str())) {
            Some(unknown) => Err(ExecuteError::UnknownTask(unknown.clone())),
            None => Ok(()),
        }
    }

    /// Resolution order for a request: every task after its dependencies,
    /// each task once. With `no_deps` only the requested tasks are listed.
    pub fn plan(&self, names: &[String], no_deps: bool) -> Result<Vec<String>, ExecuteError> {
        self.validate(names)?;

        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            if no_deps {
                if seen.insert(name.as_str()) {
                    order.push(name.clone());
                }
            } else {
                self.visit(name, &mut seen, &mut order);
            }
        }
        Ok(order)
    }

    fn visit<'a>(&'a self, name: &'a str, seen: &mut HashSet<&'a str>, order: &mut Vec<String>) {
        if !seen.insert(name) {
            return;
        }
        let Some(task) = self.tasks.get(name) else {
            return;
        };
        for dep in &task.dependencies {
            self.visit(dep, seen, order);
        }
        order.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskDef;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    fn diamond() -> Registry {
        let mut registry = Registry::new();
        let a = registry.register(TaskDef::new("a")).unwrap();
        let b = registry.register(TaskDef::new("b").deps([a])).unwrap();
        let c = registry
            .register(TaskDef::new("c").deps([a]).parallel(true))
            .unwrap();
        registry.register(TaskDef::new("d").deps([b, c])).unwrap();
        registry
    }

    #[test]
    fn test_snapshot_resolves_names() {
        let graph = Graph::snapshot(&diamond());

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.get("d").unwrap().dependencies, names(&["b", "c"]));
        assert!(graph.get("c").unwrap().parallel);
        assert!(graph.get("a").unwrap().action.is_none());
    }

    #[test]
    fn test_plan_visits_each_task_once() {
        let graph = Graph::snapshot(&diamond());

        assert_eq!(graph.plan(&names(&["d"]), false).unwrap(), names(&["a", "b", "c", "d"]));
        assert_eq!(
            graph.plan(&names(&["b", "c", "b"]), false).unwrap(),
            names(&["a", "b", "c"])
        );
    }

    #[test]
    fn test_plan_without_dependencies() {
        let graph = Graph::snapshot(&diamond());
        assert_eq!(graph.plan(&names(&["d", "b"]), true).unwrap(), names(&["d", "b"]));
    }

    #[test]
    fn test_invalid_requests() {
        let graph = Graph::snapshot(&diamond());

        assert_eq!(graph.plan(&[], false), Err(ExecuteError::NoTasks));
        assert_eq!(
            graph.plan(&names(&["a", "missing"]), false),
            Err(ExecuteError::UnknownTask("missing".to_string()))
        );
    }

    #[test]
    fn test_snapshot_follows_renames() {
        let mut registry = diamond();
        let a = registry.lookup("a").unwrap();
        registry.set_name(a, "setup").unwrap();

        let graph = Graph::snapshot(&registry);
        assert_eq!(graph.get("b").unwrap().dependencies, names(&["setup"]));
        assert!(graph.get("a").is_none());
    }
}
