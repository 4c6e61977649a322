//! Task graph and topological scheduling.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::pipeline::BuildError;

/// A single build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Vendor,
    Views,
    Stylesheets,
    Javascripts,
    Images,
    Fonts,
}

impl TaskKind {
    /// Every task, in declaration order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Vendor,
        TaskKind::Views,
        TaskKind::Stylesheets,
        TaskKind::Javascripts,
        TaskKind::Images,
        TaskKind::Fonts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TaskKind::Vendor => "vendor",
            TaskKind::Views => "views",
            TaskKind::Stylesheets => "stylesheets",
            TaskKind::Javascripts => "javascripts",
            TaskKind::Images => "images",
            TaskKind::Fonts => "fonts",
        }
    }

    /// Whether browsers should reload after this task writes output.
    pub fn signals_reload(self) -> bool {
        matches!(
            self,
            TaskKind::Views | TaskKind::Stylesheets | TaskKind::Javascripts
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = TaskKind::ALL.iter().map(|t| t.name()).collect();
                format!("unknown task '{}' (expected one of {})", s, names.join(", "))
            })
    }
}

/// What to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every task
    Build,
    /// One task and its transitive dependencies
    Task(TaskKind),
}

/// Directed acyclic graph of tasks; an edge `a -> b` means `b` needs `a`.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    graph: DiGraph<TaskKind, ()>,
    nodes: HashMap<TaskKind, NodeIndex>,
}

impl TaskGraph {
    /// Graph with no dependencies between tasks.
    pub fn empty() -> Self {
        let mut graph = DiGraph::new();
        let nodes = TaskKind::ALL
            .into_iter()
            .map(|task| (task, graph.add_node(task)))
            .collect();
        Self { graph, nodes }
    }

    /// Declare that `task` needs `dependency` to complete first.
    pub fn add_dependency(&mut self, task: TaskKind, dependency: TaskKind) {
        let from = self.nodes[&dependency];
        let to = self.nodes[&task];
        self.graph.update_edge(from, to, ());
    }

    /// Direct dependencies of `task`.
    pub fn dependencies(&self, task: TaskKind) -> Vec<TaskKind> {
        let mut deps: Vec<TaskKind> = self
            .graph
            .neighbors_directed(self.nodes[&task], Direction::Incoming)
            .map(|idx| self.graph[idx])
            .collect();
        deps.sort();
        deps
    }

    /// Tasks needed for `target`, dependencies first.
    pub fn plan(&self, target: Target) -> Result<Vec<TaskKind>, BuildError> {
        let sorted = petgraph::algo::toposort(&self.graph, None).map_err(|cycle| {
            BuildError::Graph(format!(
                "dependency cycle through task '{}'",
                self.graph[cycle.node_id()]
            ))
        })?;

        let required = match target {
            Target::Build => TaskKind::ALL.into_iter().collect(),
            Target::Task(task) => self.closure(task),
        };

        Ok(sorted
            .into_iter()
            .map(|idx| self.graph[idx])
            .filter(|task| required.contains(task))
            .collect())
    }

    fn closure(&self, task: TaskKind) -> HashSet<TaskKind> {
        let mut seen = HashSet::new();
        let mut stack = vec![task];

        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.dependencies(current));
            }
        }

        seen
    }
}

impl Default for TaskGraph {
    /// The standard build: stylesheets import vendor styles.
    fn default() -> Self {
        let mut graph = Self::empty();
        graph.add_dependency(TaskKind::Stylesheets, TaskKind::Vendor);
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(plan: &[TaskKind], task: TaskKind) -> usize {
        plan.iter().position(|t| *t == task).unwrap()
    }

    #[test]
    fn build_plan_covers_every_task() {
        let plan = TaskGraph::default().plan(Target::Build).unwrap();

        assert_eq!(plan.len(), TaskKind::ALL.len());
        assert!(position(&plan, TaskKind::Vendor) < position(&plan, TaskKind::Stylesheets));
    }

    #[test]
    fn single_task_pulls_in_dependencies() {
        let graph = TaskGraph::default();

        assert_eq!(
            graph.plan(Target::Task(TaskKind::Stylesheets)).unwrap(),
            vec![TaskKind::Vendor, TaskKind::Stylesheets]
        );
        assert_eq!(
            graph.plan(Target::Task(TaskKind::Views)).unwrap(),
            vec![TaskKind::Views]
        );
    }

    #[test]
    fn detects_cycles() {
        let mut graph = TaskGraph::default();
        graph.add_dependency(TaskKind::Vendor, TaskKind::Stylesheets);

        assert!(matches!(
            graph.plan(Target::Build),
            Err(BuildError::Graph(_))
        ));
    }

    #[test]
    fn parses_task_names() {
        assert_eq!("fonts".parse::<TaskKind>(), Ok(TaskKind::Fonts));
        assert!("sprites".parse::<TaskKind>().is_err());
    }
}
