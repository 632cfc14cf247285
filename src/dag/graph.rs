// src/dag/graph.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{Result, StagedagError};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must succeed before this one can run.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory DAG keyed by task name.
///
/// Edges are added freely; [`DagGraph::validate`] rejects cycles and must be
/// called before the graph is scheduled.
#[derive(Debug, Clone, Default)]
pub struct DagGraph {
    nodes: BTreeMap<TaskName, DagNode>,
}

impl DagGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Returns `false` if it already existed.
    pub fn add_node(&mut self, name: &str) -> bool {
        if self.nodes.contains_key(name) {
            return false;
        }
        self.nodes.insert(name.to_string(), DagNode::default());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Add an edge `upstream -> downstream`.
    pub fn add_edge(&mut self, upstream: &str, downstream: &str) -> Result<()> {
        if !self.contains(upstream) {
            return Err(StagedagError::TaskNotFound(upstream.to_string()));
        }
        if !self.contains(downstream) {
            return Err(StagedagError::TaskNotFound(downstream.to_string()));
        }
        if upstream == downstream {
            return Err(StagedagError::ConfigError(format!(
                "task '{upstream}' cannot depend on itself"
            )));
        }

        if let Some(node) = self.nodes.get_mut(downstream) {
            if node.deps.iter().any(|d| d == upstream) {
                return Ok(());
            }
            node.deps.push(upstream.to_string());
        }
        if let Some(node) = self.nodes.get_mut(upstream) {
            node.dependents.push(downstream.to_string());
        }
        Ok(())
    }

    /// Check acyclicity and return a topological order.
    pub fn validate(&self) -> Result<Vec<TaskName>> {
        // Edge direction: dep -> task.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        // A topological sort will fail if there is a cycle.
        match toposort(&graph, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(StagedagError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                cycle.node_id()
            ))),
        }
    }

    /// Return all task names, sorted.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<TaskName> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.deps.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }
}
