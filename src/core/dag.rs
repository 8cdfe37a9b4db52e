//! Execution plan: the validated task DAG and its total order.
//!
//! The plan is built once per run from a finalized table. Edges point from
//! a dependency to its dependent, so a topological order of the graph runs
//! every task after everything it declared in `depends_on`. Building is pure
//! graph computation; nothing here performs I/O.

use crate::core::table::FinalizedTable;
use crate::core::task::{TaskNode, TaskResult};
use crate::error::{Error, Result};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

/// The task dependency graph plus a deterministic execution order.
pub struct ExecutionPlan {
    /// Nodes are added in declaration order, so a node's index is its
    /// position in the table.
    graph: DiGraph<TaskNode, ()>,
    /// Index mapping from task name to NodeIndex for fast lookups.
    task_index: HashMap<String, NodeIndex>,
    /// Topological order, ties broken by declaration order.
    order: Vec<NodeIndex>,
}

impl ExecutionPlan {
    /// Validate the table and compute the execution order.
    ///
    /// # Errors
    /// - `MissingDependency` if a `depends_on` entry names an undefined task
    /// - `CyclicDependency` if no valid order exists; no partial plan is returned
    pub fn build(table: &FinalizedTable) -> Result<Self> {
        let mut graph: DiGraph<TaskNode, ()> = DiGraph::with_capacity(table.len(), 0);
        let mut task_index = HashMap::with_capacity(table.len());

        for task in table.iter() {
            let index = graph.add_node(TaskNode::new(
                task.definition.clone(),
                task.description.clone(),
            ));
            task_index.insert(task.name().to_string(), index);
        }

        for task in table.iter() {
            let to = task_index[task.name()];
            for dependency in &task.definition.depends_on {
                let from = task_index.get(dependency).copied().ok_or_else(|| {
                    Error::MissingDependency {
                        task: task.name().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                // A dependency listed twice still yields a single edge.
                graph.update_edge(from, to, ());
            }
        }

        let order = stable_toposort(&graph).map_err(|cycle| Error::CyclicDependency {
            cycle: cycle
                .into_iter()
                .map(|index| graph[index].name().to_string())
                .collect(),
        })?;

        Ok(Self {
            graph,
            task_index,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of distinct dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Task names in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.graph[i].name()).collect()
    }

    /// Nodes in execution order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().map(move |&i| &self.graph[i])
    }

    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.task_index.get(name).map(|&i| &self.graph[i])
    }

    pub(crate) fn node_mut(&mut self, name: &str) -> Option<&mut TaskNode> {
        let index = *self.task_index.get(name)?;
        self.graph.node_weight_mut(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.task_index.contains_key(name)
    }

    /// Position of a task in the execution order.
    pub fn position(&self, name: &str) -> Option<usize> {
        let index = self.task_index.get(name)?;
        self.order.iter().position(|i| i == index)
    }

    /// Declared dependencies of a task, in declared order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.node(name)
            .map(|node| node.depends_on().iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Tasks that declared `name` as a dependency, in execution order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        let Some(&index) = self.task_index.get(name) else {
            return Vec::new();
        };
        let dependents: HashSet<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        self.order
            .iter()
            .filter(|i| dependents.contains(i))
            .map(|&i| self.graph[i].name())
            .collect()
    }

    /// Groups of tasks by dependency depth. Tasks in one wave never depend
    /// on each other; each wave is listed in execution order.
    pub fn waves(&self) -> Vec<Vec<&str>> {
        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(self.len());
        let mut waves: Vec<Vec<&str>> = Vec::new();
        for &index in &self.order {
            let d = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|dep| depth[&dep] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(index, d);
            if waves.len() <= d {
                waves.resize_with(d + 1, Vec::new);
            }
            waves[d].push(self.graph[index].name());
        }
        waves
    }

    /// Tasks not yet completed whose dependencies all are, in execution order.
    pub fn ready_tasks(&self, completed: &HashSet<String>) -> Vec<&str> {
        self.order
            .iter()
            .filter_map(|&index| {
                let node = &self.graph[index];
                if completed.contains(node.name()) {
                    return None;
                }
                let deps_satisfied = node
                    .depends_on()
                    .iter()
                    .all(|dep| completed.contains(dep));
                deps_satisfied.then_some(node.name())
            })
            .collect()
    }

    /// Results of `name`'s declared dependencies, in declared order.
    ///
    /// # Errors
    /// Returns `TaskExecution` if a dependency has no result yet, which
    /// means the caller ran tasks out of order.
    pub fn resolve_context(&self, name: &str) -> Result<Vec<Arc<TaskResult>>> {
        let node = self
            .node(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;
        node.depends_on()
            .iter()
            .map(|dep| {
                self.node(dep)
                    .and_then(|d| d.result.clone())
                    .ok_or_else(|| {
                        Error::task_execution(
                            name,
                            format!("dependency {} has not produced a result", dep),
                        )
                    })
            })
            .collect()
    }

    /// Results produced so far, in execution order.
    pub fn results(&self) -> Vec<Arc<TaskResult>> {
        self.nodes().filter_map(|node| node.result.clone()).collect()
    }

    pub fn all_complete(&self) -> bool {
        self.graph.node_weights().all(|node| node.result.is_some())
    }
}

impl std::fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("tasks", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}

/// Kahn's algorithm with a min-heap on node index, so the earliest declared
/// ready task is always scheduled first. On failure returns one cycle as a
/// closed walk along `depends_on` (first node repeated at the end).
fn stable_toposort<N>(
    graph: &DiGraph<N, ()>,
) -> std::result::Result<Vec<NodeIndex>, Vec<NodeIndex>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|i| graph.neighbors_directed(i, Direction::Incoming).count())
        .collect();

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse(i)) = ready.pop() {
        let index = NodeIndex::new(i);
        order.push(index);
        for dependent in graph.neighbors_directed(index, Direction::Outgoing) {
            let d = &mut in_degree[dependent.index()];
            *d -= 1;
            if *d == 0 {
                ready.push(Reverse(dependent.index()));
            }
        }
    }

    if order.len() == graph.node_count() {
        Ok(order)
    } else {
        Err(find_cycle(graph))
    }
}

fn find_cycle<N>(graph: &DiGraph<N, ()>) -> Vec<NodeIndex> {
    let cyclic = tarjan_scc(graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .min_by_key(|scc| scc.iter().map(|i| i.index()).min().unwrap_or(usize::MAX));

    let Some(scc) = cyclic else {
        return Vec::new();
    };
    let members: HashSet<NodeIndex> = scc.iter().copied().collect();
    let start = scc.iter().copied().min_by_key(|i| i.index()).unwrap_or(scc[0]);

    // Every member has a dependency inside the component, so following
    // dependencies must eventually revisit a node.
    let mut path: Vec<NodeIndex> = vec![start];
    let mut current = start;
    loop {
        let Some(next) = graph
            .neighbors_directed(current, Direction::Incoming)
            .filter(|n| members.contains(n))
            .min_by_key(|n| n.index())
        else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
