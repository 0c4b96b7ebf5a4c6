//! Worker graph derived from worker descriptors.
//!
//! Nodes are workers. There is an edge `a → b` when `a` produces into the
//! queue `b` consumes from. Workers reading fresh buffers from the pool are
//! sources; workers recycling into the pool are sinks.

use std::collections::VecDeque;

use fxhash::{FxHashMap, FxHashSet};

use crate::error::TopologyError;
use crate::worker::{EndpointInfo, WorkerInfo};

/// A worker in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    /// Worker name.
    pub name: String,
    /// Takes fresh buffers from the pool.
    pub is_source: bool,
    /// Returns buffers to the pool.
    pub is_sink: bool,
}

/// Directed graph of workers connected by queues.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    nodes: Vec<GraphNode>,
    /// `(producer, consumer)` node indices.
    edges: Vec<(usize, usize)>,
    successors: Vec<Vec<usize>>,
    /// Queue endpoints that have no counterpart.
    dangling: Vec<String>,
}

impl TopologyGraph {
    /// Builds the graph from worker descriptors.
    #[must_use]
    pub fn from_workers(workers: &[WorkerInfo]) -> Self {
        let mut consumers: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
        let mut produced: FxHashSet<&str> = FxHashSet::default();
        for (i, worker) in workers.iter().enumerate() {
            if let EndpointInfo::Queue { name, .. } = &worker.input {
                consumers.entry(name.as_str()).or_default().push(i);
            }
            if let EndpointInfo::Queue { name, .. } = &worker.output {
                produced.insert(name.as_str());
            }
        }

        let mut edges = Vec::new();
        let mut successors = vec![Vec::new(); workers.len()];
        let mut dangling = Vec::new();
        for (i, worker) in workers.iter().enumerate() {
            if let EndpointInfo::Queue { name, .. } = &worker.output {
                match consumers.get(name.as_str()) {
                    Some(targets) => {
                        for &target in targets {
                            edges.push((i, target));
                            successors[i].push(target);
                        }
                    }
                    None => dangling.push(format!("{} -> {name}", worker.name)),
                }
            }
            if let EndpointInfo::Queue { name, .. } = &worker.input {
                if !produced.contains(name.as_str()) {
                    dangling.push(format!("{name} -> {}", worker.name));
                }
            }
        }

        let nodes = workers
            .iter()
            .map(|w| GraphNode {
                name: w.name.clone(),
                is_source: w.input == EndpointInfo::Pool,
                is_sink: w.output == EndpointInfo::Pool,
            })
            .collect();

        Self {
            nodes,
            edges,
            successors,
            dangling,
        }
    }

    /// Number of workers.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of worker-to-worker edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Node by index.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&GraphNode> {
        self.nodes.get(index)
    }

    /// Successor indices of `index`.
    #[must_use]
    pub fn successors(&self, index: usize) -> &[usize] {
        self.successors.get(index).map_or(&[][..], Vec::as_slice)
    }

    /// Indices of source workers.
    #[must_use]
    pub fn sources(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_source)
            .collect()
    }

    /// Indices of sink workers.
    #[must_use]
    pub fn sinks(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_sink)
            .collect()
    }

    /// Checks the graph is a connected DAG with a source and a sink.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::CycleDetected`] or
    /// [`TopologyError::Disconnected`].
    pub fn validate(&self) -> Result<(), TopologyError> {
        if let Some(endpoint) = self.dangling.first() {
            return Err(TopologyError::Disconnected(endpoint.clone()));
        }
        if self.nodes.is_empty() {
            return Err(TopologyError::Disconnected("no workers".to_string()));
        }
        if self.sources().is_empty() {
            return Err(TopologyError::Disconnected("no source worker".to_string()));
        }
        if self.sinks().is_empty() {
            return Err(TopologyError::Disconnected("no sink worker".to_string()));
        }
        self.execution_order()?;
        Ok(())
    }

    /// Topological order of the workers.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::CycleDetected`] naming a worker on a cycle.
    pub fn execution_order(&self) -> Result<Vec<usize>, TopologyError> {
        let (order, processed) = self.kahn_topo_sort();
        if processed < self.nodes.len() {
            let ordered: FxHashSet<usize> = order.into_iter().collect();
            let name = (0..self.nodes.len())
                .find(|i| !ordered.contains(i))
                .map_or_else(|| "unknown".to_string(), |i| self.nodes[i].name.clone());
            return Err(TopologyError::CycleDetected(name));
        }
        Ok(order)
    }

    /// Number of distinct source-to-sink paths.
    ///
    /// A worker that is both source and sink is one path on its own.
    /// Returns 0 for a cyclic graph.
    #[must_use]
    pub fn path_count(&self) -> usize {
        let Ok(order) = self.execution_order() else {
            return 0;
        };
        // Paths reaching each node from any source.
        let mut reaching = vec![0usize; self.nodes.len()];
        let mut total = 0;
        for &node in &order {
            if self.nodes[node].is_source {
                reaching[node] += 1;
            }
            if self.nodes[node].is_sink {
                total += reaching[node];
            }
            for &next in &self.successors[node] {
                reaching[next] += reaching[node];
            }
        }
        total
    }

    /// Kahn's algorithm. Returns `(order, processed)`.
    fn kahn_topo_sort(&self) -> (Vec<usize>, usize) {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for &(_, target) in &self.edges {
            in_degree[target] += 1;
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node);
            for &next in &self.successors[node] {
                in_degree[next] = in_degree[next].saturating_sub(1);
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        let processed = order.len();
        (order, processed)
    }
}
