//! Lineage graph builder
//!
//! Append-only DAG of content-addressed nodes. All reads and writes go through
//! one mutex, so two concurrent callers can never create two nodes for the same
//! `(kind, fingerprint)`.
//!
//! Insertion order is preserved, which makes a [`GraphCheckpoint`] (three
//! lengths) enough to describe "everything added since the last sync".

use super::node::{LineageEdge, LineageEvent, Node, NodeRef, NodeSpec, OperationKind};
use crate::{Error, Result};
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Position in the graph's append-only logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCheckpoint {
    /// Nodes before this point
    pub nodes: usize,
    /// Edges before this point
    pub edges: usize,
    /// Events before this point
    pub events: usize,
}

impl GraphCheckpoint {
    /// Component-wise maximum; checkpoints only move forward.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            nodes: self.nodes.max(other.nodes),
            edges: self.edges.max(other.edges),
            events: self.events.max(other.events),
        }
    }
}

/// Graph elements added between two checkpoints.
#[derive(Debug, Clone, Default)]
pub struct GraphDelta {
    /// New nodes, in insertion order
    pub nodes: Vec<Arc<Node>>,
    /// New edges, in insertion order
    pub edges: Vec<LineageEdge>,
    /// New events, in run order
    pub events: Vec<LineageEvent>,
    /// Checkpoint the delta starts at
    pub start: GraphCheckpoint,
    /// Checkpoint to advance to once the delta is acknowledged
    pub end: GraphCheckpoint,
}

impl GraphDelta {
    /// True when nothing was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.events.is_empty()
    }
}

#[derive(Debug, Default)]
struct GraphInner {
    nodes: Vec<Arc<Node>>,
    index: FxHashMap<NodeRef, usize>,
    edges: Vec<LineageEdge>,
    edge_index: FxHashSet<(usize, usize, OperationKind)>,
    successors: Vec<Vec<usize>>,
    events: Vec<LineageEvent>,
}

impl GraphInner {
    fn checkpoint(&self) -> GraphCheckpoint {
        GraphCheckpoint {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            events: self.events.len(),
        }
    }

    fn get_or_create(&mut self, spec: NodeSpec) -> Arc<Node> {
        let node_ref = spec.node_ref();
        if let Some(&idx) = self.index.get(&node_ref) {
            debug!(node = %node_ref, "lineage node reused");
            return Arc::clone(&self.nodes[idx]);
        }

        let idx = self.nodes.len();
        let node = Arc::new(Node::new(idx as u64, spec));
        self.nodes.push(Arc::clone(&node));
        self.successors.push(Vec::new());
        self.index.insert(node_ref, idx);
        debug!(node = %node_ref, id = idx, "lineage node created");
        node
    }

    fn position(&self, node_ref: &NodeRef) -> Result<usize> {
        self.index
            .get(node_ref)
            .copied()
            .ok_or_else(|| Error::Other(format!("edge endpoint {node_ref} is not in the graph")))
    }

    /// Depth-first search over successors.
    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut stack = vec![start];
        let mut seen = FxHashSet::default();
        while let Some(idx) = stack.pop() {
            if idx == target {
                return true;
            }
            if seen.insert(idx) {
                stack.extend(self.successors[idx].iter().copied());
            }
        }
        false
    }

    fn add_edge(&mut self, from: &NodeRef, to: &NodeRef, operation: OperationKind) -> Result<bool> {
        let from_idx = self.position(from)?;
        let to_idx = self.position(to)?;

        // An identity operation yields its own input; there is nothing to connect.
        if from_idx == to_idx {
            debug!(node = %from, %operation, "self edge skipped");
            return Ok(false);
        }
        if self.edge_index.contains(&(from_idx, to_idx, operation)) {
            return Ok(false);
        }
        if self.reaches(to_idx, from_idx) {
            return Err(Error::LineageCycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.edge_index.insert((from_idx, to_idx, operation));
        self.successors[from_idx].push(to_idx);
        self.edges.push(LineageEdge {
            from: *from,
            to: *to,
            operation,
        });
        Ok(true)
    }

    /// Drop everything appended after `checkpoint`.
    fn truncate(&mut self, checkpoint: GraphCheckpoint) {
        for edge in self.edges.drain(checkpoint.edges..).rev() {
            let from_idx = self.index[&edge.from];
            let to_idx = self.index[&edge.to];
            self.edge_index.remove(&(from_idx, to_idx, edge.operation));
            self.successors[from_idx].pop();
        }
        for node in self.nodes.drain(checkpoint.nodes..) {
            self.index.remove(&node.node_ref());
        }
        self.successors.truncate(checkpoint.nodes);
        self.events.truncate(checkpoint.events);
    }
}

/// In-memory lineage DAG for one run.
#[derive(Debug, Default)]
pub struct LineageGraph {
    inner: Mutex<GraphInner>,
}

impl LineageGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node with the spec's `(kind, fingerprint)`, inserting it if absent.
    ///
    /// A reused node keeps the attributes it was first created with; repeated
    /// calls return the same `Arc` (`Arc::ptr_eq` holds).
    pub fn get_or_create_node(&self, spec: NodeSpec) -> Arc<Node> {
        self.inner.lock().get_or_create(spec)
    }

    /// Add `from -> to` tagged with `operation`.
    ///
    /// Returns `Ok(false)` when the edge already exists or `from == to`.
    ///
    /// # Errors
    ///
    /// Returns `LineageCycle` if the edge would close a cycle, or `Other` if an
    /// endpoint is not in the graph
    pub fn add_edge(&self, from: &NodeRef, to: &NodeRef, operation: OperationKind) -> Result<bool> {
        self.inner.lock().add_edge(from, to, operation)
    }

    /// Look up a node by identity
    #[must_use]
    pub fn get(&self, node_ref: &NodeRef) -> Option<Arc<Node>> {
        let inner = self.inner.lock();
        inner.index.get(node_ref).map(|&idx| Arc::clone(&inner.nodes[idx]))
    }

    /// Number of nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.lock().edges.len()
    }

    /// Number of recorded events
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// Snapshot of all nodes in insertion order
    #[must_use]
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.inner.lock().nodes.clone()
    }

    /// Snapshot of all edges in insertion order
    #[must_use]
    pub fn edges(&self) -> Vec<LineageEdge> {
        self.inner.lock().edges.clone()
    }

    /// Snapshot of the event log
    #[must_use]
    pub fn events(&self) -> Vec<LineageEvent> {
        self.inner.lock().events.clone()
    }

    /// Edges whose target is `node_ref`
    #[must_use]
    pub fn incoming(&self, node_ref: &NodeRef) -> Vec<LineageEdge> {
        self.inner
            .lock()
            .edges
            .iter()
            .filter(|e| e.to == *node_ref)
            .copied()
            .collect()
    }

    /// All nodes `node_ref` transitively depends on, in insertion order.
    #[must_use]
    pub fn ancestors(&self, node_ref: &NodeRef) -> Vec<Arc<Node>> {
        let inner = self.inner.lock();
        let Some(&target) = inner.index.get(node_ref) else {
            return Vec::new();
        };
        (0..inner.nodes.len())
            .filter(|&idx| idx != target && inner.reaches(idx, target))
            .map(|idx| Arc::clone(&inner.nodes[idx]))
            .collect()
    }

    /// Current end of the logs
    #[must_use]
    pub fn checkpoint(&self) -> GraphCheckpoint {
        self.inner.lock().checkpoint()
    }

    /// Everything appended after `checkpoint`, snapshotted under the lock.
    #[must_use]
    pub fn delta_since(&self, checkpoint: GraphCheckpoint) -> GraphDelta {
        let inner = self.inner.lock();
        let end = inner.checkpoint();
        let start = GraphCheckpoint {
            nodes: checkpoint.nodes.min(end.nodes),
            edges: checkpoint.edges.min(end.edges),
            events: checkpoint.events.min(end.events),
        };
        GraphDelta {
            nodes: inner.nodes[start.nodes..].to_vec(),
            edges: inner.edges[start.edges..].to_vec(),
            events: inner.events[start.events..].to_vec(),
            start,
            end,
        }
    }

    /// Kahn's algorithm over the whole graph.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        let inner = self.inner.lock();
        let mut in_degree = vec![0usize; inner.nodes.len()];
        for targets in &inner.successors {
            for &t in targets {
                in_degree[t] += 1;
            }
        }
        let mut ready: Vec<usize> = (0..in_degree.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut visited = 0;
        while let Some(idx) = ready.pop() {
            visited += 1;
            for &t in &inner.successors[idx] {
                in_degree[t] -= 1;
                if in_degree[t] == 0 {
                    ready.push(t);
                }
            }
        }
        visited == inner.nodes.len()
    }

    /// Begin an all-or-nothing batch of mutations.
    ///
    /// The graph lock is held until the transaction is committed or dropped;
    /// dropping without [`GraphTransaction::commit`] discards every staged change.
    pub fn transaction(&self) -> GraphTransaction<'_> {
        let guard = self.inner.lock();
        let start = guard.checkpoint();
        GraphTransaction {
            guard,
            start,
            committed: false,
        }
    }
}

/// Staged graph mutations for one tracked call.
pub struct GraphTransaction<'a> {
    guard: MutexGuard<'a, GraphInner>,
    start: GraphCheckpoint,
    committed: bool,
}

impl GraphTransaction<'_> {
    /// See [`LineageGraph::get_or_create_node`]
    pub fn get_or_create_node(&mut self, spec: NodeSpec) -> Arc<Node> {
        self.guard.get_or_create(spec)
    }

    /// See [`LineageGraph::add_edge`]
    ///
    /// # Errors
    ///
    /// Returns `LineageCycle` or `Other` as [`LineageGraph::add_edge`] does
    pub fn add_edge(&mut self, from: &NodeRef, to: &NodeRef, operation: OperationKind) -> Result<bool> {
        self.guard.add_edge(from, to, operation)
    }

    /// Append an event to the run log; returns its sequence number.
    pub fn record_event(
        &mut self,
        operation: &str,
        kind: OperationKind,
        inputs: Vec<NodeRef>,
        outputs: Vec<NodeRef>,
    ) -> u64 {
        let sequence = self.guard.events.len() as u64;
        self.guard.events.push(LineageEvent {
            sequence,
            operation: operation.to_string(),
            kind,
            inputs,
            outputs,
            recorded_at: Utc::now(),
        });
        sequence
    }

    /// Make the staged changes permanent.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let staged = self.guard.checkpoint();
            if staged != self.start {
                debug!(?staged, start = ?self.start, "lineage transaction rolled back");
            }
            self.guard.truncate(self.start);
        }
    }
}
