//! In-memory metadata store using `DashMap`.
//!
//! Mirrors the server-side contract: nodes are deduplicated by
//! `(kind, fingerprint)`, edges by `(from, to, operation)`, events by
//! `(run, sequence)`, and a replayed batch id gets its original response.

use super::batch::{BatchResponse, NodeOutcome, Outcome, SyncBatch};
use super::transport::{MetadataStore, TransportError};
use crate::lineage::{LineageEdge, LineageEvent, Node, NodeRef};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use rustc_hash::FxHashSet;
use uuid::Uuid;

/// Thread-safe in-memory metadata store.
///
/// Useful as a local backend and as the reference behaviour for tests. Data is
/// lost when the store is dropped.
///
/// # Example
///
/// ```rust
/// use trueno_lineage::sync::MemoryMetadataStore;
///
/// let store = MemoryMetadataStore::new();
/// assert_eq!(store.node_count(), 0);
/// ```
#[derive(Debug)]
pub struct MemoryMetadataStore {
    id: Uuid,
    nodes: DashMap<NodeRef, Node>,
    edges: DashSet<LineageEdge>,
    events: DashMap<(String, u64), LineageEvent>,
    batches: DashMap<Uuid, BatchResponse>,
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            nodes: DashMap::new(),
            edges: DashSet::new(),
            events: DashMap::new(),
            batches: DashMap::new(),
        }
    }
}

impl MemoryMetadataStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct nodes stored.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Distinct edges stored.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Events stored for `run_id`.
    #[must_use]
    pub fn event_count(&self, run_id: &str) -> usize {
        self.events.iter().filter(|e| e.key().0 == run_id).count()
    }

    /// Batches answered (accepted or rejected).
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Whether a node with this identity is stored.
    #[must_use]
    pub fn contains(&self, node_ref: &NodeRef) -> bool {
        self.nodes.contains_key(node_ref)
    }

    /// Copy of a stored node.
    #[must_use]
    pub fn get(&self, node_ref: &NodeRef) -> Option<Node> {
        self.nodes.get(node_ref).map(|n| n.value().clone())
    }

    /// Whether this edge is stored.
    #[must_use]
    pub fn contains_edge(&self, edge: &LineageEdge) -> bool {
        self.edges.contains(edge)
    }

    /// Clear all entries. The store keeps its identity, so synced caches
    /// written against it still claim nodes it no longer has.
    pub fn clear(&self) {
        self.nodes.clear();
        self.edges.clear();
        self.events.clear();
        self.batches.clear();
    }

    fn apply(&self, batch: &SyncBatch) -> BatchResponse {
        let incoming: FxHashSet<NodeRef> = batch.nodes.iter().map(Node::node_ref).collect();
        let known = |r: &NodeRef| incoming.contains(r) || self.nodes.contains_key(r);
        if let Some(edge) = batch.edges.iter().find(|e| !(known(&e.from) && known(&e.to))) {
            return BatchResponse::rejected(
                batch.batch_id,
                format!("edge {} -> {} references an unknown node", edge.from, edge.to),
            );
        }

        let outcomes = batch
            .nodes
            .iter()
            .map(|node| {
                let outcome = match self.nodes.entry(node.node_ref()) {
                    Entry::Occupied(_) => Outcome::AlreadyExisted,
                    Entry::Vacant(slot) => {
                        slot.insert(node.clone());
                        Outcome::Created
                    }
                };
                NodeOutcome {
                    kind: node.kind(),
                    fingerprint: *node.fingerprint(),
                    outcome,
                }
            })
            .collect();

        for edge in &batch.edges {
            self.edges.insert(*edge);
        }
        for event in &batch.events {
            self.events
                .entry((batch.run_id().to_string(), event.sequence))
                .or_insert_with(|| event.clone());
        }
        BatchResponse::stored(batch.batch_id, outcomes)
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn identity(&self) -> String {
        format!("memory:{}", self.id)
    }

    async fn upload_batch(&self, batch: &SyncBatch) -> Result<BatchResponse, TransportError> {
        let response = match self.batches.entry(batch.batch_id) {
            Entry::Occupied(previous) => previous.get().clone(),
            Entry::Vacant(slot) => slot.insert(self.apply(batch)).value().clone(),
        };
        Ok(response)
    }
}
