//! Sync wire format
//!
//! A [`SyncBatch`] carries one delta of a run's graph plus the records that
//! identify the run. The store answers with a [`BatchResponse`] listing, per
//! node, whether it was new or already known by fingerprint.

use crate::experiment::{ExperimentRecord, ProjectRecord, RunRecord};
use crate::fingerprint::Fingerprint;
use crate::lineage::{GraphDelta, LineageEdge, LineageEvent, Node, NodeKind, NodeRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One upload: the unsent part of a run's graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Idempotency key. Retries inside one push reuse it; every `sync()` call
    /// builds a new batch with a fresh id.
    pub batch_id: Uuid,
    /// Owning project
    pub project: ProjectRecord,
    /// Owning experiment
    pub experiment: ExperimentRecord,
    /// Run snapshot at send time
    pub run: RunRecord,
    /// New nodes, in graph insertion order
    pub nodes: Vec<Node>,
    /// New edges, in graph insertion order
    pub edges: Vec<LineageEdge>,
    /// New events, in run order
    pub events: Vec<LineageEvent>,
}

impl SyncBatch {
    /// Build a batch from a graph delta, under a new `batch_id`.
    ///
    /// Nodes for which `skip` returns true are left out (already known remotely);
    /// edges and events are always sent.
    #[must_use]
    pub fn from_delta(
        project: ProjectRecord,
        experiment: ExperimentRecord,
        run: RunRecord,
        delta: &GraphDelta,
        skip: impl Fn(&NodeRef) -> bool,
    ) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            project,
            experiment,
            run,
            nodes: delta
                .nodes
                .iter()
                .filter(|n| !skip(&n.node_ref()))
                .map(|n| n.as_ref().clone())
                .collect(),
            edges: delta.edges.clone(),
            events: delta.events.clone(),
        }
    }

    /// ID of the run the batch belongs to
    #[must_use]
    pub fn run_id(&self) -> &str {
        self.run.run_id()
    }

    /// True when there is nothing to upload
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.events.is_empty()
    }
}

/// Overall verdict on a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every node was new
    Accepted,
    /// Stored, but some nodes already existed (not an error)
    PartiallyAccepted,
    /// Nothing stored; resending the same batch will not help
    Rejected,
}

/// Per-node result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// First time the store saw this node
    Created,
    /// The store already had a node with this kind and fingerprint
    AlreadyExisted,
}

/// Outcome for one node of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOutcome {
    /// Node kind
    pub kind: NodeKind,
    /// Node fingerprint
    pub fingerprint: Fingerprint,
    /// What the store did with it
    pub outcome: Outcome,
}

/// Store reply to a batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Batch this answers
    pub batch_id: Uuid,
    /// Overall status
    pub status: BatchStatus,
    /// Per-node outcomes, in batch order
    #[serde(default)]
    pub outcomes: Vec<NodeOutcome>,
    /// Reason, for rejected batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchResponse {
    /// Stored response; status derives from the outcomes
    #[must_use]
    pub fn stored(batch_id: Uuid, outcomes: Vec<NodeOutcome>) -> Self {
        let status = if outcomes.iter().all(|o| o.outcome == Outcome::Created) {
            BatchStatus::Accepted
        } else {
            BatchStatus::PartiallyAccepted
        };
        Self {
            batch_id,
            status,
            outcomes,
            message: None,
        }
    }

    /// Rejection with a reason
    #[must_use]
    pub fn rejected(batch_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Rejected,
            outcomes: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Nodes the store created
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(Outcome::Created)
    }

    /// Nodes the store already had
    #[must_use]
    pub fn already_existed(&self) -> usize {
        self.count(Outcome::AlreadyExisted)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.outcomes.iter().filter(|o| o.outcome == outcome).count()
    }
}
