//! Lineage graph: typed nodes, tagged edges, and the run event log
//!
//! ## Graph Shape
//!
//! ```text
//! Dataset ──transform──> Dataset ──split──> Split ──split──> Dataset (partition)
//!    │                      ▲                                   │
//!    │                Transformer                               fit
//!    │                                                          ▼
//!    └──────────────────────────evaluate──> Metric <──evaluate── Transformer (pipeline)
//!                                                                  ▲
//!                                                     Transformer ─┘ compose (steps)
//! ```
//!
//! Nodes are content-addressed: a `(kind, fingerprint)` pair appears at most once.

mod graph;
mod node;

pub use graph::{GraphCheckpoint, GraphDelta, GraphTransaction, LineageGraph};
pub use node::{
    ColumnSchema, DatasetAttributes, LineageEdge, LineageEvent, MetricAttributes, Node,
    NodeAttributes, NodeKind, NodeRef, NodeSpec, OperationKind, PipelineStep, SplitAttributes,
    TransformerAttributes,
};
