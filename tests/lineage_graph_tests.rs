//! Lineage graph tests: dedup, cycles, transactions, deltas

use std::sync::Arc;
use trueno_lineage::fingerprint::Fingerprint;
use trueno_lineage::lineage::{
    GraphCheckpoint, LineageGraph, NodeAttributes, NodeKind, NodeSpec, OperationKind,
    TransformerAttributes,
};
use trueno_lineage::Error;

fn transformer(byte: u8) -> NodeSpec {
    NodeSpec::new(
        Fingerprint::from_bytes([byte; 32]),
        NodeAttributes::Transformer(TransformerAttributes {
            component_type: format!("T{byte}"),
            params: serde_json::Value::Null,
            steps: Vec::new(),
        }),
    )
}

#[test]
fn test_concurrent_get_or_create_yields_one_node() {
    let graph = LineageGraph::new();
    let nodes: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| graph.get_or_create_node(transformer(7))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(graph.node_count(), 1);
    assert!(nodes.iter().all(|n| Arc::ptr_eq(n, &nodes[0])));
}

#[test]
fn test_same_fingerprint_different_kind_are_distinct() {
    let graph = LineageGraph::new();
    let fp = Fingerprint::from_bytes([1; 32]);
    let a = graph.get_or_create_node(transformer(1));
    let b = graph.get_or_create_node(NodeSpec::new(
        fp,
        NodeAttributes::Dataset(trueno_lineage::lineage::DatasetAttributes {
            columns: Vec::new(),
            num_rows: 0,
            label_column: None,
        }),
    ));

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.kind(), NodeKind::Transformer);
    assert_eq!(b.kind(), NodeKind::Dataset);
    assert_eq!(graph.node_count(), 2);
}

#[test]
fn test_chain_cycle_rejected_and_graph_unchanged() {
    let graph = LineageGraph::new();
    let refs: Vec<_> = (1..=4)
        .map(|b| graph.get_or_create_node(transformer(b)).node_ref())
        .collect();
    for pair in refs.windows(2) {
        assert!(graph.add_edge(&pair[0], &pair[1], OperationKind::Transform).unwrap());
    }
    let before = graph.checkpoint();

    let err = graph
        .add_edge(&refs[3], &refs[0], OperationKind::Transform)
        .unwrap_err();
    assert!(matches!(err, Error::LineageCycle { .. }));
    assert_eq!(graph.checkpoint(), before);
    assert!(graph.is_acyclic());
}

#[test]
fn test_parallel_edges_with_different_operations() {
    let graph = LineageGraph::new();
    let a = graph.get_or_create_node(transformer(1)).node_ref();
    let b = graph.get_or_create_node(transformer(2)).node_ref();

    assert!(graph.add_edge(&a, &b, OperationKind::Fit).unwrap());
    assert!(graph.add_edge(&a, &b, OperationKind::Transform).unwrap());
    assert!(!graph.add_edge(&a, &b, OperationKind::Fit).unwrap());
    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.incoming(&b).len(), 2);
}

#[test]
fn test_transaction_rollback_restores_dedup_index() {
    let graph = LineageGraph::new();
    let kept = graph.get_or_create_node(transformer(1)).node_ref();
    {
        let mut tx = graph.transaction();
        let staged = tx.get_or_create_node(transformer(2)).node_ref();
        tx.add_edge(&kept, &staged, OperationKind::Fit).unwrap();
        tx.record_event("fit", OperationKind::Fit, vec![kept], vec![staged]);
    }
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);
    assert_eq!(graph.event_count(), 0);

    // The discarded node can be created again and gets the next id.
    let again = graph.get_or_create_node(transformer(2));
    assert_eq!(again.id(), 1);
    assert!(graph.add_edge(&kept, &again.node_ref(), OperationKind::Fit).unwrap());
}

#[test]
fn test_ancestors_follow_edges_backwards() {
    let graph = LineageGraph::new();
    let refs: Vec<_> = (1..=5)
        .map(|b| graph.get_or_create_node(transformer(b)).node_ref())
        .collect();
    graph.add_edge(&refs[0], &refs[2], OperationKind::Fit).unwrap();
    graph.add_edge(&refs[1], &refs[2], OperationKind::Fit).unwrap();
    graph.add_edge(&refs[2], &refs[3], OperationKind::Transform).unwrap();

    let ancestors: Vec<_> = graph.ancestors(&refs[3]).iter().map(|n| n.node_ref()).collect();
    assert_eq!(ancestors, vec![refs[0], refs[1], refs[2]]);
    assert!(graph.ancestors(&refs[4]).is_empty());
}

#[test]
fn test_delta_since_reports_only_new_elements() {
    let graph = LineageGraph::new();
    let a = graph.get_or_create_node(transformer(1)).node_ref();
    let b = graph.get_or_create_node(transformer(2)).node_ref();
    graph.add_edge(&a, &b, OperationKind::Fit).unwrap();
    let first = graph.delta_since(GraphCheckpoint::default());
    assert_eq!(first.nodes.len(), 2);
    assert_eq!(first.edges.len(), 1);

    let c = graph.get_or_create_node(transformer(3)).node_ref();
    graph.add_edge(&b, &c, OperationKind::Transform).unwrap();
    let second = graph.delta_since(first.end);
    assert_eq!(second.start, first.end);
    assert_eq!(second.nodes.len(), 1);
    assert_eq!(second.nodes[0].node_ref(), c);
    assert_eq!(second.edges.len(), 1);

    assert!(graph.delta_since(second.end).is_empty());
}
