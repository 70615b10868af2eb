//! Run context: one tracked execution and the lineage graph it owns
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──start() / first tracked call──> Open ──close()──> Closed
//!                                            │                 │
//!                                          sync()*           sync() (final flush)
//! ```
//!
//! ## Locking
//!
//! All graph reads and writes go through the graph's single mutex. A tracked
//! call holds it only while committing its staged nodes and edges; `sync()`
//! snapshots the delta under it, uploads without it, and advances the synced
//! checkpoint afterwards. Lock order is graph, then run record.

use crate::config::TrackingConfig;
use crate::error::TrackedError;
use crate::experiment::{ExperimentRecord, ProjectRecord, RunRecord, RunState};
use crate::fingerprint::Fingerprinter;
use crate::lineage::{GraphCheckpoint, GraphDelta, LineageGraph, NodeRef};
use crate::ops::{
    ColumnSelection, Component, ComputeMetric, Estimator, Metric, RandomSplit, SelectColumns,
    TrackedEstimator, TrackedOperation, TrackedTransformer, Transformer,
};
use crate::sync::{BatchStatus, MetadataStore, SyncBatch, SyncClient, SyncedCache};
use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, info, warn};
use uuid::Uuid;

/// Summary of one `sync()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Uploaded batch, `None` when nothing had to be sent
    pub batch_id: Option<Uuid>,
    /// Store verdict, `None` when nothing had to be sent
    pub status: Option<BatchStatus>,
    /// Nodes included in the batch
    pub nodes_sent: usize,
    /// New nodes left out because the synced cache already had them
    pub nodes_skipped: usize,
    /// Edges included in the batch
    pub edges_sent: usize,
    /// Events included in the batch
    pub events_sent: usize,
    /// Nodes the store created
    pub created: usize,
    /// Nodes the store already had
    pub already_existed: usize,
    /// Transport attempts used
    pub attempts: u32,
    /// Synced checkpoint after the call
    pub checkpoint: GraphCheckpoint,
}

impl SyncReport {
    fn unchanged(checkpoint: GraphCheckpoint, nodes_skipped: usize) -> Self {
        Self {
            batch_id: None,
            status: None,
            nodes_sent: 0,
            nodes_skipped,
            edges_sent: 0,
            events_sent: 0,
            created: 0,
            already_existed: 0,
            attempts: 0,
            checkpoint,
        }
    }

    /// True when no batch was uploaded
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.batch_id.is_none()
    }
}

/// One experiment run.
///
/// Holds the run's lineage graph for its whole lifetime and is the only way to
/// add to it. Interceptors and adapters borrow the context explicitly; there is
/// no process-wide current run.
#[derive(Debug)]
pub struct RunContext {
    project: ProjectRecord,
    experiment: ExperimentRecord,
    record: Mutex<RunRecord>,
    graph: LineageGraph,
    fingerprinter: Fingerprinter,
    config: TrackingConfig,
    synced: Mutex<GraphCheckpoint>,
    sync_gate: tokio::sync::Mutex<()>,
    cache: Mutex<SyncedCache>,
}

impl RunContext {
    /// Create a run in `Created` state.
    ///
    /// Loads the synced-fingerprint cache when `config.sync.cache_path` is set.
    #[must_use]
    pub fn new(
        project: ProjectRecord,
        experiment: ExperimentRecord,
        record: RunRecord,
        config: TrackingConfig,
    ) -> Self {
        let cache = config
            .sync
            .cache_path
            .as_ref()
            .map_or_else(SyncedCache::in_memory, |path| SyncedCache::open(path.clone()));
        Self {
            project,
            experiment,
            record: Mutex::new(record),
            graph: LineageGraph::new(),
            fingerprinter: Fingerprinter::from_config(&config),
            config,
            synced: Mutex::new(GraphCheckpoint::default()),
            sync_gate: tokio::sync::Mutex::new(()),
            cache: Mutex::new(cache),
        }
    }

    /// Owning project
    #[must_use]
    pub const fn project(&self) -> &ProjectRecord {
        &self.project
    }

    /// Owning experiment
    #[must_use]
    pub const fn experiment(&self) -> &ExperimentRecord {
        &self.experiment
    }

    /// Snapshot of the run record
    #[must_use]
    pub fn record(&self) -> RunRecord {
        self.record.lock().clone()
    }

    /// Run ID
    #[must_use]
    pub fn run_id(&self) -> String {
        self.record.lock().run_id().to_string()
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> RunState {
        self.record.lock().state()
    }

    /// Settings the run was created with
    #[must_use]
    pub const fn config(&self) -> &TrackingConfig {
        &self.config
    }

    /// Fingerprint policy of the run
    #[must_use]
    pub const fn fingerprinter(&self) -> &Fingerprinter {
        &self.fingerprinter
    }

    /// The run's lineage graph (read access; mutation goes through tracked calls)
    #[must_use]
    pub const fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    /// Open the run explicitly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the run is closed
    pub fn start(&self) -> Result<()> {
        let mut record = self.record.lock();
        if record.open()? {
            info!(run_id = %record.run_id(), experiment = %self.experiment.name(), "run opened");
        }
        Ok(())
    }

    /// Seal the run; later tracked calls fail with `InvalidState`.
    ///
    /// Waits for tracked calls that are committing. `sync()` stays available
    /// to flush the final delta.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the run is already closed
    pub fn close(&self) -> Result<()> {
        let tx = self.graph.transaction();
        let result = self.record.lock().close();
        tx.commit();
        result?;
        info!(
            run_id = %self.run_id(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "run closed"
        );
        Ok(())
    }

    fn ensure_not_closed(&self) -> Result<()> {
        let record = self.record.lock();
        if record.state() == RunState::Closed {
            return Err(record.closed_error());
        }
        Ok(())
    }

    /// Run `op` and record its lineage.
    ///
    /// A call that fails validation leaves the run untouched; otherwise the
    /// run is opened first. Validation and input fingerprinting happen before
    /// the wrapped call; nodes, edges, and the event are committed together
    /// only after it succeeds. The wrapped call's error is returned untouched as
    /// [`TrackedError::Operation`].
    ///
    /// # Errors
    ///
    /// `Operation` when the wrapped computation fails; `Tracking` for
    /// validation, fingerprint, cycle, or state errors
    pub fn track<Op: TrackedOperation>(
        &self,
        mut op: Op,
    ) -> std::result::Result<Op::Output, TrackedError<Op::Error>> {
        let _span = debug_span!("track", operation = op.name()).entered();

        self.ensure_not_closed()?;
        op.validate(&self.config)?;
        self.start()?;
        let inputs = op.inputs(&self.fingerprinter)?;
        let output = op.execute()?;
        let plan = op.outputs(&self.fingerprinter, &inputs, &output)?;

        let mut tx = self.graph.transaction();
        self.ensure_not_closed()?;
        let input_refs: Vec<NodeRef> = inputs
            .into_iter()
            .map(|spec| tx.get_or_create_node(spec).node_ref())
            .collect();
        let output_refs: Vec<NodeRef> = plan
            .outputs
            .into_iter()
            .map(|spec| tx.get_or_create_node(spec).node_ref())
            .collect();
        for edge in &plan.edges {
            tx.add_edge(&edge.from, &edge.to, edge.operation)?;
        }
        let sequence = tx.record_event(op.name(), op.kind(), input_refs, output_refs);
        tx.commit();

        debug!(operation = op.name(), sequence, "tracked call recorded");
        Ok(output)
    }

    /// Wrap a transformer so its calls are tracked in this run
    pub const fn transformer<T: Transformer>(&self, inner: T) -> TrackedTransformer<'_, T> {
        TrackedTransformer::new(self, inner)
    }

    /// Wrap an estimator or pipeline so its calls are tracked in this run
    pub const fn estimator<E: Estimator>(&self, inner: E) -> TrackedEstimator<'_, E> {
        TrackedEstimator::new(self, inner)
    }

    /// Tracked deterministic split.
    ///
    /// # Errors
    ///
    /// `Configuration` for bad fractions (nothing runs), plus tracking errors
    pub fn random_split(
        &self,
        frame: &RecordBatch,
        fractions: &[f64],
        seed: u64,
    ) -> Result<Vec<RecordBatch>> {
        Ok(self.track(RandomSplit::new(frame, fractions, seed))?)
    }

    /// Tracked split preserving the value proportions of `column`.
    ///
    /// # Errors
    ///
    /// `Configuration` for bad fractions, `Schema` if `column` is missing
    pub fn random_split_stratified(
        &self,
        frame: &RecordBatch,
        fractions: &[f64],
        seed: u64,
        column: &str,
    ) -> Result<Vec<RecordBatch>> {
        Ok(self.track(RandomSplit::new(frame, fractions, seed).stratify_by(column))?)
    }

    /// Tracked projection keeping `columns` in the given order.
    ///
    /// # Errors
    ///
    /// `Schema` if a column is missing
    pub fn select_columns(&self, frame: &RecordBatch, columns: &[&str]) -> Result<RecordBatch> {
        let selection = ColumnSelection::Keep(columns.iter().map(ToString::to_string).collect());
        Ok(self.track(SelectColumns::new(frame, selection))?)
    }

    /// Tracked projection removing `columns`.
    ///
    /// # Errors
    ///
    /// `Schema` if a column is missing
    pub fn drop_columns(&self, frame: &RecordBatch, columns: &[&str]) -> Result<RecordBatch> {
        let selection = ColumnSelection::Drop(columns.iter().map(ToString::to_string).collect());
        Ok(self.track(SelectColumns::new(frame, selection))?)
    }

    /// Tracked metric over an evaluation frame produced by `model`.
    ///
    /// # Errors
    ///
    /// `Tracking(Schema)` if either column is missing (the metric never runs),
    /// `Operation` with the metric's own error
    pub fn compute_metric<M: Metric>(
        &self,
        metric: &M,
        model: &dyn Component,
        frame: &RecordBatch,
        prediction_column: &str,
        label_column: &str,
    ) -> std::result::Result<f64, TrackedError<M::Error>> {
        self.track(ComputeMetric::new(
            metric,
            model,
            frame,
            prediction_column,
            label_column,
        ))
    }

    /// Checkpoint of the last acknowledged sync
    #[must_use]
    pub fn synced_checkpoint(&self) -> GraphCheckpoint {
        *self.synced.lock()
    }

    /// Graph elements not yet acknowledged by the store
    #[must_use]
    pub fn pending_delta(&self) -> GraphDelta {
        self.graph.delta_since(self.synced_checkpoint())
    }

    /// Upload everything added since the last successful sync.
    ///
    /// Concurrent calls are serialized. The synced checkpoint moves forward
    /// only after the store accepts the batch; on failure the same delta is
    /// resent by the next call.
    ///
    /// Nodes the synced cache lists for this store are left out of the batch.
    /// If such a batch fails, those cache entries are dropped and the full
    /// delta is sent once more in the same call.
    ///
    /// # Errors
    ///
    /// Returns `Sync` when retries are exhausted or the store rejects the batch
    pub async fn sync<S: MetadataStore>(&self, client: &SyncClient<S>) -> Result<SyncReport> {
        let _gate = self.sync_gate.lock().await;
        let delta = self.pending_delta();
        if delta.is_empty() {
            debug!(run_id = %self.run_id(), "nothing to sync");
            return Ok(SyncReport::unchanged(delta.end, 0));
        }

        let store = client.store().identity();
        let skipped: Vec<NodeRef> = {
            let cache = self.cache.lock();
            delta
                .nodes
                .iter()
                .map(|n| n.node_ref())
                .filter(|r| cache.contains(&store, r))
                .collect()
        };
        let mut batch = self.batch(&delta, &skipped);
        let mut nodes_skipped = skipped.len();

        if batch.is_empty() {
            let checkpoint = self.advance(&store, &delta);
            return Ok(SyncReport::unchanged(checkpoint, nodes_skipped));
        }

        let mut failed_attempts = 0;
        let result = match client.push(&batch).await {
            Ok(result) => result,
            Err(e) if !skipped.is_empty() => {
                if let Error::Sync { attempts, .. } = &e {
                    failed_attempts = *attempts;
                }
                warn!(
                    run_id = %batch.run_id(),
                    %store,
                    skipped = skipped.len(),
                    error = %e,
                    "batch relying on synced cache failed, resending full delta"
                );
                self.forget_cached(&store, &skipped);
                batch = self.batch(&delta, &[]);
                nodes_skipped = 0;
                client.push(&batch).await?
            }
            Err(e) => return Err(e),
        };
        let checkpoint = self.advance(&store, &delta);
        info!(
            run_id = %batch.run_id(),
            nodes = batch.nodes.len(),
            edges = batch.edges.len(),
            events = batch.events.len(),
            "run synced"
        );

        Ok(SyncReport {
            batch_id: Some(result.batch_id),
            status: Some(result.status),
            nodes_sent: batch.nodes.len(),
            nodes_skipped,
            edges_sent: batch.edges.len(),
            events_sent: batch.events.len(),
            created: result.created,
            already_existed: result.already_existed,
            attempts: failed_attempts + result.attempts,
            checkpoint,
        })
    }

    fn batch(&self, delta: &GraphDelta, skipped: &[NodeRef]) -> SyncBatch {
        SyncBatch::from_delta(
            self.project.clone(),
            self.experiment.clone(),
            self.record(),
            delta,
            |node_ref| skipped.contains(node_ref),
        )
    }

    fn forget_cached(&self, store: &str, refs: &[NodeRef]) {
        let mut cache = self.cache.lock();
        if cache.forget(store, refs) > 0 {
            if let Err(e) = cache.persist() {
                warn!(error = %e, "failed to write synced cache");
            }
        }
    }

    /// Move the synced checkpoint to the end of an acknowledged delta and
    /// remember its nodes in the cache under `store`.
    fn advance(&self, store: &str, delta: &GraphDelta) -> GraphCheckpoint {
        let checkpoint = {
            let mut synced = self.synced.lock();
            *synced = synced.max(delta.end);
            *synced
        };

        let mut cache = self.cache.lock();
        if cache.extend(store, delta.nodes.iter().map(|n| n.node_ref())) > 0 {
            if let Err(e) = cache.persist() {
                warn!(error = %e, "failed to write synced cache");
            }
        }
        checkpoint
    }
}
