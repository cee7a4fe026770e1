//! Result reconciler: the one-time transition from a pending analysis
//! to a terminal state.
//!
//! Reconciliation is lazy: it runs only when a caller reads a pending
//! analysis, never on a timer. At-most-once materialization is carried
//! by the handle table: an attempt *claims* the handle by removing it
//! from the table, so a concurrent attempt on the same analysis finds
//! no handle and no-ops. Transient outcomes (broker poll error, task
//! not ready) put the handle back; terminal outcomes release it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::dispatcher::TaskHandle;
use crate::store::EntityStore;
use crate::types::{AnalysisId, Cluster, Coords, Review, Stats};
use crate::worker::{classify_payload, WorkerOutcome, WorkerResult};

pub struct Reconciler {
    store: Arc<dyn EntityStore>,
    handles: Mutex<HashMap<AnalysisId, Box<dyn TaskHandle>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Associate a freshly dispatched task handle with its analysis.
    pub async fn register(&self, id: AnalysisId, handle: Box<dyn TaskHandle>) {
        let mut handles = self.handles.lock().await;
        handles.insert(id, handle);
    }

    /// Drop and release any outstanding handle for an analysis.
    ///
    /// Called when a pending analysis is deleted. Does not wait for
    /// the task to become ready; any reconciliation attempt that was
    /// mid-flight will notice the missing record and write nothing.
    pub async fn discard(&self, id: AnalysisId) {
        let handle = {
            let mut handles = self.handles.lock().await;
            handles.remove(&id)
        };
        if let Some(mut handle) = handle {
            handle.release().await;
            info!("Released outstanding task handle for analysis {}", id);
        }
    }

    /// Attempt the `pending -> done/failed` transition for one analysis.
    ///
    /// No-op when the analysis has no associated handle (already
    /// reconciled, currently being reconciled by a concurrent call, or
    /// deleted), when the broker cannot be polled, or when the task is
    /// simply not finished yet.
    pub async fn reconcile(&self, id: AnalysisId) {
        // Claim the handle. Holding it outside the table is what makes
        // this transition run at most once per analysis.
        let claimed = {
            let mut handles = self.handles.lock().await;
            handles.remove(&id)
        };
        let Some(mut handle) = claimed else {
            return;
        };

        if !self.store.contains_analysis(id).await {
            // Deleted after the handle was registered.
            handle.release().await;
            return;
        }

        let ready = match handle.is_ready().await {
            Ok(ready) => ready,
            Err(e) => {
                // Transient broker failure: stay pending, retry on the
                // next read.
                warn!("Error checking task ready status for analysis {}: {}", id, e);
                self.restore_or_release(id, handle).await;
                return;
            }
        };

        if !ready {
            self.restore_or_release(id, handle).await;
            return;
        }

        let payload = match handle.fetch().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Error getting task result for analysis {}: {}", id, e);
                self.mark_failed(id, format!("failed to get result: {}", e))
                    .await;
                handle.release().await;
                return;
            }
        };

        match classify_payload(&payload) {
            WorkerOutcome::Failure { message } => {
                warn!("Worker result for analysis {} failed: {}", id, message);
                self.mark_failed(id, message).await;
            }
            WorkerOutcome::Success(result) => {
                self.materialize(id, result).await;
            }
        }
        handle.release().await;
    }

    /// Put a handle back after a transient outcome, unless the
    /// analysis was deleted in the meantime.
    async fn restore_or_release(&self, id: AnalysisId, mut handle: Box<dyn TaskHandle>) {
        if !self.store.contains_analysis(id).await {
            handle.release().await;
            return;
        }
        {
            let mut handles = self.handles.lock().await;
            handles.insert(id, handle);
        }
        // A delete that ran between the liveness check and the insert
        // found no handle to discard, so re-check now that the handle
        // is back in the table.
        if !self.store.contains_analysis(id).await {
            self.discard(id).await;
        }
    }

    /// Terminal transition to `failed`. The store applies the
    /// transition only to a live, still-pending record, so a deleted
    /// or already-terminal analysis is left untouched.
    async fn mark_failed(&self, id: AnalysisId, message: String) {
        if !self.store.fail_analysis(id, &message).await {
            info!(
                "Analysis {} was deleted or already terminal, dropping failure: {}",
                id, message
            );
        }
    }

    /// Materialize a validated success payload: review and cluster
    /// rows, aggregate stats, and the `done` transition.
    async fn materialize(&self, id: AnalysisId, result: WorkerResult) {
        if !self.store.contains_analysis(id).await {
            return;
        }

        let mut stats = Stats::default();
        for wr in result.reviews {
            let review_id = self.store.next_review_id().await;
            stats.tally(&wr.sentiment);
            self.store
                .put_review(Review {
                    id: review_id,
                    analysis_id: id,
                    source_id: wr.source_id,
                    text: wr.text,
                    sentiment: wr.sentiment,
                    confidence: wr.confidence,
                    cluster_id: wr.cluster_id,
                    coords: Coords {
                        x: wr.coords.x,
                        y: wr.coords.y,
                    },
                })
                .await;
        }

        for wc in result.clusters {
            let cluster_id = self.store.next_cluster_id().await;
            self.store
                .put_cluster(Cluster {
                    id: cluster_id,
                    ordinal: wc.id,
                    analysis_id: id,
                    title: wc.title,
                    summary: wc.summary,
                })
                .await;
        }

        // The store checks for a live, still-pending record and writes
        // the transition under one lock, so a concurrent delete can
        // never be overwritten by a stale copy of the record.
        if self.store.complete_analysis(id, stats).await {
            info!(
                "Analysis {} done: {} reviews, {} recognized sentiments",
                id,
                stats.total,
                stats.positive + stats.negative + stats.neutral
            );
        } else {
            // Deleted while rows were being written: take the orphaned
            // rows back out so the collections stay mutually
            // consistent.
            self.store.delete_reviews_for_analysis(id).await;
            self.store.delete_clusters_for_analysis(id).await;
        }
    }
}
