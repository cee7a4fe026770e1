//! Lifecycle facade: the operations the HTTP layer invokes.
//!
//! Reads of pending analyses trigger lazy reconciliation; nothing in
//! here blocks on worker completion.

use std::sync::Arc;

use tracing::info;

use crate::dispatcher::TaskDispatcher;
use crate::error::ServiceError;
use crate::reconciler::Reconciler;
use crate::store::EntityStore;
use crate::types::{Analysis, AnalysisId, Cluster, ClusterId, Review, ReviewId, TaskToken};

pub struct AnalysisService {
    store: Arc<dyn EntityStore>,
    dispatcher: Arc<dyn TaskDispatcher>,
    reconciler: Reconciler,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn EntityStore>, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        let reconciler = Reconciler::new(store.clone());
        Self {
            store,
            dispatcher,
            reconciler,
        }
    }

    /// Submit an uploaded dataset for asynchronous analysis.
    ///
    /// Dispatches first and only then creates the pending record, so a
    /// rejected submission leaves no orphan behind.
    pub async fn submit(
        &self,
        payload: &[u8],
        filename: &str,
    ) -> Result<Analysis, ServiceError> {
        let id = self.store.next_analysis_id().await;
        let token = TaskToken(format!("analysis-{}", id));

        let handle = self
            .dispatcher
            .dispatch(payload, &token.0)
            .await
            .map_err(|e| ServiceError::DispatchUnavailable {
                error: e.to_string(),
            })?;

        let analysis = Analysis::pending(id, filename, token);
        self.store.put_analysis(analysis.clone()).await;
        self.reconciler.register(id, handle).await;

        info!("Submitted analysis {} ({})", id, filename);
        Ok(analysis)
    }

    /// Fetch one analysis, reconciling it first if still pending.
    pub async fn get(&self, id: AnalysisId) -> Result<Analysis, ServiceError> {
        let analysis = self
            .store
            .get_analysis(id)
            .await
            .ok_or(ServiceError::NotFound)?;

        if analysis.status.is_terminal() {
            return Ok(analysis);
        }

        self.reconciler.reconcile(id).await;
        self.store
            .get_analysis(id)
            .await
            .ok_or(ServiceError::NotFound)
    }

    /// List all analyses, reconciling every pending one first.
    ///
    /// Read-your-writes within the call; no ordering guarantee across
    /// calls.
    pub async fn list(&self) -> Vec<Analysis> {
        for id in self.store.pending_analysis_ids().await {
            self.reconciler.reconcile(id).await;
        }
        self.store.list_analyses().await
    }

    /// Delete an analysis and everything it owns.
    ///
    /// Idempotent; releases any outstanding task handle without
    /// waiting for it to become ready.
    pub async fn delete(&self, id: AnalysisId) {
        self.reconciler.discard(id).await;
        let removed = self.store.delete_analysis(id).await;
        let reviews = self.store.delete_reviews_for_analysis(id).await;
        let clusters = self.store.delete_clusters_for_analysis(id).await;
        if removed.is_some() {
            info!(
                "Deleted analysis {} ({} reviews, {} clusters)",
                id, reviews, clusters
            );
        }
    }

    /// All reviews owned by one analysis.
    pub async fn reviews_for(&self, id: AnalysisId) -> Vec<Review> {
        self.store.reviews_for_analysis(id).await
    }

    pub async fn get_review(&self, id: ReviewId) -> Result<Review, ServiceError> {
        self.store.get_review(id).await.ok_or(ServiceError::NotFound)
    }

    /// Manually override a review's sentiment label.
    ///
    /// Confidence is forced to 1.0 as the override marker; every other
    /// field is left untouched. The store applies the update only to a
    /// review that still exists, so a concurrent cascade delete cannot
    /// be undone by a stale copy of the row.
    pub async fn set_review_sentiment(
        &self,
        id: ReviewId,
        sentiment: String,
    ) -> Result<Review, ServiceError> {
        self.store
            .update_review_sentiment(id, &sentiment)
            .await
            .ok_or(ServiceError::NotFound)
    }

    /// All clusters owned by one analysis.
    pub async fn clusters_for(&self, id: AnalysisId) -> Vec<Cluster> {
        self.store.clusters_for_analysis(id).await
    }

    pub async fn get_cluster(&self, id: ClusterId) -> Result<Cluster, ServiceError> {
        self.store.get_cluster(id).await.ok_or(ServiceError::NotFound)
    }
}
