//! Entity store abstraction and its in-memory implementation.
//!
//! The store is deliberately dumb: keyed collections plus id
//! allocators. Cascading deletes and reconciliation ordering live in
//! the layers above, so alternative backends only need to reproduce
//! these primitives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Analysis, AnalysisId, Cluster, ClusterId, Review, ReviewId, Stats};

/// Storage seam for the analysis lifecycle.
///
/// Contract:
/// - id allocation is atomic, strictly increasing per kind, and ids
///   are never reused even after deletion;
/// - `put_*` has upsert semantics;
/// - `delete_*` is idempotent (deleting a missing id is a no-op).
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Reserve the next analysis id.
    async fn next_analysis_id(&self) -> AnalysisId;
    /// Reserve the next globally unique review id.
    async fn next_review_id(&self) -> ReviewId;
    /// Reserve the next globally unique cluster id.
    async fn next_cluster_id(&self) -> ClusterId;

    async fn get_analysis(&self, id: AnalysisId) -> Option<Analysis>;
    async fn put_analysis(&self, analysis: Analysis);
    async fn delete_analysis(&self, id: AnalysisId) -> Option<Analysis>;
    async fn list_analyses(&self) -> Vec<Analysis>;
    /// Liveness check used to guard mutations against concurrent deletes.
    async fn contains_analysis(&self, id: AnalysisId) -> bool;
    /// Ids of all analyses currently in `Pending` status.
    async fn pending_analysis_ids(&self) -> Vec<AnalysisId>;

    /// Atomically transition a still-live, still-pending analysis to
    /// `done` with the given stats.
    ///
    /// The presence check and the write happen under one lock, so a
    /// record deleted by a concurrent caller can never be resurrected
    /// by the upsert. Returns whether the transition was applied;
    /// `false` means the record was missing or already terminal and
    /// nothing was written.
    async fn complete_analysis(&self, id: AnalysisId, stats: Stats) -> bool;
    /// Atomically transition a still-live, still-pending analysis to
    /// `failed` with the given message. Same contract as
    /// [`EntityStore::complete_analysis`].
    async fn fail_analysis(&self, id: AnalysisId, error: &str) -> bool;

    async fn get_review(&self, id: ReviewId) -> Option<Review>;
    async fn put_review(&self, review: Review);
    /// Atomically override a live review's sentiment label, forcing
    /// confidence to 1.0. Returns the updated record, or `None` when
    /// the review does not exist (a deleted review stays deleted).
    async fn update_review_sentiment(&self, id: ReviewId, sentiment: &str) -> Option<Review>;
    async fn reviews_for_analysis(&self, analysis_id: AnalysisId) -> Vec<Review>;
    async fn delete_reviews_for_analysis(&self, analysis_id: AnalysisId) -> usize;

    async fn get_cluster(&self, id: ClusterId) -> Option<Cluster>;
    async fn put_cluster(&self, cluster: Cluster);
    async fn clusters_for_analysis(&self, analysis_id: AnalysisId) -> Vec<Cluster>;
    async fn delete_clusters_for_analysis(&self, analysis_id: AnalysisId) -> usize;
}

/// In-memory store. All state is lost on restart.
pub struct MemoryStore {
    analyses: RwLock<HashMap<AnalysisId, Analysis>>,
    reviews: RwLock<HashMap<ReviewId, Review>>,
    clusters: RwLock<HashMap<ClusterId, Cluster>>,
    next_analysis_id: AtomicI64,
    next_review_id: AtomicI64,
    next_cluster_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            analyses: RwLock::new(HashMap::new()),
            reviews: RwLock::new(HashMap::new()),
            clusters: RwLock::new(HashMap::new()),
            next_analysis_id: AtomicI64::new(1),
            next_review_id: AtomicI64::new(1),
            next_cluster_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn next_analysis_id(&self) -> AnalysisId {
        AnalysisId(self.next_analysis_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn next_review_id(&self) -> ReviewId {
        ReviewId(self.next_review_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn next_cluster_id(&self) -> ClusterId {
        ClusterId(self.next_cluster_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn get_analysis(&self, id: AnalysisId) -> Option<Analysis> {
        let analyses = self.analyses.read().await;
        analyses.get(&id).cloned()
    }

    async fn put_analysis(&self, analysis: Analysis) {
        let mut analyses = self.analyses.write().await;
        analyses.insert(analysis.id, analysis);
    }

    async fn delete_analysis(&self, id: AnalysisId) -> Option<Analysis> {
        let mut analyses = self.analyses.write().await;
        analyses.remove(&id)
    }

    async fn list_analyses(&self) -> Vec<Analysis> {
        let analyses = self.analyses.read().await;
        analyses.values().cloned().collect()
    }

    async fn contains_analysis(&self, id: AnalysisId) -> bool {
        let analyses = self.analyses.read().await;
        analyses.contains_key(&id)
    }

    async fn pending_analysis_ids(&self) -> Vec<AnalysisId> {
        let analyses = self.analyses.read().await;
        analyses
            .values()
            .filter(|a| !a.status.is_terminal())
            .map(|a| a.id)
            .collect()
    }

    async fn complete_analysis(&self, id: AnalysisId, stats: Stats) -> bool {
        let mut analyses = self.analyses.write().await;
        match analyses.get_mut(&id) {
            Some(analysis) if !analysis.status.is_terminal() => {
                analysis.complete(stats);
                true
            }
            _ => false,
        }
    }

    async fn fail_analysis(&self, id: AnalysisId, error: &str) -> bool {
        let mut analyses = self.analyses.write().await;
        match analyses.get_mut(&id) {
            Some(analysis) if !analysis.status.is_terminal() => {
                analysis.fail(error);
                true
            }
            _ => false,
        }
    }

    async fn get_review(&self, id: ReviewId) -> Option<Review> {
        let reviews = self.reviews.read().await;
        reviews.get(&id).cloned()
    }

    async fn put_review(&self, review: Review) {
        let mut reviews = self.reviews.write().await;
        reviews.insert(review.id, review);
    }

    async fn update_review_sentiment(&self, id: ReviewId, sentiment: &str) -> Option<Review> {
        let mut reviews = self.reviews.write().await;
        let review = reviews.get_mut(&id)?;
        review.sentiment = sentiment.to_string();
        review.confidence = 1.0;
        Some(review.clone())
    }

    async fn reviews_for_analysis(&self, analysis_id: AnalysisId) -> Vec<Review> {
        let reviews = self.reviews.read().await;
        reviews
            .values()
            .filter(|r| r.analysis_id == analysis_id)
            .cloned()
            .collect()
    }

    async fn delete_reviews_for_analysis(&self, analysis_id: AnalysisId) -> usize {
        let mut reviews = self.reviews.write().await;
        let before = reviews.len();
        reviews.retain(|_, r| r.analysis_id != analysis_id);
        before - reviews.len()
    }

    async fn get_cluster(&self, id: ClusterId) -> Option<Cluster> {
        let clusters = self.clusters.read().await;
        clusters.get(&id).cloned()
    }

    async fn put_cluster(&self, cluster: Cluster) {
        let mut clusters = self.clusters.write().await;
        clusters.insert(cluster.id, cluster);
    }

    async fn clusters_for_analysis(&self, analysis_id: AnalysisId) -> Vec<Cluster> {
        let clusters = self.clusters.read().await;
        clusters
            .values()
            .filter(|c| c.analysis_id == analysis_id)
            .cloned()
            .collect()
    }

    async fn delete_clusters_for_analysis(&self, analysis_id: AnalysisId) -> usize {
        let mut clusters = self.clusters.write().await;
        let before = clusters.len();
        clusters.retain(|_, c| c.analysis_id != analysis_id);
        before - clusters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisStatus, Coords, Stats, TaskToken};
    use proptest::prelude::*;

    fn pending_analysis(id: AnalysisId) -> Analysis {
        Analysis::pending(id, "data.csv", TaskToken::from(format!("analysis-{}", id)))
    }

    fn review_for(id: ReviewId, analysis_id: AnalysisId) -> Review {
        Review {
            id,
            analysis_id,
            source_id: format!("src-{}", id),
            text: "fine".to_string(),
            sentiment: "neutral".to_string(),
            confidence: 0.5,
            cluster_id: 0,
            coords: Coords::default(),
        }
    }

    #[tokio::test]
    async fn test_id_allocation_is_strictly_increasing() {
        let store = MemoryStore::new();

        let a = store.next_analysis_id().await;
        let b = store.next_analysis_id().await;
        let c = store.next_analysis_id().await;

        assert!(a < b && b < c);
        assert_eq!(a, AnalysisId(1));
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = MemoryStore::new();

        let id = store.next_analysis_id().await;
        store.put_analysis(pending_analysis(id)).await;
        store.delete_analysis(id).await;

        let next = store.next_analysis_id().await;
        assert!(next > id, "deleted ids must never be handed out again");
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let store = MemoryStore::new();
        assert!(store.get_analysis(AnalysisId(42)).await.is_none());
        assert!(store.get_review(ReviewId(42)).await.is_none());
        assert!(store.get_cluster(ClusterId(42)).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryStore::new();
        assert!(store.delete_analysis(AnalysisId(1)).await.is_none());
        assert_eq!(store.delete_reviews_for_analysis(AnalysisId(1)).await, 0);
        assert_eq!(store.delete_clusters_for_analysis(AnalysisId(1)).await, 0);
    }

    #[tokio::test]
    async fn test_put_is_upsert() {
        let store = MemoryStore::new();
        let id = store.next_analysis_id().await;

        let mut analysis = pending_analysis(id);
        store.put_analysis(analysis.clone()).await;
        assert_eq!(
            store.get_analysis(id).await.unwrap().status,
            AnalysisStatus::Pending
        );

        analysis.complete(Stats::default());
        store.put_analysis(analysis).await;
        assert_eq!(
            store.get_analysis(id).await.unwrap().status,
            AnalysisStatus::Done
        );
        assert_eq!(store.list_analyses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_analysis_ids_excludes_terminal() {
        let store = MemoryStore::new();

        let pending_id = store.next_analysis_id().await;
        store.put_analysis(pending_analysis(pending_id)).await;

        let done_id = store.next_analysis_id().await;
        let mut done = pending_analysis(done_id);
        done.complete(Stats::default());
        store.put_analysis(done).await;

        let failed_id = store.next_analysis_id().await;
        let mut failed = pending_analysis(failed_id);
        failed.fail("boom");
        store.put_analysis(failed).await;

        assert_eq!(store.pending_analysis_ids().await, vec![pending_id]);
    }

    #[tokio::test]
    async fn test_complete_analysis_requires_live_pending_record() {
        let store = MemoryStore::new();

        // Missing record: nothing to transition, nothing written.
        assert!(!store.complete_analysis(AnalysisId(9), Stats::default()).await);
        assert!(store.get_analysis(AnalysisId(9)).await.is_none());

        let id = store.next_analysis_id().await;
        store.put_analysis(pending_analysis(id)).await;

        let stats = Stats {
            total: 2,
            positive: 1,
            negative: 1,
            neutral: 0,
        };
        assert!(store.complete_analysis(id, stats).await);
        let analysis = store.get_analysis(id).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Done);
        assert_eq!(analysis.stats, Some(stats));
        assert!(analysis.task_token.is_none());

        // Terminal records have no outgoing transitions.
        assert!(!store.complete_analysis(id, Stats::default()).await);
        assert!(!store.fail_analysis(id, "late failure").await);
        let analysis = store.get_analysis(id).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Done);
        assert_eq!(analysis.stats, Some(stats));
    }

    #[tokio::test]
    async fn test_fail_analysis_requires_live_pending_record() {
        let store = MemoryStore::new();

        assert!(!store.fail_analysis(AnalysisId(9), "boom").await);
        assert!(store.get_analysis(AnalysisId(9)).await.is_none());

        let id = store.next_analysis_id().await;
        store.put_analysis(pending_analysis(id)).await;

        assert!(store.fail_analysis(id, "bad csv").await);
        let analysis = store.get_analysis(id).await.unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert_eq!(analysis.error.as_deref(), Some("bad csv"));
        assert!(analysis.task_token.is_none());

        assert!(!store.complete_analysis(id, Stats::default()).await);
        assert_eq!(
            store.get_analysis(id).await.unwrap().status,
            AnalysisStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_update_review_sentiment_skips_missing_review() {
        let store = MemoryStore::new();

        // A deleted review stays deleted.
        assert!(store
            .update_review_sentiment(ReviewId(5), "positive")
            .await
            .is_none());
        assert!(store.get_review(ReviewId(5)).await.is_none());

        store.put_review(review_for(ReviewId(5), AnalysisId(1))).await;
        let updated = store
            .update_review_sentiment(ReviewId(5), "positive")
            .await
            .unwrap();
        assert_eq!(updated.sentiment, "positive");
        assert_eq!(updated.confidence, 1.0);
        assert_eq!(
            store.get_review(ReviewId(5)).await.unwrap().sentiment,
            "positive"
        );
    }

    #[tokio::test]
    async fn test_reviews_scoped_to_owning_analysis() {
        let store = MemoryStore::new();
        let a1 = AnalysisId(1);
        let a2 = AnalysisId(2);

        store.put_review(review_for(ReviewId(1), a1)).await;
        store.put_review(review_for(ReviewId(2), a1)).await;
        store.put_review(review_for(ReviewId(3), a2)).await;

        assert_eq!(store.reviews_for_analysis(a1).await.len(), 2);
        assert_eq!(store.reviews_for_analysis(a2).await.len(), 1);

        assert_eq!(store.delete_reviews_for_analysis(a1).await, 2);
        assert!(store.reviews_for_analysis(a1).await.is_empty());
        // The other analysis's rows survive.
        assert_eq!(store.reviews_for_analysis(a2).await.len(), 1);
        assert!(store.get_review(ReviewId(3)).await.is_some());
    }

    proptest! {
        /// Property: after any interleaving of allocations across the
        /// three kinds, each kind's ids are pairwise distinct and
        /// strictly increasing in allocation order.
        #[test]
        fn allocation_order_is_monotonic(kinds in proptest::collection::vec(0u8..3, 1..64)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = MemoryStore::new();
                let mut analysis_ids = Vec::new();
                let mut review_ids = Vec::new();
                let mut cluster_ids = Vec::new();

                for kind in &kinds {
                    match kind {
                        0 => analysis_ids.push(store.next_analysis_id().await.0),
                        1 => review_ids.push(store.next_review_id().await.0),
                        _ => cluster_ids.push(store.next_cluster_id().await.0),
                    }
                }

                for ids in [&analysis_ids, &review_ids, &cluster_ids] {
                    for pair in ids.windows(2) {
                        assert!(pair[0] < pair[1], "ids must be strictly increasing: {:?}", ids);
                    }
                }
            });
        }
    }
}
