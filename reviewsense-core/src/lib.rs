//! Core of the sentiment-analysis backend: the analysis job lifecycle
//! and result-reconciliation engine.
//!
//! An uploaded dataset becomes a pending [`types::Analysis`] tied to
//! an opaque broker task handle. Reads of pending analyses lazily
//! drive the [`reconciler::Reconciler`], which turns a finished
//! worker payload into [`types::Review`] and [`types::Cluster`] rows
//! plus aggregate [`types::Stats`] exactly once.
//!
//! The HTTP layer and the broker client live in `reviewsense-server`;
//! this crate only sees the [`store::EntityStore`] and
//! [`dispatcher::TaskDispatcher`] seams.

pub mod dispatcher;
pub mod error;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod types;
pub mod worker;

pub use dispatcher::{TaskDispatcher, TaskHandle};
pub use error::ServiceError;
pub use service::AnalysisService;
pub use store::{EntityStore, MemoryStore};
pub use types::{
    Analysis, AnalysisId, AnalysisStatus, Cluster, ClusterId, Coords, Review, ReviewId, Stats,
    TaskToken,
};
