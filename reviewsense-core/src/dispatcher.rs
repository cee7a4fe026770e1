//! Task dispatcher boundary.
//!
//! The core never sees broker internals. It hands a payload plus a
//! correlation token to a [`TaskDispatcher`] and gets back an opaque
//! [`TaskHandle`] with exactly three capabilities: a non-blocking
//! readiness probe, a one-shot result fetch, and a release.

use anyhow::Result;
use async_trait::async_trait;

/// Submits work to the external worker pool through the broker.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    /// Submit a payload for asynchronous processing.
    ///
    /// `correlation_token` is a caller-chosen identifier of the form
    /// `analysis-<id>` that the worker echoes back; it lets operators
    /// tie broker-side tasks to analysis records.
    ///
    /// An error here means the broker rejected the submission; the
    /// caller must not create any record for the failed attempt.
    async fn dispatch(&self, payload: &[u8], correlation_token: &str)
        -> Result<Box<dyn TaskHandle>>;
}

/// Opaque reference to one in-flight asynchronous task.
///
/// Usage discipline, enforced by the reconciler:
/// - `fetch` may only be called after `is_ready` has returned `true`,
///   and at most once per handle;
/// - `release` must run on every path that reaches a terminal
///   analysis status, and when a pending analysis is deleted.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    /// Non-blocking readiness probe.
    ///
    /// An `Err` is a transient broker failure, not task failure: the
    /// caller should leave the task pending and probe again later.
    async fn is_ready(&mut self) -> Result<bool>;

    /// Retrieve the worker's result payload.
    async fn fetch(&mut self) -> Result<serde_json::Value>;

    /// Best-effort cleanup of broker-side result state.
    async fn release(&mut self);
}
