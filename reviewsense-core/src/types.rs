//! Domain records for the analysis lifecycle.
//!
//! Identifiers are newtyped to keep the three id spaces from mixing.
//! Each serializes transparently as a plain JSON integer, so the wire
//! format stays `{"id": 3, ...}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a submitted analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(pub i64);

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AnalysisId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Globally unique identifier of a materialized review row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(pub i64);

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReviewId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Globally unique identifier of a cluster row.
///
/// Distinct from the worker-supplied per-analysis ordinal carried in
/// [`Cluster::ordinal`]; see the cluster docs for which one
/// `Review::cluster_id` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(pub i64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ClusterId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Opaque correlation token tying an analysis to its in-flight broker task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskToken(pub String);

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Processing status of an analysis.
///
/// Transitions only ever go `Pending -> Done` or `Pending -> Failed`;
/// the terminal states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate sentiment counts for one completed analysis.
///
/// `total` is the number of review rows materialized. Reviews whose
/// sentiment label is not one of positive/negative/neutral still count
/// toward `total` but toward none of the three tallies, so
/// `positive + negative + neutral <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub neutral: u64,
}

impl Stats {
    /// Count one review's sentiment label.
    pub fn tally(&mut self, sentiment: &str) {
        self.total += 1;
        match sentiment {
            "positive" => self.positive += 1,
            "negative" => self.negative += 1,
            "neutral" => self.neutral += 1,
            _ => {}
        }
    }
}

/// One submitted dataset and its processing job record.
///
/// Invariant once terminal: exactly one of `error` (failed) or `stats`
/// (done) is present. Both are absent while pending. `task_token` is
/// present only while pending and is cleared on any terminal
/// transition.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub id: AnalysisId,
    pub status: AnalysisStatus,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
    pub stats: Option<Stats>,
    #[serde(skip)]
    pub task_token: Option<TaskToken>,
}

impl Analysis {
    /// A freshly submitted, still-pending analysis.
    pub fn pending(id: AnalysisId, filename: impl Into<String>, task_token: TaskToken) -> Self {
        Self {
            id,
            status: AnalysisStatus::Pending,
            filename: filename.into(),
            created_at: Utc::now(),
            error: None,
            stats: None,
            task_token: Some(task_token),
        }
    }

    /// Terminal transition to `done` with aggregate stats.
    pub fn complete(&mut self, stats: Stats) {
        self.status = AnalysisStatus::Done;
        self.stats = Some(stats);
        self.error = None;
        self.task_token = None;
    }

    /// Terminal transition to `failed` with a human-readable message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = AnalysisStatus::Failed;
        self.error = Some(error.into());
        self.stats = None;
        self.task_token = None;
    }
}

/// 2-D embedding position of a review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub x: f64,
    pub y: f64,
}

/// A single analyzed review row, owned by exactly one analysis.
///
/// `cluster_id` is the worker-supplied per-analysis cluster ordinal,
/// not a global [`ClusterId`]: resolve the cluster by joining on
/// `(analysis_id, ordinal)`.
#[derive(Debug, Clone, Serialize)]
pub struct Review {
    pub id: ReviewId,
    pub analysis_id: AnalysisId,
    pub source_id: String,
    pub text: String,
    pub sentiment: String,
    pub confidence: f64,
    pub cluster_id: i64,
    pub coords: Coords,
}

/// A worker-generated cluster label, owned by exactly one analysis.
///
/// `id` is the globally allocated identifier; `ordinal` is the
/// worker's per-analysis cluster number (serialized under its original
/// wire name `cluster_id`), which is what reviews reference.
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    #[serde(rename = "cluster_id")]
    pub ordinal: i64,
    pub analysis_id: AnalysisId,
    pub title: String,
    pub summary: String,
}
