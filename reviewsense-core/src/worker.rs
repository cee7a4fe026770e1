//! Worker payload envelopes and classification.
//!
//! A fetched payload is classified in strict priority order: worker
//! error envelope, then structural validation of the success envelope,
//! then the success envelope's own status field. Ambiguous payloads
//! fail closed; nothing is materialized from a payload that does not
//! fully validate.

use serde::Deserialize;
use serde_json::Value;

/// Success envelope produced by the worker.
///
/// All three fields are required: a payload missing any of them is
/// treated as malformed rather than zero-filled, so a truncated result
/// can never materialize as an empty-but-done analysis.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerResult {
    pub status: String,
    pub reviews: Vec<WorkerReview>,
    pub clusters: Vec<WorkerCluster>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerReview {
    pub source_id: String,
    pub text: String,
    pub sentiment: String,
    pub confidence: f64,
    pub cluster_id: i64,
    pub coords: WorkerCoords,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkerCoords {
    pub x: f64,
    pub y: f64,
}

/// One cluster as reported by the worker. `id` is the per-analysis
/// ordinal that the worker's reviews reference via `cluster_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerCluster {
    pub id: i64,
    pub title: String,
    pub summary: String,
}

/// Error envelope: `{"status": "error", "message": "..."}`.
///
/// Fields are permissive so that any JSON object deserializes; the
/// envelope only counts as an error when `status` is exactly `"error"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct WorkerErrorEnvelope {
    status: String,
    message: String,
}

/// Classified worker payload.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Fully validated success payload, safe to materialize.
    Success(WorkerResult),
    /// Worker-reported or structural failure; the message becomes the
    /// analysis's terminal error.
    Failure { message: String },
}

/// Classify a raw worker payload.
pub fn classify_payload(payload: &Value) -> WorkerOutcome {
    // Error envelope first: an object carrying status == "error" wins
    // regardless of whatever else it contains.
    if let Ok(envelope) = serde_json::from_value::<WorkerErrorEnvelope>(payload.clone()) {
        if envelope.status == "error" {
            let message = if envelope.message.is_empty() {
                "worker processing failed".to_string()
            } else {
                envelope.message
            };
            return WorkerOutcome::Failure { message };
        }
    }

    let result = match serde_json::from_value::<WorkerResult>(payload.clone()) {
        Ok(result) => result,
        Err(_) => {
            return WorkerOutcome::Failure {
                message: "invalid worker result".to_string(),
            }
        }
    };

    // Defensive re-check of the success envelope's own status field.
    if result.status == "error" {
        return WorkerOutcome::Failure {
            message: "worker processing failed".to_string(),
        };
    }

    WorkerOutcome::Success(result)
}
