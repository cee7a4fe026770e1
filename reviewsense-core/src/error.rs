//! Error taxonomy for the lifecycle facade.

use std::fmt;

/// Failures surfaced by [`crate::service::AnalysisService`] operations.
///
/// Transient broker errors during readiness polling are deliberately
/// absent: they are swallowed by the reconciler and retried on the
/// next read, never shown to callers.
#[derive(Debug)]
pub enum ServiceError {
    /// The requested record does not exist.
    NotFound,
    /// The broker rejected a task submission; no analysis was created.
    DispatchUnavailable { error: String },
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::DispatchUnavailable { error } => {
                write!(f, "failed to send task: {}", error)
            }
        }
    }
}

impl std::error::Error for ServiceError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(ServiceError::NotFound.to_string(), "not found");
        assert_eq!(
            ServiceError::DispatchUnavailable {
                error: "broker down".to_string()
            }
            .to_string(),
            "failed to send task: broker down"
        );
    }
}
