//! Structured request logging utilities.
//!
//! Every composition request gets a [`RequestLogger`] that tags events with
//! the request ID and the pipeline phase it is in.

use tracing::{error, info, warn, Span};
use uuid::Uuid;

use crate::error::MediaError;

/// Phases of a single execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    StagingInputs,
    Running,
    ExtractingMetadata,
    Done,
    Failed,
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Idle => "idle",
            RequestPhase::StagingInputs => "staging_inputs",
            RequestPhase::Running => "running",
            RequestPhase::ExtractingMetadata => "extracting_metadata",
            RequestPhase::Done => "done",
            RequestPhase::Failed => "failed",
        }
    }
}

/// Request logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    request_id: String,
    operation: String,
}

impl RequestLogger {
    /// Create a logger with a fresh random request ID.
    pub fn new(operation: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().simple().to_string(),
            operation: operation.to_string(),
        }
    }

    /// Log a phase transition.
    pub fn log_phase(&self, phase: RequestPhase, message: &str) {
        info!(
            request_id = %self.request_id,
            operation = %self.operation,
            phase = phase.as_str(),
            "{}", message
        );
    }

    /// Log a non-fatal problem.
    pub fn log_warning(&self, message: &str) {
        warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            "{}", message
        );
    }

    /// Log the terminal failure of a request.
    pub fn log_failure(&self, err: &MediaError) {
        error!(
            request_id = %self.request_id,
            operation = %self.operation,
            phase = RequestPhase::Failed.as_str(),
            error_kind = err.kind(),
            "Request failed: {}", err
        );
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this request.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "compose_request",
            request_id = %self.request_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestLogger::new("compose");
        let b = RequestLogger::new("compose");
        assert_ne!(a.request_id(), b.request_id());
        assert_eq!(a.request_id().len(), 32);
        assert_eq!(a.operation(), "compose");
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(RequestPhase::StagingInputs.as_str(), "staging_inputs");
        assert_eq!(RequestPhase::ExtractingMetadata.as_str(), "extracting_metadata");
    }
}
