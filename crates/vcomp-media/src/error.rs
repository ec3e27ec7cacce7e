//! Error types for composition and engine execution.

use std::time::Duration;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while compiling or executing a composition.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid composition: {0}")]
    InvalidComposition(String),

    #[error("Filter graph build failed: {message}")]
    GraphBuild {
        message: String,
        statement: Option<String>,
    },

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("FFmpeg command failed: {message}")]
    EngineFailed {
        message: String,
        stderr: String,
        exit_code: Option<i32>,
        filter_graph: Option<String>,
    },

    #[error("Engine timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("FFprobe command failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an invalid composition error.
    pub fn invalid_composition(message: impl Into<String>) -> Self {
        Self::InvalidComposition(message.into())
    }

    /// Create a graph build error, optionally naming the offending statement.
    pub fn graph_build(message: impl Into<String>, statement: Option<String>) -> Self {
        Self::GraphBuild {
            message: message.into(),
            statement,
        }
    }

    /// Create a spawn failure error.
    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    /// Create an engine failure error.
    pub fn engine_failed(
        message: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::EngineFailed {
            message: message.into(),
            stderr: stderr.into(),
            exit_code,
            filter_graph: None,
        }
    }

    /// Create a probe failure error.
    pub fn probe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            stderr,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attach the filter graph that was running when the engine failed.
    pub fn with_filter_graph(self, graph: &str) -> Self {
        match self {
            Self::EngineFailed {
                message,
                stderr,
                exit_code,
                ..
            } => Self::EngineFailed {
                message,
                stderr,
                exit_code,
                filter_graph: Some(graph.to_string()),
            },
            other => other,
        }
    }

    /// Stable name of the error kind, for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidComposition(_) => "invalid_composition",
            Self::GraphBuild { .. } => "graph_build",
            Self::Spawn { .. } => "spawn",
            Self::EngineFailed { .. } => "engine",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::ProbeFailed { .. } => "metadata_probe",
            Self::Cleanup(_) => "cleanup",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the error was raised before any process was spawned.
    pub fn is_pre_execution(&self) -> bool {
        matches!(self, Self::InvalidComposition(_) | Self::GraphBuild { .. })
    }
}
