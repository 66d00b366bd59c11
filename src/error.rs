//! Error handling
//!
//! Three kinds of failure matter to the pipeline:
//! - `MalformedRecordError`: one bad telemetry record. Skip, count, continue.
//! - `TransientDependencyError`: a hiccup talking to an external service.
//!   Retried with backoff up to the configured budget.
//! - `FatalConfigError`: bad configuration or a dependency the task cannot
//!   live without. Aborts the affected task only.
//!
//! Per-record and per-document errors never escape their unit of work.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::logic::sync::cursor::CursorError;

pub type PipelineResult<T> = Result<T, PipelineError>;

// ============================================================================
// DEPENDENCIES
// ============================================================================

/// External services the pipeline consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    Telemetry,
    SearchIndex,
    Scorer,
    ContextGenerator,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Telemetry => "kismet",
            Dependency::SearchIndex => "elasticsearch",
            Dependency::Scorer => "scorer",
            Dependency::ContextGenerator => "ollama",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RECORD ERRORS
// ============================================================================

/// A raw telemetry record that cannot become a feature document
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed record [{hint}]: {reason}")]
pub struct MalformedRecordError {
    pub reason: String,
    /// Best available identification of the record (MAC, name, index)
    pub hint: String,
}

impl MalformedRecordError {
    pub fn new(reason: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            hint: hint.into(),
        }
    }
}

// ============================================================================
// DEPENDENCY ERRORS
// ============================================================================

/// Network or service hiccup worth retrying
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{service} unavailable: {message}")]
pub struct TransientDependencyError {
    pub service: Dependency,
    pub message: String,
}

/// Failure of a call into an external service
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DependencyError {
    #[error(transparent)]
    Transient(#[from] TransientDependencyError),

    #[error("{service} timed out after {after:?}")]
    Timeout { service: Dependency, after: Duration },

    #[error("{service} rejected the request (HTTP {status}): {message}")]
    Rejected {
        service: Dependency,
        status: u16,
        message: String,
    },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: Dependency, message: String },
}

impl DependencyError {
    pub fn transient(service: Dependency, message: impl Into<String>) -> Self {
        DependencyError::Transient(TransientDependencyError {
            service,
            message: message.into(),
        })
    }

    pub fn invalid(service: Dependency, message: impl Into<String>) -> Self {
        DependencyError::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status. 429 and 5xx are retryable.
    pub fn from_status(service: Dependency, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || status >= 500 {
            Self::transient(service, format!("HTTP {}: {}", status, body))
        } else {
            DependencyError::Rejected {
                service,
                status,
                message: body,
            }
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(service: Dependency, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::invalid(service, err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(service, status.as_u16(), err.to_string())
        } else {
            // connect, timeout, request body, redirect
            Self::transient(service, err.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DependencyError::Transient(_) | DependencyError::Timeout { .. }
        )
    }

    pub fn service(&self) -> Dependency {
        match self {
            DependencyError::Transient(e) => e.service,
            DependencyError::Timeout { service, .. }
            | DependencyError::Rejected { service, .. }
            | DependencyError::InvalidResponse { service, .. } => *service,
        }
    }

    /// Short machine-friendly kind, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            DependencyError::Transient(_) => "transient",
            DependencyError::Timeout { .. } => "timeout",
            DependencyError::Rejected { .. } => "rejected",
            DependencyError::InvalidResponse { .. } => "invalid_response",
        }
    }
}

// ============================================================================
// CONFIGURATION ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum FatalConfigError {
    #[error("invalid value for {option}: {reason}")]
    Invalid { option: &'static str, reason: String },

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("failed to load model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("{0} is disabled: {1}")]
    Disabled(&'static str, String),

    #[error("{service} unreachable at startup: {message}")]
    Unreachable { service: Dependency, message: String },

    #[error("failed to build HTTP client for {service}: {message}")]
    HttpClient { service: Dependency, message: String },
}

// ============================================================================
// PIPELINE ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    FatalConfig(#[from] FatalConfigError),

    #[error("sync cursor: {0}")]
    Cursor(#[from] CursorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TransientDependencyError> for PipelineError {
    fn from(err: TransientDependencyError) -> Self {
        PipelineError::Dependency(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(DependencyError::from_status(Dependency::SearchIndex, 503, "busy").is_transient());
        assert!(DependencyError::from_status(Dependency::SearchIndex, 429, "slow down").is_transient());

        let rejected = DependencyError::from_status(Dependency::SearchIndex, 400, "bad query");
        assert!(!rejected.is_transient());
        assert_eq!(rejected.kind(), "rejected");
        assert_eq!(rejected.service(), Dependency::SearchIndex);
    }

    #[test]
    fn test_timeout_is_transient() {
        let err = DependencyError::Timeout {
            service: Dependency::ContextGenerator,
            after: Duration::from_secs(1),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "ollama timed out after 1s");
    }

    #[test]
    fn test_malformed_display_carries_hint() {
        let err = MalformedRecordError::new("missing device identifier", "record #3");
        assert!(err.to_string().contains("record #3"));
    }
}
