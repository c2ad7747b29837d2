//! Error types for the Inkweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] composes them
//! into the taxonomy the orchestrator reports to callers.

use crate::attempt::FailureReport;
use crate::thread::ThreadStatus;
use thiserror::Error;

/// The top-level error type for all Inkweave pipeline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Quality gate failures (retried in place) ---
    #[error(
        "Continuity gate failed after {} attempts: {}",
        .0.attempts,
        .0.summary()
    )]
    ContinuityFailure(Box<FailureReport>),

    #[error(
        "Detectability gate failed after {} attempts: score {:.1} above threshold {:.1}",
        .0.attempts,
        .0.detectability_score,
        .0.detectability_threshold
    )]
    DetectabilityFailure(Box<FailureReport>),

    // --- Generation service (retried in place) ---
    #[error("Generation service failed after {attempts} attempts: {source}")]
    GenerationServiceFailure {
        attempts: u32,
        #[source]
        source: ServiceError,
        /// The last attempt that reached evaluation, if any did.
        last_evaluated: Option<Box<FailureReport>>,
    },

    // --- Propagated immediately ---
    #[error("Storage write failed: {0}")]
    StorageWriteFailure(#[source] StoreError),

    #[error("Configuration error: {message}")]
    ConfigurationFailure { message: String },

    #[error("Continuity window unavailable: {0}")]
    ContextUnavailable(#[source] StoreError),

    #[error("Invalid thread update: {0}")]
    InvalidThreadTransition(#[from] ThreadTransitionError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// The failure report carried by quality-gate and service failures.
    pub fn report(&self) -> Option<&FailureReport> {
        match self {
            Self::ContinuityFailure(report) | Self::DetectabilityFailure(report) => Some(report),
            Self::GenerationServiceFailure { last_evaluated, .. } => last_evaluated.as_deref(),
            _ => None,
        }
    }

    /// Whether the orchestrator treats this failure as retryable in place.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ContinuityFailure(_)
                | Self::DetectabilityFailure(_)
                | Self::GenerationServiceFailure { .. }
        )
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors from the external generation and research services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by service, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Service not configured: {0}")]
    NotConfigured(String),
}

/// Errors from the graph, vector, and document stores.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Write to {backend} failed: {reason}")]
    WriteFailed { backend: String, reason: String },

    #[error("Vector dimension mismatch in {collection}: expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Rejected plot thread updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadTransitionError {
    #[error("thread '{id}' cannot move from {from} to {to}")]
    IllegalStatus {
        id: String,
        from: ThreadStatus,
        to: ThreadStatus,
    },

    #[error("thread '{id}' progress cannot decrease from {current} to {requested}")]
    ProgressRegression {
        id: String,
        current: u8,
        requested: u8,
    },
}
