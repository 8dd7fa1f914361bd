//! Contracts, validation, errors, and run history for the Revisor engine.
//!
//! This crate provides the foundational types used across all other Revisor crates:
//! - `RevisorError` — unified error taxonomy
//! - `InputPacket`, `Draft`, `Review` — the validated data contracts
//! - `IterationRecord`, `RunHistory`, `FinalizedResult` — the audit trail of a run

pub mod draft;
pub mod duration_serde;
pub mod history;
pub mod packet;
pub mod review;
pub mod validation;

pub use draft::{ActionItem, Draft, TimeHorizon};
pub use history::{
    Collaborator, FaultReport, FinalizedResult, IterationRecord, RunHistory, RunId, RunStatus,
};
pub use packet::{
    Format, Guidelines, InputPacket, PersonaProfile, Preferences, QualityTargets, Tone,
    NO_RISK_FLAG,
};
pub use review::{Criterion, Review, ReviewOrigin};
pub use validation::{Contract, ValidationError};

/// Unified error type for all Revisor subsystems.
#[derive(Debug, thiserror::Error)]
pub enum RevisorError {
    // === Model Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    // === Contract Errors ===
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Model output from {source_name} is not a valid JSON document: {message}")]
    MalformedOutput {
        source_name: String,
        message: String,
    },

    // === Collaborator Faults ===
    #[error("Producer '{producer}' failed: {message}")]
    ProducerFault { producer: String, message: String },

    #[error("Evaluator '{evaluator}' failed: {message}")]
    EvaluatorFault { evaluator: String, message: String },

    #[error("Call to {collaborator} timed out after {timeout_ms}ms")]
    CallTimeout {
        collaborator: String,
        timeout_ms: u64,
    },

    // === Run Errors ===
    #[error("Clarification required before generating a draft for '{topic}'")]
    ClarificationRequired { topic: String },

    #[error("Run '{run_id}' was already finalized")]
    DuplicateFinalization { run_id: String },

    #[error("Run '{run_id}' expected iteration {expected}, got {got}")]
    OutOfOrderAppend {
        run_id: String,
        expected: u32,
        got: u32,
    },

    #[error("Run '{run_id}' is finalized and accepts no further iterations")]
    RunClosed { run_id: String },

    #[error("Run '{run_id}' has no finalized result")]
    NotFinalized { run_id: String },

    #[error("Illegal state transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RevisorError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RevisorError::RateLimited { .. }
                | RevisorError::RequestTimeout { .. }
                | RevisorError::CallTimeout { .. }
                | RevisorError::ProviderError {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RevisorError::AuthError { .. }
                | RevisorError::Validation(_)
                | RevisorError::ClarificationRequired { .. }
                | RevisorError::DuplicateFinalization { .. }
                | RevisorError::IllegalTransition { .. }
                | RevisorError::Config(_)
        )
    }

    /// Returns `true` for faults raised by a producer or evaluator collaborator.
    pub fn is_collaborator_fault(&self) -> bool {
        matches!(
            self,
            RevisorError::ProducerFault { .. }
                | RevisorError::EvaluatorFault { .. }
                | RevisorError::CallTimeout { .. }
        )
    }
}

/// A convenience alias for `Result<T, RevisorError>`.
pub type Result<T> = std::result::Result<T, RevisorError>;
