use thiserror::Error;
use warden_core::SubjectId;

/// Errors surfaced by the verification subsystem.
///
/// Only caller errors escape: verifying a subject that was never
/// registered. Runtime faults inside the pipeline (executor errors,
/// timeouts, panics) are absorbed into failed method results so the
/// pipeline always returns a `VerificationResult` within its latency
/// budget.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("subject '{0}' is not registered")]
    UnregisteredSubject(SubjectId),

    /// Available to external executor implementations; converted to a
    /// failed method result by the orchestrator, never propagated.
    #[error("executor failure: {0}")]
    Executor(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
