use thiserror::Error;

/// Single error enum for all policy operations.
///
/// Only caller errors surface here: a malformed rule submission or a
/// reference to an unknown rule. Evaluation itself never errors; it
/// always terminates in an allow/deny/challenge decision.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A submitted rule failed validation. Carries every violation found,
    /// not just the first.
    #[error("rule validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    #[error("unknown rule: {0}")]
    UnknownRule(String),

    #[error("policy load error: {0}")]
    LoadError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PolicyError {
    pub fn validation(violations: Vec<String>) -> Self {
        PolicyError::Validation { violations }
    }
}

pub type PolicyResult<T> = Result<T, PolicyError>;
