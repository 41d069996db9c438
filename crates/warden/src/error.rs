use thiserror::Error;

/// Error type for the Warden root crate, aggregating errors from the
/// verification and policy subsystems.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("verification error: {0}")]
    Verify(#[from] warden_verify::VerifyError),

    #[error("policy error: {0}")]
    Policy(#[from] warden_policy::PolicyError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(e: toml::de::Error) -> Self {
        WardenError::Config(format!("TOML parse error: {}", e))
    }
}

impl From<toml::ser::Error> for WardenError {
    fn from(e: toml::ser::Error) -> Self {
        WardenError::Serialization(e.to_string())
    }
}

pub type WardenResult<T> = Result<T, WardenError>;
