//! Cloud provider error types

use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// The addressed resource does not exist. Teardown treats this as
    /// already satisfied.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error means the target resource is already absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ResourceNotFound(_))
            || matches!(self, CloudError::ApiError { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
