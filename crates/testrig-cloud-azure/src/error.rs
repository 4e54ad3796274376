//! Azure provider error types

use testrig_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az not found. Please install the Azure CLI: https://aka.ms/azure-cli")]
    AzNotFound,

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Could not determine subscription: {0}")]
    SubscriptionNotFound(String),

    #[error("Invalid auth file {path}: {message}")]
    InvalidAuthFile { path: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Azure API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{operation} finished with state {state}: {message}")]
    OperationFailed {
        operation: String,
        state: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, AzureError>;

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::NotFound(what) => CloudError::ResourceNotFound(what),
            AzureError::Api {
                status,
                code,
                message,
            } => {
                if status == 404 {
                    CloudError::ResourceNotFound(format!("{}: {}", code, message))
                } else {
                    CloudError::ApiError {
                        status,
                        message: format!("{}: {}", code, message),
                    }
                }
            }
            AzureError::AzNotFound
            | AzureError::AuthenticationFailed(_)
            | AzureError::InvalidAuthFile { .. } => CloudError::AuthenticationFailed(err.to_string()),
            AzureError::SubscriptionNotFound(_) => CloudError::InvalidConfig(err.to_string()),
            AzureError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            AzureError::OperationFailed { .. } => CloudError::OperationFailed(err.to_string()),
            AzureError::Http(e) => CloudError::Transport(e.to_string()),
            AzureError::JsonError(e) => CloudError::Json(e),
            AzureError::IoError(e) => CloudError::Io(e),
            AzureError::CloudError(e) => e,
        }
    }
}
