//! Error types for cluster workflows

use testrig_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestrigError {
    #[error("no such cluster: {0:?}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid cluster name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("corrupt cluster state: {0}")]
    CorruptState(String),

    #[error("could not find {0} binary")]
    ToolNotFound(String),

    #[error("{tool} exited with error: {output}")]
    ExternalTool { tool: String, output: String },

    #[error("not logged in to {provider}: {message}")]
    NotAuthenticated { provider: String, message: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("error generating key material: {0}")]
    KeyGeneration(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl TestrigError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TestrigError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, TestrigError::Conflict(_))
    }

    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| TestrigError::Io { context, source }
    }

    pub(crate) fn json(context: impl Into<String>) -> impl FnOnce(serde_json::Error) -> Self {
        let context = context.into();
        move |source| TestrigError::Json { context, source }
    }
}

pub type Result<T> = std::result::Result<T, TestrigError>;
