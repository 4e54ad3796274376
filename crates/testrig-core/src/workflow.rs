//! Settings and helpers shared by the create and remove workflows

use crate::error::{Result, TestrigError};
use crate::state::StateStore;
use std::future::Future;
use std::path::PathBuf;
use testrig_cloud::CloudProvider;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_CONCURRENT_REMOVALS: usize = 8;

/// Explicit configuration for a workflow run
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Root holding one directory per cluster
    pub state_dir: PathBuf,

    /// Upper bound on clusters torn down at once by a bulk remove
    pub max_concurrent_removals: usize,
}

impl WorkflowConfig {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            max_concurrent_removals: DEFAULT_MAX_CONCURRENT_REMOVALS,
        }
    }

    pub fn with_max_concurrent_removals(mut self, max: usize) -> Self {
        self.max_concurrent_removals = max.max(1);
        self
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir)
    }
}

/// Run `fut` unless `cancel` fires first. Dropping the future on
/// cancellation also drops any child process it owns.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::warn!("Operation cancelled");
            Err(TestrigError::Cancelled)
        }
        result = fut => result,
    }
}

/// Fail early when the provider has no usable credentials
pub async fn ensure_authenticated(provider: &dyn CloudProvider) -> Result<()> {
    let status = provider.check_auth().await?;
    if !status.authenticated {
        return Err(TestrigError::NotAuthenticated {
            provider: provider.name().to_string(),
            message: status.error.unwrap_or_default(),
        });
    }
    tracing::debug!(
        "Authenticated with {} as {}",
        provider.name(),
        status.account_info.as_deref().unwrap_or("unknown account")
    );
    Ok(())
}
