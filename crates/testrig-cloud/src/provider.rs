//! Cloud provider trait definition

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Cloud provider abstraction trait
///
/// Covers the small slice of a resource-manager API that cluster
/// provisioning needs: resource groups and template deployments. Every
/// long-running call resolves only once the provider reports the operation
/// as finished.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Create the resource group, or update it when it already exists
    async fn create_or_update_resource_group(&self, name: &str, location: &str) -> Result<()>;

    /// Delete a resource group and wait for the deletion to finish.
    ///
    /// Returns [`CloudError::ResourceNotFound`] when the group does not exist.
    async fn delete_resource_group(&self, name: &str) -> Result<()>;

    /// Submit a template deployment into a resource group and wait for it
    /// to reach a terminal state
    async fn create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
    ) -> Result<DeploymentResult>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// A generated deployment template together with its parameter values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTemplate {
    pub template: serde_json::Value,
    pub parameters: serde_json::Value,
}

/// Outcome of a finished deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Name the provider assigned to the deployment
    pub name: String,

    /// Final provisioning state as reported by the provider
    pub provisioning_state: String,
}

/// Polling configuration for long-running provider operations
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first status check
    pub initial_delay: Duration,

    /// Upper bound for the delay between checks
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Give up after this much total waiting
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 1.5,
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

impl PollConfig {
    fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

/// Result of a single status check
#[derive(Debug)]
pub enum PollStatus<T> {
    /// Still running; the provider may suggest when to ask again
    Pending(Option<Duration>),
    /// Finished
    Done(T),
}

/// Repeatedly run `check` until it reports [`PollStatus::Done`], an error,
/// or the configured timeout elapses.
pub async fn poll_until<T, F, Fut>(config: &PollConfig, operation: &str, mut check: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let started = tokio::time::Instant::now();
    let mut delay = config.initial_delay;

    loop {
        match check().await? {
            PollStatus::Done(value) => return Ok(value),
            PollStatus::Pending(hint) => {
                if started.elapsed() >= config.timeout {
                    return Err(CloudError::Timeout(format!(
                        "{} did not finish within {}s",
                        operation,
                        config.timeout.as_secs()
                    )));
                }
                let wait = hint.unwrap_or(delay).min(config.max_delay);
                tracing::debug!("{} still running, checking again in {:?}", operation, wait);
                tokio::time::sleep(wait).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
