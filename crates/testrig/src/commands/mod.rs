pub mod create;
pub mod inspect;
pub mod kubeconfig;
pub mod ls;
pub mod rm;
pub mod ssh;

use std::process::ExitCode;
use testrig_cloud_azure::AzureProvider;
use testrig_config::UserConfig;
use testrig_core::WorkflowConfig;
use tokio_util::sync::CancellationToken;

/// Settings shared by every command
pub struct Context {
    pub workflow: WorkflowConfig,
    pub user_config: UserConfig,
    pub cancel: CancellationToken,
}

impl Context {
    pub fn store(&self) -> testrig_core::StateStore {
        self.workflow.store()
    }

    /// Azure provider for the subscription chosen by flag, then config,
    /// then auth file or Azure CLI
    pub async fn azure(&self, subscription: Option<String>) -> anyhow::Result<AzureProvider> {
        let subscription = subscription
            .filter(|s| !s.is_empty())
            .or_else(|| self.user_config.subscription.clone());
        Ok(AzureProvider::from_env(subscription).await?)
    }
}

pub fn version() -> ExitCode {
    println!("testrig {}", env!("CARGO_PKG_VERSION"));
    ExitCode::SUCCESS
}
