//! Azure provider implementation

use crate::arm::ArmClient;
use crate::credential::{Credential, CredentialSource};
use crate::error::Result;
use async_trait::async_trait;
use testrig_cloud::{
    AuthStatus, CloudProvider, DeploymentResult, DeploymentTemplate,
};

/// Azure Resource Manager provider
pub struct AzureProvider {
    arm: ArmClient,
}

impl AzureProvider {
    pub fn new(credential: Credential, subscription_id: impl Into<String>) -> Self {
        Self {
            arm: ArmClient::new(credential, subscription_id),
        }
    }

    /// Build a provider from the ambient environment.
    ///
    /// `subscription` wins when given; otherwise it is taken from the auth
    /// file or the Azure CLI's selected account.
    pub async fn from_env(subscription: Option<String>) -> Result<Self> {
        let credential = Credential::from_env().await?;
        let subscription = match subscription.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => credential.default_subscription().await?,
        };
        tracing::debug!("Using subscription {}", subscription);
        Ok(Self::new(credential, subscription))
    }

    pub fn subscription_id(&self) -> &str {
        self.arm.subscription_id()
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    async fn check_auth(&self) -> testrig_cloud::Result<AuthStatus> {
        match self.arm.credential().source() {
            CredentialSource::Cli(cli) => {
                if let Err(e) = cli.check_installed().await {
                    return Ok(AuthStatus::failed(e.to_string()));
                }
                match cli.account_show().await {
                    Ok(account) => Ok(AuthStatus::ok(account.describe())),
                    Err(e) => Ok(AuthStatus::failed(e.to_string())),
                }
            }
            CredentialSource::AuthFile(file) => {
                let http = reqwest::Client::new();
                match self.arm.credential().token(&http).await {
                    Ok(_) => Ok(AuthStatus::ok(format!(
                        "service principal {}",
                        file.client_id
                    ))),
                    Err(e) => Ok(AuthStatus::failed(e.to_string())),
                }
            }
        }
    }

    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
    ) -> testrig_cloud::Result<()> {
        tracing::info!("Creating resource group {} in {}", name, location);
        let group = self.arm.put_resource_group(name, location).await?;
        tracing::debug!("Resource group ready: {}", group.id);
        Ok(())
    }

    async fn delete_resource_group(&self, name: &str) -> testrig_cloud::Result<()> {
        tracing::info!("Deleting resource group {}", name);
        self.arm.delete_resource_group(name).await?;
        Ok(())
    }

    async fn create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
    ) -> testrig_cloud::Result<DeploymentResult> {
        tracing::info!(
            "Submitting deployment {} to resource group {}",
            deployment_name,
            resource_group
        );
        Ok(self
            .arm
            .deploy(resource_group, deployment_name, template)
            .await?)
    }
}
