//! az CLI wrapper
//!
//! Wraps the Azure CLI commands used for credential and subscription
//! discovery. The CLI keeps its own login session, so reusing it means
//! testrig never stores user credentials.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// az CLI wrapper
#[derive(Debug, Clone)]
pub struct AzureCli {
    program: String,
}

impl Default for AzureCli {
    fn default() -> Self {
        Self::new("az")
    }
}

impl AzureCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check if az is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which")
            .arg(&self.program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !which.success() {
            return Err(AzureError::AzNotFound);
        }
        Ok(())
    }

    /// Run an az command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = cmd.output().await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AzureError::AzNotFound,
            _ => AzureError::IoError(e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Show the currently selected account (subscription)
    pub async fn account_show(&self) -> Result<AccountInfo> {
        let output = self
            .run_command(&["account", "show", "--output", "json"])
            .await?;

        let account: AccountInfo = serde_json::from_str(&output)?;
        Ok(account)
    }

    /// Fetch an access token for the given resource
    pub async fn get_access_token(&self, resource: &str) -> Result<CliAccessToken> {
        let output = self
            .run_command(&[
                "account",
                "get-access-token",
                "--resource",
                resource,
                "--output",
                "json",
            ])
            .await
            .map_err(|e| match e {
                AzureError::CommandFailed(msg) => AzureError::AuthenticationFailed(format!(
                    "could not get a token from the Azure CLI (try `az login`): {}",
                    msg
                )),
                other => other,
            })?;

        let token: CliAccessToken = serde_json::from_str(&output)?;
        Ok(token)
    }
}

/// Account information from `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// Subscription ID
    pub id: String,

    /// Subscription display name
    pub name: String,

    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub user: Option<AccountUser>,
}

impl AccountInfo {
    pub fn describe(&self) -> String {
        match &self.user {
            Some(user) => format!("{} ({}) as {}", self.name, self.id, user.name),
            None => format!("{} ({})", self.name, self.id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountUser {
    pub name: String,

    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
}

/// Token from `az account get-access-token`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliAccessToken {
    pub access_token: String,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub tenant: Option<String>,

    /// Unix timestamp; only reported by newer CLI versions
    #[serde(rename = "expires_on", default)]
    pub expires_on: Option<i64>,
}
