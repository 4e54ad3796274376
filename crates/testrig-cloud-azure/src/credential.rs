//! Bearer-token acquisition for Azure Resource Manager
//!
//! Two sources are supported, checked in this order:
//!
//! 1. An SDK auth file pointed to by `AZURE_AUTH_LOCATION`
//!    (service principal, client-credentials grant)
//! 2. The Azure CLI login session (`az account get-access-token`)

use crate::az::AzureCli;
use crate::error::{AzureError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub const AUTH_LOCATION_ENV: &str = "AZURE_AUTH_LOCATION";
pub const DEFAULT_RESOURCE_MANAGER: &str = "https://management.azure.com/";
const DEFAULT_ACTIVE_DIRECTORY: &str = "https://login.microsoftonline.com/";

/// Tokens are refreshed this long before they expire
const EXPIRY_SLACK: Duration = Duration::from_secs(120);

/// Service principal auth file, as written by `az ad sp create-for-rbac --sdk-auth`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFile {
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
    pub tenant_id: String,

    #[serde(default)]
    pub active_directory_endpoint_url: Option<String>,

    #[serde(default)]
    pub resource_manager_endpoint_url: Option<String>,
}

impl AuthFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AzureError::InvalidAuthFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        serde_json::from_str(&content).map_err(|e| AzureError::InvalidAuthFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn resource_manager(&self) -> &str {
        self.resource_manager_endpoint_url
            .as_deref()
            .unwrap_or(DEFAULT_RESOURCE_MANAGER)
    }

    fn token_url(&self) -> String {
        let authority = self
            .active_directory_endpoint_url
            .as_deref()
            .unwrap_or(DEFAULT_ACTIVE_DIRECTORY)
            .trim_end_matches('/');
        format!("{}/{}/oauth2/token", authority, self.tenant_id)
    }
}

/// Where tokens come from
#[derive(Debug, Clone)]
pub enum CredentialSource {
    AuthFile(AuthFile),
    Cli(AzureCli),
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    valid_until: Instant,
}

/// Token provider with an in-memory cache
#[derive(Debug)]
pub struct Credential {
    source: CredentialSource,
    resource: String,
    cache: Mutex<Option<CachedToken>>,
}

impl Credential {
    pub fn new(source: CredentialSource) -> Self {
        let resource = match &source {
            CredentialSource::AuthFile(file) => file.resource_manager().to_string(),
            CredentialSource::Cli(_) => DEFAULT_RESOURCE_MANAGER.to_string(),
        };
        Self {
            source,
            resource,
            cache: Mutex::new(None),
        }
    }

    /// Build a credential from the environment: auth file if
    /// `AZURE_AUTH_LOCATION` is set, otherwise the Azure CLI.
    pub async fn from_env() -> Result<Self> {
        match std::env::var_os(AUTH_LOCATION_ENV) {
            Some(path) if !path.is_empty() => {
                let file = AuthFile::load(PathBuf::from(path)).await?;
                tracing::debug!("Using service principal {} from auth file", file.client_id);
                Ok(Self::new(CredentialSource::AuthFile(file)))
            }
            _ => Ok(Self::new(CredentialSource::Cli(AzureCli::default()))),
        }
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Resource manager endpoint the tokens are issued for
    pub fn resource_manager(&self) -> &str {
        &self.resource
    }

    /// Get a bearer token, refreshing it when close to expiry
    pub async fn token(&self, http: &reqwest::Client) -> Result<String> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.valid_until {
                return Ok(cached.value.clone());
            }
        }

        let (value, lifetime) = match &self.source {
            CredentialSource::Cli(cli) => {
                let token = cli.get_access_token(&self.resource).await?;
                let lifetime = token
                    .expires_on
                    .map(seconds_until)
                    .unwrap_or(Duration::from_secs(30 * 60));
                (token.access_token, lifetime)
            }
            CredentialSource::AuthFile(file) => client_credentials(http, file, &self.resource).await?,
        };

        *cache = Some(CachedToken {
            value: value.clone(),
            valid_until: Instant::now() + lifetime.saturating_sub(EXPIRY_SLACK),
        });
        Ok(value)
    }

    /// Determine the subscription to operate on when none was configured
    pub async fn default_subscription(&self) -> Result<String> {
        match &self.source {
            CredentialSource::AuthFile(file) if !file.subscription_id.is_empty() => {
                Ok(file.subscription_id.clone())
            }
            CredentialSource::AuthFile(_) => Err(AzureError::SubscriptionNotFound(
                "auth file has no subscriptionId".to_string(),
            )),
            CredentialSource::Cli(cli) => {
                let account = cli
                    .account_show()
                    .await
                    .map_err(|e| AzureError::SubscriptionNotFound(e.to_string()))?;
                Ok(account.id)
            }
        }
    }
}

fn seconds_until(unix_ts: i64) -> Duration {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    Duration::from_secs((unix_ts - now).max(0) as u64)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,

    /// The v1 endpoint returns numbers as strings
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,

    #[serde(default)]
    error_description: String,
}

async fn client_credentials(
    http: &reqwest::Client,
    file: &AuthFile,
    resource: &str,
) -> Result<(String, Duration)> {
    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", file.client_id.as_str()),
        ("client_secret", file.client_secret.as_str()),
        ("resource", resource),
    ];

    let response = http.post(file.token_url()).form(&form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<TokenErrorResponse>(&body)
            .map(|e| format!("{}: {}", e.error, e.error_description))
            .unwrap_or(body);
        return Err(AzureError::AuthenticationFailed(message));
    }

    let token: TokenResponse = serde_json::from_str(&body)?;
    let lifetime = token
        .expires_in
        .as_ref()
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60 * 60));

    Ok((token.access_token, lifetime))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUTH_FILE: &str = r#"{
        "clientId": "11111111-0000-0000-0000-000000000000",
        "clientSecret": "s3cret",
        "subscriptionId": "22222222-0000-0000-0000-000000000000",
        "tenantId": "33333333-0000-0000-0000-000000000000",
        "activeDirectoryEndpointUrl": "https://login.microsoftonline.com",
        "resourceManagerEndpointUrl": "https://management.azure.com/"
    }"#;

    #[tokio::test]
    async fn test_auth_file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, AUTH_FILE).unwrap();

        let file = AuthFile::load(&path).await.unwrap();
        assert_eq!(file.subscription_id, "22222222-0000-0000-0000-000000000000");
        assert_eq!(
            file.token_url(),
            "https://login.microsoftonline.com/33333333-0000-0000-0000-000000000000/oauth2/token"
        );
        assert_eq!(file.resource_manager(), "https://management.azure.com/");
    }

    #[tokio::test]
    async fn test_auth_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = AuthFile::load(&path).await.unwrap_err();
        assert!(matches!(err, AzureError::InvalidAuthFile { .. }));
    }

    #[tokio::test]
    async fn test_subscription_from_auth_file() {
        let file: AuthFile = serde_json::from_str(AUTH_FILE).unwrap();
        let credential = Credential::new(CredentialSource::AuthFile(file));
        assert_eq!(
            credential.default_subscription().await.unwrap(),
            "22222222-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_from_env_prefers_auth_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        std::fs::write(&path, AUTH_FILE).unwrap();

        temp_env::with_var(AUTH_LOCATION_ENV, Some(path.as_os_str()), || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let credential = rt.block_on(Credential::from_env()).unwrap();
            assert!(matches!(credential.source(), CredentialSource::AuthFile(_)));
        });

        temp_env::with_var_unset(AUTH_LOCATION_ENV, || {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let credential = rt.block_on(Credential::from_env()).unwrap();
            assert!(matches!(credential.source(), CredentialSource::Cli(_)));
        });
    }
}
