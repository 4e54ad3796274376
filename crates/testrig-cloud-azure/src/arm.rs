//! Azure Resource Manager REST client
//!
//! Direct ARM API implementation for resource groups and template
//! deployments. Long-running operations are driven through
//! [`testrig_cloud::poll_until`].

use crate::credential::Credential;
use crate::error::{AzureError, Result};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use testrig_cloud::{DeploymentResult, DeploymentTemplate, PollConfig, PollStatus, poll_until};

const RESOURCES_API_VERSION: &str = "2021-04-01";

/// ARM client bound to a single subscription
pub struct ArmClient {
    client: reqwest::Client,
    credential: Credential,
    subscription_id: String,
    endpoint: String,
    poll: PollConfig,
}

impl ArmClient {
    pub fn new(credential: Credential, subscription_id: impl Into<String>) -> Self {
        let endpoint = credential
            .resource_manager()
            .trim_end_matches('/')
            .to_string();
        Self {
            client: reqwest::Client::new(),
            credential,
            subscription_id: subscription_id.into(),
            endpoint,
            poll: PollConfig::default(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    fn resource_group_url(&self, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
            self.endpoint, self.subscription_id, name, RESOURCES_API_VERSION
        )
    }

    fn deployment_url(&self, resource_group: &str, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}?api-version={}",
            self.endpoint, self.subscription_id, resource_group, name, RESOURCES_API_VERSION
        )
    }

    async fn token(&self) -> Result<String> {
        self.credential.token(&self.client).await
    }

    /// Create or update a resource group
    pub async fn put_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let url = self.resource_group_url(name);
        let body = ResourceGroupRequest {
            location: location.to_string(),
        };

        let response = self
            .client
            .put(&url)
            .bearer_auth(self.token().await?)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response, name).await?;
        Ok(response.json().await?)
    }

    /// Start deleting a resource group.
    ///
    /// Returns the URL to poll for completion, or `None` if the deletion
    /// already finished.
    pub async fn begin_delete_resource_group(&self, name: &str) -> Result<Option<String>> {
        let url = self.resource_group_url(name);

        let response = self
            .client
            .delete(&url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        let response = check_status(response, name).await?;
        match response.status() {
            StatusCode::ACCEPTED => Ok(operation_url(response.headers())),
            _ => Ok(None),
        }
    }

    /// Delete a resource group and wait for the deletion to finish
    pub async fn delete_resource_group(&self, name: &str) -> Result<()> {
        let Some(poll_url) = self.begin_delete_resource_group(name).await? else {
            return Ok(());
        };

        let operation = format!("deletion of resource group {}", name);
        poll_until(&self.poll, &operation, || self.check_location(&poll_url, name))
            .await
            .map_err(AzureError::from)
    }

    /// One status check against an operation `Location` URL:
    /// 202 means still running, any other success means done.
    async fn check_location(
        &self,
        url: &str,
        name: &str,
    ) -> testrig_cloud::Result<PollStatus<()>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.token().await?)
            .send()
            .await
            .map_err(AzureError::from)?;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(PollStatus::Pending(retry_after(response.headers())));
        }
        check_status(response, name).await?;
        Ok(PollStatus::Done(()))
    }

    /// Submit a template deployment (Incremental mode)
    pub async fn put_deployment(
        &self,
        resource_group: &str,
        name: &str,
        template: &DeploymentTemplate,
    ) -> Result<Deployment> {
        let url = self.deployment_url(resource_group, name);
        let body = DeploymentRequest {
            properties: DeploymentRequestProperties {
                template: &template.template,
                parameters: &template.parameters,
                mode: "Incremental",
            },
        };

        let response = self
            .client
            .put(&url)
            .bearer_auth(self.token().await?)
            .json(&body)
            .send()
            .await?;

        let response = check_status(response, name).await?;
        Ok(response.json().await?)
    }

    /// Read a deployment
    pub async fn get_deployment(&self, resource_group: &str, name: &str) -> Result<Deployment> {
        let url = self.deployment_url(resource_group, name);

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token().await?)
            .send()
            .await?;

        let response = check_status(response, name).await?;
        Ok(response.json().await?)
    }

    async fn check_deployment(
        &self,
        resource_group: &str,
        name: &str,
    ) -> testrig_cloud::Result<PollStatus<Deployment>> {
        let deployment = self.get_deployment(resource_group, name).await?;
        if deployment.properties.is_terminal() {
            Ok(PollStatus::Done(deployment))
        } else {
            Ok(PollStatus::Pending(None))
        }
    }

    /// Submit a deployment and wait until it reaches a terminal state
    pub async fn deploy(
        &self,
        resource_group: &str,
        name: &str,
        template: &DeploymentTemplate,
    ) -> Result<DeploymentResult> {
        let submitted = self.put_deployment(resource_group, name, template).await?;
        tracing::info!(
            "Deployment {} submitted ({})",
            submitted.name,
            submitted.properties.provisioning_state
        );

        let operation = format!("deployment {}", name);
        let finished = poll_until(&self.poll, &operation, || {
            self.check_deployment(resource_group, name)
        })
        .await?;

        if finished.properties.provisioning_state != "Succeeded" {
            return Err(AzureError::OperationFailed {
                operation,
                state: finished.properties.provisioning_state.clone(),
                message: finished
                    .properties
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no error details reported".to_string()),
            });
        }

        Ok(DeploymentResult {
            name: finished.name,
            provisioning_state: finished.properties.provisioning_state,
        })
    }
}

async fn check_status(response: reqwest::Response, resource: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .ok()
        .map(|e| e.error);

    if status == StatusCode::NOT_FOUND {
        return Err(AzureError::NotFound(match detail {
            Some(d) => d.to_string(),
            None => resource.to_string(),
        }));
    }

    let (code, message) = match detail {
        Some(d) => (d.code, d.message),
        None => (status.to_string(), body),
    };
    Err(AzureError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

fn operation_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[derive(Debug, Serialize)]
struct ResourceGroupRequest {
    location: String,
}

/// Resource group as returned by ARM
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
struct DeploymentRequest<'a> {
    properties: DeploymentRequestProperties<'a>,
}

#[derive(Debug, Serialize)]
struct DeploymentRequestProperties<'a> {
    template: &'a serde_json::Value,
    parameters: &'a serde_json::Value,
    mode: &'a str,
}

/// Deployment as returned by ARM
#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub properties: DeploymentProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentProperties {
    pub provisioning_state: String,

    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl DeploymentProperties {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.provisioning_state.as_str(),
            "Succeeded" | "Failed" | "Canceled"
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

/// ARM error payload; deployment failures nest the real cause in `details`
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        for detail in &self.details {
            write!(f, "; {}", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_deployment_parse() {
        let json = r#"{
            "id": "/subscriptions/x/resourceGroups/demo-01/providers/Microsoft.Resources/deployments/demo-01",
            "name": "demo-01",
            "properties": {
                "provisioningState": "Failed",
                "error": {
                    "code": "DeploymentFailed",
                    "message": "At least one resource deployment operation failed.",
                    "details": [{ "code": "QuotaExceeded", "message": "Operation results in exceeding quota limits of Core." }]
                }
            }
        }"#;

        let deployment: Deployment = serde_json::from_str(json).unwrap();
        assert!(deployment.properties.is_terminal());
        let error = deployment.properties.error.unwrap();
        assert_eq!(
            error.to_string(),
            "DeploymentFailed: At least one resource deployment operation failed.; QuotaExceeded: Operation results in exceeding quota limits of Core."
        );
    }

    #[test]
    fn test_running_is_not_terminal() {
        let props = DeploymentProperties {
            provisioning_state: "Running".to_string(),
            error: None,
        };
        assert!(!props.is_terminal());
    }

    #[test]
    fn test_operation_url() {
        let mut headers = HeaderMap::new();
        assert_eq!(operation_url(&headers), None);
        headers.insert(LOCATION, HeaderValue::from_static("https://example/location"));
        assert_eq!(
            operation_url(&headers).as_deref(),
            Some("https://example/location")
        );
    }

    #[test]
    fn test_retry_after() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("15"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(15)));
    }
}
