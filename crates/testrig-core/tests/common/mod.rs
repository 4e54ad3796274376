use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use testrig_cloud::{
    AuthStatus, CloudError, CloudProvider, DeploymentResult, DeploymentTemplate,
};
use testrig_core::engine::{PARAMETERS_FILE, TEMPLATE_FILE};
use testrig_core::model::ApiModel;
use testrig_core::{ClusterRecord, ProvisioningEngine, Result, TestrigError, WorkflowConfig};

pub const SSH_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAABAQC7 dev@example";

/// How the fake cloud answers a call
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum Behavior {
    Succeed,
    NotFound,
    Fail,
}

/// In-memory cloud that records every call
pub struct FakeProvider {
    pub calls: Mutex<Vec<String>>,
    pub deploy: Behavior,
    pub delete: Behavior,
    pub authenticated: bool,
    pub delete_delay: Option<Duration>,
    deletes_in_flight: AtomicUsize,
    peak_deletes: AtomicUsize,
}

#[allow(dead_code)]
impl FakeProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            deploy: Behavior::Succeed,
            delete: Behavior::Succeed,
            authenticated: true,
            delete_delay: None,
            deletes_in_flight: AtomicUsize::new(0),
            peak_deletes: AtomicUsize::new(0),
        }
    }

    pub fn logged_out(mut self) -> Self {
        self.authenticated = false;
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Most resource group deletes ever running at the same time
    pub fn peak_deletes(&self) -> usize {
        self.peak_deletes.load(Ordering::SeqCst)
    }

    pub fn with_deploy(mut self, behavior: Behavior) -> Self {
        self.deploy = behavior;
        self
    }

    pub fn with_delete(mut self, behavior: Behavior) -> Self {
        self.delete = behavior;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn answer(behavior: Behavior, what: &str) -> testrig_cloud::Result<()> {
        match behavior {
            Behavior::Succeed => Ok(()),
            Behavior::NotFound => Err(CloudError::ResourceNotFound(what.to_string())),
            Behavior::Fail => Err(CloudError::ApiError {
                status: 500,
                message: format!("{} exploded", what),
            }),
        }
    }
}

#[async_trait]
impl CloudProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn check_auth(&self) -> testrig_cloud::Result<AuthStatus> {
        if self.authenticated {
            Ok(AuthStatus::ok("fake account"))
        } else {
            Ok(AuthStatus::failed("token expired"))
        }
    }

    async fn create_or_update_resource_group(
        &self,
        name: &str,
        location: &str,
    ) -> testrig_cloud::Result<()> {
        self.record(format!("group:{}:{}", name, location));
        Ok(())
    }

    async fn delete_resource_group(&self, name: &str) -> testrig_cloud::Result<()> {
        self.record(format!("delete:{}", name));
        let running = self.deletes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_deletes.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }
        self.deletes_in_flight.fetch_sub(1, Ordering::SeqCst);
        Self::answer(self.delete, name)
    }

    async fn create_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
    ) -> testrig_cloud::Result<DeploymentResult> {
        self.record(format!("deploy:{}:{}", resource_group, deployment_name));
        assert_eq!(template.parameters["fromEngine"]["value"], true);
        Self::answer(self.deploy, deployment_name)?;
        Ok(DeploymentResult {
            name: deployment_name.to_string(),
            provisioning_state: "Succeeded".to_string(),
        })
    }
}

/// Engine that writes minimal artifacts, or fails with canned output
pub struct FakeEngine {
    pub failure: Option<String>,
    pub seen_model: Mutex<Option<PathBuf>>,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        Self {
            failure: None,
            seen_model: Mutex::new(None),
        }
    }

    pub fn failing(output: &str) -> Self {
        Self {
            failure: Some(output.to_string()),
            seen_model: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ProvisioningEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake-engine"
    }

    async fn generate(&self, model: &Path, output_dir: &Path) -> Result<()> {
        *self.seen_model.lock().unwrap() = Some(model.to_path_buf());
        if let Some(output) = &self.failure {
            return Err(TestrigError::ExternalTool {
                tool: self.name().to_string(),
                output: output.clone(),
            });
        }

        std::fs::create_dir_all(output_dir).unwrap();
        std::fs::write(output_dir.join(TEMPLATE_FILE), r#"{"resources":[]}"#).unwrap();
        std::fs::write(
            output_dir.join(PARAMETERS_FILE),
            r#"{"parameters":{"fromEngine":{"value":true}}}"#,
        )
        .unwrap();
        Ok(())
    }
}

/// Temporary state root
pub struct TestState {
    pub root: TempDir,
}

#[allow(dead_code)]
impl TestState {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> WorkflowConfig {
        WorkflowConfig::new(self.root.path())
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Write a record directly, bypassing the create workflow
    pub async fn seed(&self, name: &str, record: &ClusterRecord) {
        let store = self.config().store();
        store.reserve(name).await.unwrap();
        store.write(name, record).await.unwrap();
    }

    pub async fn read(&self, name: &str) -> ClusterRecord {
        self.config().store().read(name).await.unwrap()
    }
}

/// Default model with a caller-supplied key, so tests skip RSA generation
#[allow(dead_code)]
pub fn model_with_key() -> ApiModel {
    let mut model = ApiModel::default();
    model.add_ssh_public_key(SSH_KEY).unwrap();
    model
}
