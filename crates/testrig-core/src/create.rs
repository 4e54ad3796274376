//! Cluster creation
//!
//! ```text
//! reserve ─► Initialized ─► key/password ─► apimodel.json ─► Creating
//!    ─► engine generate ─► resource group ─► deployment ─► Ready
//! ```
//!
//! Every error after the name is reserved passes through one finalizer
//! that persists `Failed` with a failure message.

use crate::engine::{ProvisioningEngine, read_deployment};
use crate::error::{Result, TestrigError};
use crate::lifecycle::ClusterStatus;
use crate::model::ApiModel;
use crate::secrets::{generate_password, generate_ssh_keypair, random_suffix};
use crate::state::{ClusterRecord, StateStore};
use crate::workflow::{WorkflowConfig, cancellable, ensure_authenticated};
use testrig_cloud::CloudProvider;
use tokio_util::sync::CancellationToken;

/// Everything needed to create one cluster
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub model: ApiModel,
    pub location: String,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, model: ApiModel, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model,
            location: location.into(),
        }
    }
}

/// Create a cluster and return its final record
pub async fn create_cluster(
    request: CreateRequest,
    provider: &dyn CloudProvider,
    engine: &dyn ProvisioningEngine,
    config: &WorkflowConfig,
    cancel: &CancellationToken,
) -> Result<ClusterRecord> {
    let CreateRequest {
        name,
        mut model,
        location,
    } = request;

    model.prune_empty_agent_pools();
    model.validate_for_create()?;
    if location.is_empty() {
        return Err(TestrigError::InvalidSpec("must specify a location".to_string()));
    }

    ensure_authenticated(provider).await?;

    let store = config.store();
    store.reserve(&name).await?;
    tracing::info!("Creating cluster {} in {}", name, location);

    let mut record = ClusterRecord::new(location);
    let result = CreateRun {
        name: &name,
        store: &store,
        record: &mut record,
        provider,
        engine,
        cancel,
    }
    .provision(model)
    .await;

    match result {
        Ok(()) => Ok(record),
        Err(err) => {
            finalize_failure(&store, &name, &mut record, &err).await;
            Err(err)
        }
    }
}

struct CreateRun<'a> {
    name: &'a str,
    store: &'a StateStore,
    record: &'a mut ClusterRecord,
    provider: &'a dyn CloudProvider,
    engine: &'a dyn ProvisioningEngine,
    cancel: &'a CancellationToken,
}

impl CreateRun<'_> {
    async fn persist(&self) -> Result<()> {
        self.store.write(self.name, self.record).await
    }

    async fn provision(&mut self, mut model: ApiModel) -> Result<()> {
        let dns_prefix = format!("{}-{}", self.name, random_suffix());
        model.set_dns_prefix(&dns_prefix);
        self.record.resource_group = dns_prefix.clone();
        self.persist().await?;

        self.materialize_secrets(&mut model).await?;
        let model_path = self.store.write_model(self.name, &model).await?;

        self.record.transition(ClusterStatus::Creating)?;
        self.persist().await?;

        let output_dir = self.store.output_dir(self.name)?;
        tracing::info!("Generating deployment with {}", self.engine.name());
        let generated = cancellable(self.cancel, self.engine.generate(&model_path, &output_dir)).await;
        if let Err(TestrigError::ExternalTool { output, .. }) = &generated {
            self.record.failure_message = output.clone();
        }
        generated?;

        let template = read_deployment(&output_dir).await?;

        let resource_group = self.record.resource_group.clone();
        tracing::info!("Creating resource group {}", resource_group);
        cancellable(self.cancel, async {
            self.provider
                .create_or_update_resource_group(&resource_group, &self.record.location)
                .await
                .map_err(TestrigError::from)
        })
        .await?;

        tracing::info!("Deploying {} (this can take a while)", dns_prefix);
        let deployment = cancellable(self.cancel, async {
            self.provider
                .create_deployment(&resource_group, &dns_prefix, &template)
                .await
                .map_err(TestrigError::from)
        })
        .await?;

        self.record.deployment_name = deployment.name;
        self.record.dns_prefix = dns_prefix;
        self.record.transition(ClusterStatus::Ready)?;
        self.persist().await?;

        tracing::info!("Cluster {} is ready", self.name);
        Ok(())
    }

    /// Generate whatever credentials the model is missing
    async fn materialize_secrets(&mut self, model: &mut ApiModel) -> Result<()> {
        if !model.has_ssh_key() {
            tracing::debug!("No SSH key supplied, generating one");
            let keypair = tokio::task::spawn_blocking(generate_ssh_keypair)
                .await
                .map_err(|e| TestrigError::Task(e.to_string()))??;

            let key_path = self
                .store
                .write_private_key(self.name, &keypair.private_openssh)
                .await?;
            self.record.ssh_identity_file = Some(key_path);
            self.persist().await?;

            model.add_ssh_public_key(keypair.public_openssh)?;
        }

        if model.needs_windows_password() {
            tracing::debug!("Generating Windows admin password");
            model.set_windows_password(generate_password());
        }
        Ok(())
    }
}

/// Mark the record failed and persist it; a failed write is only logged
async fn finalize_failure(
    store: &StateStore,
    name: &str,
    record: &mut ClusterRecord,
    err: &TestrigError,
) {
    record.mark_failed(err.to_string());
    if let Err(persist_err) = store.write(name, record).await {
        tracing::warn!("Could not record failure of {}: {}", name, persist_err);
    }
}
