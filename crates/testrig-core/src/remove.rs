//! Cluster removal
//!
//! Each name is removed independently: guard the status, mark the record
//! `Removing`, delete the resource group, then drop the local directory.
//! A failed teardown leaves the record `Dead` unless `force` is set, in
//! which case local state is discarded and the failure is still reported.
//! With `force`, a record refused by the status guard is discarded too.

use crate::error::{Result, TestrigError};
use crate::lifecycle::ClusterStatus;
use crate::state::{ClusterRecord, StateStore};
use crate::workflow::{WorkflowConfig, cancellable, ensure_authenticated};
use std::sync::Arc;
use testrig_cloud::CloudProvider;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Outcome of removing one cluster
#[derive(Debug)]
pub struct RemoveOutcome {
    pub name: String,
    pub result: Result<()>,
}

/// Outcomes of a bulk remove, in request order
#[derive(Debug, Default)]
pub struct RemoveReport {
    pub outcomes: Vec<RemoveOutcome>,
}

impl RemoveReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.name.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TestrigError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.name.as_str(), e)))
    }

    /// Some failure left state behind that a retry or `--force` could clear
    pub fn has_recoverable_failure(&self) -> bool {
        self.failures().any(|(_, e)| !e.is_not_found())
    }
}

/// Remove several clusters concurrently, bounded by
/// `config.max_concurrent_removals`. Never stops early.
pub async fn remove_clusters(
    names: &[String],
    force: bool,
    provider: Arc<dyn CloudProvider>,
    config: &WorkflowConfig,
    cancel: &CancellationToken,
) -> RemoveReport {
    let store = config.store();
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_removals.max(1)));

    let mut unique: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(name) {
            unique.push(name.clone());
        }
    }

    let mut handles = Vec::with_capacity(unique.len());
    for name in unique {
        let semaphore = Arc::clone(&semaphore);
        let store = store.clone();
        let provider = Arc::clone(&provider);
        let cancel = cancel.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| TestrigError::Task(e.to_string()))?;
            remove_cluster(&store, &task_name, force, provider.as_ref(), &cancel).await
        });
        handles.push((name, handle));
    }

    let mut report = RemoveReport::default();
    for (name, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(TestrigError::Task(e.to_string())),
        };
        match &result {
            Ok(()) => tracing::info!("Removed {}", name),
            Err(e) => tracing::debug!("Removing {} failed: {}", name, e),
        }
        report.outcomes.push(RemoveOutcome { name, result });
    }
    report
}

/// Remove a single cluster
pub async fn remove_cluster(
    store: &StateStore,
    name: &str,
    force: bool,
    provider: &dyn CloudProvider,
    cancel: &CancellationToken,
) -> Result<()> {
    if !store.exists(name).await? {
        return Err(TestrigError::NotFound(name.to_string()));
    }

    let mut record = match store.read(name).await {
        Ok(record) => record,
        Err(err) => {
            if force {
                tracing::warn!("Discarding unreadable state of {}: {}", name, err);
                discard_local(store, name).await;
            }
            return Err(err);
        }
    };

    if let Err(err) = record.status.ensure_removable() {
        if force {
            tracing::warn!("Discarding local state of {} while {}", name, record.status);
            discard_local(store, name).await;
        }
        return Err(err);
    }

    // errors before the delete is sent keep the local record, even with force
    ensure_authenticated(provider).await?;
    record.transition(ClusterStatus::Removing)?;
    store.write(name, &record).await?;

    match delete_resource_group(provider, &record, cancel).await {
        Ok(()) => store.tombstone_and_delete(name).await,
        Err(err) if force && !matches!(err, TestrigError::Cancelled) => {
            tracing::warn!("Removing local state of {} despite error: {}", name, err);
            discard_local(store, name).await;
            Err(err)
        }
        Err(err) => {
            record.status = ClusterStatus::Dead;
            record.failure_message = err.to_string();
            if let Err(persist_err) = store.write(name, &record).await {
                tracing::warn!("Could not mark {} dead: {}", name, persist_err);
            }
            Err(err)
        }
    }
}

async fn delete_resource_group(
    provider: &dyn CloudProvider,
    record: &ClusterRecord,
    cancel: &CancellationToken,
) -> Result<()> {
    if record.resource_group.is_empty() {
        return Err(TestrigError::CorruptState(
            "missing resource group in state object, cannot remove".to_string(),
        ));
    }

    tracing::info!("Deleting resource group {}", record.resource_group);
    let deleted = cancellable(cancel, async {
        provider
            .delete_resource_group(&record.resource_group)
            .await
            .map_err(TestrigError::from)
    })
    .await;

    match deleted {
        Err(TestrigError::Cloud(e)) if e.is_not_found() => {
            tracing::debug!("Resource group {} already gone", record.resource_group);
            Ok(())
        }
        other => other,
    }
}

async fn discard_local(store: &StateStore, name: &str) {
    if let Err(e) = store.tombstone_and_delete(name).await {
        tracing::warn!("Could not delete local state of {}: {}", name, e);
    }
}
