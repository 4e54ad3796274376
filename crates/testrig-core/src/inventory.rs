//! Read-only views over the state store: listing, inspection and the
//! connection details derived from a record

use crate::error::{Result, TestrigError};
use crate::lifecycle::ClusterStatus;
use crate::model::{ApiModel, DEFAULT_ADMIN_USER};
use crate::state::{ClusterRecord, OUTPUT_DIR, StateStore};
use serde::Serialize;
use std::path::PathBuf;

/// Key file the engine drops when it generates the admin key itself
pub const ENGINE_IDENTITY_FILE: &str = "azureuser_rsa";

/// `<dnsPrefix>.<location>.cloudapp.azure.com`, when both parts are known
pub fn fqdn(record: &ClusterRecord) -> Option<String> {
    if record.dns_prefix.is_empty() || record.location.is_empty() {
        return None;
    }
    Some(format!(
        "{}.{}.cloudapp.azure.com",
        record.dns_prefix, record.location
    ))
}

/// One row of `ls`
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub name: String,

    /// `None` when the record could not be read
    pub status: Option<ClusterStatus>,

    pub fqdn: Option<String>,
}

/// A per-entry read failure
#[derive(Debug)]
pub struct EntryError {
    pub name: String,
    pub error: TestrigError,
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error reading state for {:?}: {}", self.name, self.error)
    }
}

#[derive(Debug, Default)]
pub struct Listing {
    /// Sorted by name
    pub clusters: Vec<ClusterSummary>,
    pub errors: Vec<EntryError>,
}

/// Scan every cluster directory. Unreadable records still get a row.
pub async fn list_clusters(store: &StateStore) -> Result<Listing> {
    let mut listing = Listing::default();

    for name in store.entries().await? {
        let record = match store.read(&name).await {
            Ok(record) => Some(record),
            Err(error) => {
                listing.errors.push(EntryError {
                    name: name.clone(),
                    error,
                });
                None
            }
        };

        listing.clusters.push(ClusterSummary {
            status: record.as_ref().map(|r| r.status),
            fqdn: record.as_ref().and_then(fqdn),
            name,
        });
    }

    listing.clusters.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(listing)
}

/// Record and model of one cluster, with whatever failed to load
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub state: Option<ClusterRecord>,
    pub model: Option<ApiModel>,

    #[serde(skip)]
    pub errors: Vec<TestrigError>,
}

pub async fn inspect_cluster(store: &StateStore, name: &str) -> Result<InspectReport> {
    if !store.exists(name).await? {
        return Err(TestrigError::NotFound(name.to_string()));
    }

    let mut errors = Vec::new();
    let model = store
        .read_model(name)
        .await
        .map_err(|e| errors.push(e))
        .ok();
    let state = store.read(name).await.map_err(|e| errors.push(e)).ok();

    Ok(InspectReport {
        state,
        model,
        errors,
    })
}

/// How to reach a cluster's leader nodes over ssh
#[derive(Debug, Clone, PartialEq)]
pub struct SshTarget {
    pub identity_file: Option<PathBuf>,
    pub destination: String,
}

impl SshTarget {
    /// Arguments for the ssh client: identity, user args, destination
    pub fn ssh_args(&self, extra: &[String]) -> Result<Vec<String>> {
        check_ssh_args(extra)?;

        let mut args = Vec::with_capacity(extra.len() + 3);
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args.extend(extra.iter().cloned());
        args.push(self.destination.clone());
        Ok(args)
    }
}

/// The identity file is managed by testrig; callers may not override it
pub fn check_ssh_args(args: &[String]) -> Result<()> {
    if args.iter().any(|a| a == "-i") {
        return Err(TestrigError::InvalidArgument(
            "must not provide `-i` flag to ssh args".to_string(),
        ));
    }
    Ok(())
}

pub async fn ssh_target(store: &StateStore, name: &str) -> Result<SshTarget> {
    let record = store.read(name).await?;
    let Some(host) = fqdn(&record) else {
        return Err(TestrigError::InvalidArgument(format!(
            "cluster {:?} has no address yet (status {})",
            name, record.status
        )));
    };

    let identity_file = match record.ssh_identity_file {
        Some(path) => Some(path),
        None => {
            let candidate = store.output_dir(name)?.join(ENGINE_IDENTITY_FILE);
            tokio::fs::try_exists(&candidate)
                .await
                .unwrap_or(false)
                .then_some(candidate)
        }
    };

    let user = match store.read_model(name).await {
        Ok(model) => model.admin_username().to_string(),
        Err(e) => {
            tracing::debug!("Falling back to default ssh user: {}", e);
            DEFAULT_ADMIN_USER.to_string()
        }
    };

    Ok(SshTarget {
        identity_file,
        destination: format!("{}@{}", user, host),
    })
}

/// Where the engine writes the admin kubeconfig
pub async fn kubeconfig_path(store: &StateStore, name: &str) -> Result<PathBuf> {
    let record = store.read(name).await?;
    Ok(store
        .cluster_dir(name)?
        .join(OUTPUT_DIR)
        .join("kubeconfig")
        .join(format!("kubeconfig.{}.json", record.location)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ready(location: &str, dns_prefix: &str) -> ClusterRecord {
        let mut record = ClusterRecord::new(location);
        record.status = ClusterStatus::Ready;
        record.resource_group = dns_prefix.to_string();
        record.dns_prefix = dns_prefix.to_string();
        record
    }

    #[test]
    fn test_fqdn() {
        let record = ready("eastus", "demo-0a1b2c3d4e5f6071");
        assert_eq!(
            fqdn(&record).as_deref(),
            Some("demo-0a1b2c3d4e5f6071.eastus.cloudapp.azure.com")
        );
        assert_eq!(fqdn(&ClusterRecord::new("eastus")), None);
    }

    #[tokio::test]
    async fn test_list_sorted_with_errors() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        for name in ["beta", "alpha"] {
            store.reserve(name).await.unwrap();
            store
                .write(name, &ready("westus", &format!("{name}-00")))
                .await
                .unwrap();
        }
        let broken = store.reserve("aaa-broken").await.unwrap();
        std::fs::write(broken.join("state.json"), "not json").unwrap();
        std::fs::create_dir(temp_dir.path().join("old.removing")).unwrap();

        let listing = list_clusters(&store).await.unwrap();
        let names: Vec<_> = listing.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["aaa-broken", "alpha", "beta"]);
        assert_eq!(listing.clusters[0].status, None);
        assert_eq!(
            listing.clusters[1].fqdn.as_deref(),
            Some("alpha-00.westus.cloudapp.azure.com")
        );
        assert_eq!(listing.errors.len(), 1);
        assert_eq!(listing.errors[0].name, "aaa-broken");
    }

    #[tokio::test]
    async fn test_inspect_tolerates_corrupt_record() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        let dir = store.reserve("demo").await.unwrap();
        store.write_model("demo", &ApiModel::default()).await.unwrap();
        std::fs::write(dir.join("state.json"), "{").unwrap();

        let report = inspect_cluster(&store, "demo").await.unwrap();
        assert!(report.state.is_none());
        assert_eq!(report.model, Some(ApiModel::default()));
        assert_eq!(report.errors.len(), 1);

        let err = inspect_cluster(&store, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ssh_target_falls_back_to_engine_key() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        store.reserve("demo").await.unwrap();
        store
            .write("demo", &ready("eastus", "demo-01"))
            .await
            .unwrap();

        let target = ssh_target(&store, "demo").await.unwrap();
        assert_eq!(target.identity_file, None);
        assert_eq!(target.destination, "azureuser@demo-01.eastus.cloudapp.azure.com");

        let output = store.output_dir("demo").unwrap();
        std::fs::create_dir_all(&output).unwrap();
        std::fs::write(output.join(ENGINE_IDENTITY_FILE), "key").unwrap();
        let mut model = ApiModel::default();
        model.properties.linux_profile.admin_username = "ops".into();
        store.write_model("demo", &model).await.unwrap();

        let target = ssh_target(&store, "demo").await.unwrap();
        assert_eq!(target.identity_file, Some(output.join(ENGINE_IDENTITY_FILE)));
        assert_eq!(target.destination, "ops@demo-01.eastus.cloudapp.azure.com");
    }

    #[test]
    fn test_ssh_args() {
        let target = SshTarget {
            identity_file: Some(PathBuf::from("/state/demo/id_rsa")),
            destination: "azureuser@demo.eastus.cloudapp.azure.com".into(),
        };
        let args = target.ssh_args(&["-v".to_string()]).unwrap();
        assert_eq!(
            args,
            vec![
                "-i",
                "/state/demo/id_rsa",
                "-v",
                "azureuser@demo.eastus.cloudapp.azure.com"
            ]
        );

        let err = target.ssh_args(&["-i".to_string(), "other".to_string()]).unwrap_err();
        assert!(matches!(err, TestrigError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_kubeconfig_path() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        store.reserve("demo").await.unwrap();
        store
            .write("demo", &ready("centralus", "demo-01"))
            .await
            .unwrap();

        let path = kubeconfig_path(&store, "demo").await.unwrap();
        assert_eq!(
            path,
            temp_dir
                .path()
                .join("demo/_output/kubeconfig/kubeconfig.centralus.json")
        );
        assert!(kubeconfig_path(&store, "ghost").await.unwrap_err().is_not_found());
    }
}
