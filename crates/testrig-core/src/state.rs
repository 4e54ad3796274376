//! Local cluster state
//!
//! Every cluster owns one directory under the state root:
//!
//! ```text
//! <state-dir>/
//!   demo/
//!     state.json      lifecycle record
//!     apimodel.json   desired spec (0600)
//!     id_rsa          generated private key (0600, optional)
//!     _output/        provisioning engine output
//!   old.removing/     tombstone, never listed
//! ```
//!
//! The directory itself is the uniqueness primitive: [`StateStore::reserve`]
//! creates it exclusively, and a record exists iff its directory exists.

use crate::error::{Result, TestrigError};
use crate::lifecycle::ClusterStatus;
use crate::model::ApiModel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const STATE_FILE: &str = "state.json";
pub const MODEL_FILE: &str = "apimodel.json";
pub const PRIVATE_KEY_FILE: &str = "id_rsa";
pub const OUTPUT_DIR: &str = "_output";
pub const TOMBSTONE_SUFFIX: &str = ".removing";

/// Lifecycle record persisted as `state.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub status: ClusterStatus,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub resource_group: String,

    #[serde(default)]
    pub dns_prefix: String,

    #[serde(default)]
    pub deployment_name: String,

    #[serde(default)]
    pub failure_message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_identity_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ClusterRecord {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            status: ClusterStatus::Initialized,
            location: location.into(),
            resource_group: String::new(),
            dns_prefix: String::new(),
            deployment_name: String::new(),
            failure_message: String::new(),
            ssh_identity_file: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Move to `next`, rejecting steps the lifecycle does not allow
    pub fn transition(&mut self, next: ClusterStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TestrigError::Conflict(format!(
                "illegal status transition from {} to {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Terminal failure of a create. The first recorded message wins.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ClusterStatus::Failed;
        if self.failure_message.is_empty() {
            self.failure_message = message.into();
        }
    }
}

/// Filesystem-backed store of cluster directories
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory of a cluster; the name is validated first
    pub fn cluster_dir(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    pub fn output_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.cluster_dir(name)?.join(OUTPUT_DIR))
    }

    pub fn model_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.cluster_dir(name)?.join(MODEL_FILE))
    }

    /// Claim a name by creating its directory exclusively
    pub async fn reserve(&self, name: &str) -> Result<PathBuf> {
        let dir = self.cluster_dir(name)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(TestrigError::io(format!(
                "creating state directory {}",
                self.root.display()
            )))?;

        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(0o700);
        match builder.create(&dir).await {
            Ok(()) => {
                tracing::debug!("Reserved {}", dir.display());
                Ok(dir)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
                TestrigError::Conflict(format!("cluster {:?} already exists", name)),
            ),
            Err(e) => Err(TestrigError::Io {
                context: format!("creating {}", dir.display()),
                source: e,
            }),
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let dir = self.cluster_dir(name)?;
        fs::try_exists(&dir)
            .await
            .map_err(TestrigError::io(format!("checking {}", dir.display())))
    }

    /// Overwrite the record of `name`
    pub async fn write(&self, name: &str, record: &ClusterRecord) -> Result<()> {
        let path = self.cluster_dir(name)?.join(STATE_FILE);
        let content = serde_json::to_string_pretty(record)
            .map_err(TestrigError::json(format!("encoding state of {}", name)))?;
        fs::write(&path, content)
            .await
            .map_err(TestrigError::io(format!("writing {}", path.display())))?;

        tracing::debug!("Saved state of {} ({})", name, record.status);
        Ok(())
    }

    pub async fn read(&self, name: &str) -> Result<ClusterRecord> {
        let path = self.cluster_dir(name)?.join(STATE_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TestrigError::NotFound(name.to_string()));
            }
            Err(e) => {
                return Err(TestrigError::Io {
                    context: format!("reading {}", path.display()),
                    source: e,
                });
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| TestrigError::CorruptState(format!("{}: {}", path.display(), e)))
    }

    /// Hide the directory behind a tombstone name, then delete it.
    /// A directory that is already gone counts as deleted.
    pub async fn tombstone_and_delete(&self, name: &str) -> Result<()> {
        let dir = self.cluster_dir(name)?;
        let tombstone = self.root.join(format!("{}{}", name, TOMBSTONE_SUFFIX));

        // leftover from an interrupted delete
        remove_dir_if_present(&tombstone).await?;

        match fs::rename(&dir, &tombstone).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("{} already gone", dir.display());
                return Ok(());
            }
            Err(e) => {
                return Err(TestrigError::Io {
                    context: format!("renaming {}", dir.display()),
                    source: e,
                });
            }
        }

        remove_dir_if_present(&tombstone).await?;
        tracing::debug!("Deleted local state of {}", name);
        Ok(())
    }

    /// Names of all cluster directories, tombstones excluded.
    /// A missing state root has no entries.
    pub async fn entries(&self) -> Result<Vec<String>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(TestrigError::Io {
                    context: format!("reading {}", self.root.display()),
                    source: e,
                });
            }
        };

        let context = format!("reading {}", self.root.display());
        let mut names = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(TestrigError::io(context.clone()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(TestrigError::io(context.clone()))?;
            if !file_type.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.ends_with(TOMBSTONE_SUFFIX) || name.starts_with('.') {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    pub async fn write_model(&self, name: &str, model: &ApiModel) -> Result<PathBuf> {
        let path = self.model_path(name)?;
        let content = serde_json::to_vec_pretty(model)
            .map_err(TestrigError::json(format!("encoding api model of {}", name)))?;
        write_private(&path, &content).await?;
        Ok(path)
    }

    pub async fn read_model(&self, name: &str) -> Result<ApiModel> {
        let path = self.model_path(name)?;
        let content = fs::read_to_string(&path)
            .await
            .map_err(TestrigError::io(format!("reading {}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(TestrigError::json(format!("decoding {}", path.display())))
    }

    /// Store a generated private key next to the record
    pub async fn write_private_key(&self, name: &str, pem: &str) -> Result<PathBuf> {
        let path = self.cluster_dir(name)?.join(PRIVATE_KEY_FILE);
        write_private(&path, pem.as_bytes()).await?;
        Ok(path)
    }
}

/// Cluster names become directory names, so keep them to one path component
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name == "." || name == ".." {
        Some("name is a relative path")
    } else if name.contains(['/', '\\']) {
        Some("name contains a path separator")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else if name.ends_with(TOMBSTONE_SUFFIX) {
        Some("name ends with the reserved suffix .removing")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(TestrigError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Write a file readable by the owner only
async fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let context = format!("writing {}", path.display());
    let mut file = options
        .open(path)
        .await
        .map_err(TestrigError::io(context.clone()))?;
    file.write_all(content)
        .await
        .map_err(TestrigError::io(context.clone()))?;
    file.flush().await.map_err(TestrigError::io(context))?;
    Ok(())
}

async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TestrigError::Io {
            context: format!("deleting {}", path.display()),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_reserve_twice_conflicts() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path().join("state"));

        store.reserve("demo").await.unwrap();
        let mut record = ClusterRecord::new("eastus");
        record.resource_group = "demo-0011223344556677".into();
        store.write("demo", &record).await.unwrap();

        let err = store.reserve("demo").await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.read("demo").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());

        assert!(store.read("ghost").await.unwrap_err().is_not_found());

        // reserved but never persisted
        store.reserve("half").await.unwrap();
        assert!(store.read("half").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        store.reserve("demo").await.unwrap();

        let mut record = ClusterRecord::new("westus2");
        record.transition(ClusterStatus::Creating).unwrap();
        record.dns_prefix = "demo-a1b2c3d4e5f60718".into();
        record.ssh_identity_file = Some(temp_dir.path().join("demo/id_rsa"));
        store.write("demo", &record).await.unwrap();

        let first = store.read("demo").await.unwrap();
        store.write("demo", &first).await.unwrap();
        let second = store.read("demo").await.unwrap();
        assert_eq!(first, record);
        assert_eq!(second, record);
    }

    #[tokio::test]
    async fn test_missing_fields_default_to_empty() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        let dir = store.reserve("old").await.unwrap();
        std::fs::write(dir.join(STATE_FILE), r#"{"status":"ready"}"#).unwrap();

        let record = store.read("old").await.unwrap();
        assert_eq!(record.status, ClusterStatus::Ready);
        assert!(record.location.is_empty());
        assert!(record.created_at.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        let dir = store.reserve("bad").await.unwrap();
        std::fs::write(dir.join(STATE_FILE), "{ not json").unwrap();

        let err = store.read("bad").await.unwrap_err();
        assert!(matches!(err, TestrigError::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_tombstone_and_delete() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        let dir = store.reserve("demo").await.unwrap();
        std::fs::create_dir_all(dir.join(OUTPUT_DIR).join("kubeconfig")).unwrap();
        store.write("demo", &ClusterRecord::new("eastus")).await.unwrap();

        store.tombstone_and_delete("demo").await.unwrap();
        assert!(!dir.exists());
        assert!(!temp_dir.path().join("demo.removing").exists());

        // already gone
        store.tombstone_and_delete("demo").await.unwrap();
    }

    #[tokio::test]
    async fn test_entries_skip_tombstones_and_files() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        for name in ["zeta", "alpha", "mid"] {
            store.reserve(name).await.unwrap();
        }
        std::fs::create_dir(temp_dir.path().join("gone.removing")).unwrap();
        std::fs::write(temp_dir.path().join("config.toml"), "").unwrap();

        assert_eq!(store.entries().await.unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_entries_missing_root() {
        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path().join("nope"));
        assert!(store.entries().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let store = StateStore::new(temp_dir.path());
        let dir = store.reserve("demo").await.unwrap();

        let key = store.write_private_key("demo", "-----BEGIN-----").await.unwrap();
        let model = store.write_model("demo", &ApiModel::default()).await.unwrap();

        for path in [key, model] {
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("demo-1").is_ok());
        for bad in ["", ".", "..", "a/b", ".hidden", "x.removing"] {
            assert!(
                matches!(validate_name(bad), Err(TestrigError::InvalidName { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_illegal_transition() {
        let mut record = ClusterRecord::new("eastus");
        let err = record.transition(ClusterStatus::Ready).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(record.status, ClusterStatus::Initialized);
    }

    #[test]
    fn test_mark_failed_keeps_first_message() {
        let mut record = ClusterRecord::new("eastus");
        record.transition(ClusterStatus::Creating).unwrap();
        record.mark_failed("engine output");
        record.mark_failed("later error");
        assert_eq!(record.status, ClusterStatus::Failed);
        assert_eq!(record.failure_message, "engine output");
    }
}
