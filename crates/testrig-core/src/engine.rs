//! Provisioning engine: turns an API model into ARM deployment artifacts
//!
//! The default implementation shells out to `acs-engine generate`.

use crate::error::{Result, TestrigError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use testrig_cloud::DeploymentTemplate;
use tokio::process::Command;

pub const DEFAULT_ENGINE: &str = "acs-engine";
pub const TEMPLATE_FILE: &str = "azuredeploy.json";
pub const PARAMETERS_FILE: &str = "azuredeploy.parameters.json";

#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Engine name used in error messages
    fn name(&self) -> &str;

    /// Generate deployment artifacts for `model` into `output_dir`.
    /// Dropping the returned future must abandon the run.
    async fn generate(&self, model: &Path, output_dir: &Path) -> Result<()>;
}

/// `acs-engine` subprocess
#[derive(Debug, Clone)]
pub struct AcsEngine {
    path: PathBuf,
}

impl AcsEngine {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use `path_or_name` directly if it exists, otherwise look it up on `PATH`
    pub fn locate(path_or_name: impl AsRef<Path>) -> Result<Self> {
        let candidate = path_or_name.as_ref();
        if candidate.is_file() {
            return Ok(Self::new(candidate));
        }

        let not_found = || TestrigError::ToolNotFound(candidate.display().to_string());
        if candidate.components().count() != 1 {
            return Err(not_found());
        }

        let paths = std::env::var_os("PATH").ok_or_else(not_found)?;
        std::env::split_paths(&paths)
            .map(|dir| dir.join(candidate))
            .find(|p| p.is_file())
            .map(Self::new)
            .ok_or_else(not_found)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProvisioningEngine for AcsEngine {
    fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_ENGINE)
    }

    async fn generate(&self, model: &Path, output_dir: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("generate")
            .arg("--output-directory")
            .arg(output_dir)
            .arg("--api-model")
            .arg(model)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            "Running: {} generate --output-directory {} --api-model {}",
            self.path.display(),
            output_dir.display(),
            model.display()
        );

        // kill_on_drop ends the child if the caller stops waiting
        let output = cmd
            .output()
            .await
            .map_err(TestrigError::io(format!("running {}", self.path.display())))?;

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(TestrigError::ExternalTool {
                tool: self.name().to_string(),
                output: captured,
            });
        }

        Ok(())
    }
}

/// Load the template and parameters the engine wrote into `output_dir`
pub async fn read_deployment(output_dir: &Path) -> Result<DeploymentTemplate> {
    let template = read_json(&output_dir.join(TEMPLATE_FILE)).await?;
    let parameters = read_json(&output_dir.join(PARAMETERS_FILE))
        .await?
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));

    Ok(DeploymentTemplate {
        template,
        parameters,
    })
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(TestrigError::io(format!("reading {}", path.display())))?;
    serde_json::from_str(&content).map_err(TestrigError::json(format!("decoding {}", path.display())))
}
