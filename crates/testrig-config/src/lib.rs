pub mod error;

pub use error::*;

use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the user's home used when no state dir is given
pub const DEFAULT_STATE_DIR_NAME: &str = ".testrig";

/// User config file name inside the state dir
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Prefix for environment overrides, e.g. `TESTRIG_LOCATION=westus2`
pub const ENV_PREFIX: &str = "TESTRIG";

/// Default number of clusters removed at the same time by `rm`
pub const DEFAULT_MAX_CONCURRENT_REMOVALS: usize = 8;

/// Default state directory: `~/.testrig`
pub fn default_state_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_STATE_DIR_NAME))
        .ok_or(ConfigError::HomeDirNotFound)
}

/// Default location of the user config for a state dir
pub fn default_config_path(state_dir: &Path) -> PathBuf {
    state_dir.join(CONFIG_FILE_NAME)
}

/// Settings read from the user config file
///
/// ```toml
/// subscription = "00000000-0000-0000-0000-000000000000"
/// location = "westus2"
///
/// [profile]
/// kubernetes_version = "1.11"
///
/// [profile.leader.linux]
/// sku = "Standard_DS2_v2"
/// count = 1
///
/// [profile.auth.linux]
/// user = "azureuser"
/// public_key_file = "/home/me/.ssh/id_rsa.pub"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub subscription: Option<String>,
    pub location: Option<String>,
    pub acs_engine_path: Option<String>,
    pub max_concurrent_removals: Option<usize>,
    pub profile: Profile,
}

impl UserConfig {
    pub fn max_concurrent_removals(&self) -> usize {
        self.max_concurrent_removals
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REMOVALS)
    }
}

/// Overrides applied on top of the default cluster model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub kubernetes_version: Option<String>,
    pub leader: LeaderProfile,
    pub agent: AgentProfile,
    pub auth: AuthProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderProfile {
    pub linux: PoolProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub linux: PoolProfile,
    pub windows: PoolProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolProfile {
    pub sku: Option<String>,
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthProfile {
    pub linux: LinuxAuth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxAuth {
    pub user: Option<String>,
    pub public_key_file: Option<PathBuf>,
}

/// Load the user config.
///
/// A missing file is only an error when the path was given explicitly;
/// the default location is allowed to be absent. `TESTRIG_*` environment
/// variables override file values (`__` separates nested keys, e.g.
/// `TESTRIG_PROFILE__KUBERNETES_VERSION`).
pub fn load_user_config(path: &Path, explicit: bool) -> Result<UserConfig> {
    let exists = path.is_file();
    if !exists && explicit {
        return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
    }

    let mut builder = config::Config::builder();
    if exists {
        tracing::debug!("Loading user config from {}", path.display());
        builder = builder.add_source(
            File::new(&path.to_string_lossy(), FileFormat::Toml).required(true),
        );
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder
        .build()
        .and_then(|c| c.try_deserialize::<UserConfig>())
        .map_err(|source| ConfigError::Decode {
            path: path.to_path_buf(),
            source,
        })
}
