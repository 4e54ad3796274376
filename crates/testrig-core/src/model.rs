//! Desired cluster spec in the provisioning engine's "vlabs" API model format

use crate::error::{Result, TestrigError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ADMIN_USER: &str = "azureuser";
pub const DEFAULT_VM_SIZE: &str = "Standard_DS2_v2";
pub const LINUX_POOL_NAME: &str = "agentpool1";
pub const WINDOWS_POOL_NAME: &str = "agentwin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModel {
    pub api_version: String,

    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Properties {
    pub orchestrator_profile: OrchestratorProfile,
    pub master_profile: MasterProfile,
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    pub linux_profile: LinuxProfile,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_profile: Option<WindowsProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorProfile {
    pub orchestrator_type: String,
    pub orchestrator_release: String,
    pub kubernetes_config: KubernetesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KubernetesConfig {
    pub use_managed_identity: bool,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_plugin: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub network_policy: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub container_runtime: String,
}

/// Leader (control plane) nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MasterProfile {
    pub count: u32,
    pub vm_size: String,

    #[serde(rename = "osDiskSizeGB")]
    pub os_disk_size_gb: u32,

    pub storage_profile: String,
    pub dns_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentPoolProfile {
    pub name: String,
    pub count: u32,
    pub vm_size: String,

    #[serde(rename = "osDiskSizeGB")]
    pub os_disk_size_gb: u32,

    pub storage_profile: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerated_networking_enabled: Option<bool>,

    pub os_type: String,
    pub availability_profile: String,
}

impl AgentPoolProfile {
    pub fn is_windows(&self) -> bool {
        self.os_type.eq_ignore_ascii_case("windows")
    }

    pub fn is_linux(&self) -> bool {
        self.os_type.eq_ignore_ascii_case("linux")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinuxProfile {
    pub admin_username: String,
    pub ssh: SshConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConfig {
    pub public_keys: Vec<SshPublicKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshPublicKey {
    pub key_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WindowsProfile {
    pub admin_username: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub admin_password: String,
}

impl Default for ApiModel {
    /// Kubernetes 1.10 with three leaders, three Linux agents and an
    /// empty Windows pool
    fn default() -> Self {
        let pool = |name: &str, count: u32, os_type: &str, accelerated: Option<bool>| {
            AgentPoolProfile {
                name: name.to_string(),
                count,
                vm_size: DEFAULT_VM_SIZE.to_string(),
                os_disk_size_gb: 200,
                storage_profile: "ManagedDisks".to_string(),
                accelerated_networking_enabled: accelerated,
                os_type: os_type.to_string(),
                availability_profile: "VirtualMachineScaleSets".to_string(),
            }
        };

        Self {
            api_version: "vlabs".to_string(),
            properties: Properties {
                orchestrator_profile: OrchestratorProfile {
                    orchestrator_type: "Kubernetes".to_string(),
                    orchestrator_release: "1.10".to_string(),
                    kubernetes_config: KubernetesConfig {
                        use_managed_identity: true,
                        network_plugin: "azure".to_string(),
                        network_policy: "azure".to_string(),
                        container_runtime: String::new(),
                    },
                },
                master_profile: MasterProfile {
                    count: 3,
                    vm_size: DEFAULT_VM_SIZE.to_string(),
                    os_disk_size_gb: 200,
                    storage_profile: "ManagedDisks".to_string(),
                    dns_prefix: String::new(),
                },
                agent_pool_profiles: vec![
                    pool(LINUX_POOL_NAME, 3, "Linux", Some(true)),
                    pool(WINDOWS_POOL_NAME, 0, "Windows", None),
                ],
                linux_profile: LinuxProfile {
                    admin_username: DEFAULT_ADMIN_USER.to_string(),
                    ssh: SshConfig::default(),
                },
                windows_profile: None,
            },
        }
    }
}

impl ApiModel {
    /// Drop agent pools that would have no nodes
    pub fn prune_empty_agent_pools(&mut self) {
        self.properties.agent_pool_profiles.retain(|p| p.count > 0);
    }

    /// Structural checks done before anything is created
    pub fn validate_for_create(&self) -> Result<()> {
        if self.properties.agent_pool_profiles.is_empty() {
            return Err(TestrigError::InvalidSpec(
                "must have at least 1 agent node".to_string(),
            ));
        }
        if self.properties.linux_profile.ssh.public_keys.len() > 1 {
            return Err(TestrigError::InvalidSpec(
                "only one ssh key is supported".to_string(),
            ));
        }
        Ok(())
    }

    /// First Linux agent pool, if any
    pub fn linux_agent_pool_mut(&mut self) -> Option<&mut AgentPoolProfile> {
        self.properties
            .agent_pool_profiles
            .iter_mut()
            .find(|p| p.is_linux())
    }

    /// First Windows agent pool, if any
    pub fn windows_agent_pool_mut(&mut self) -> Option<&mut AgentPoolProfile> {
        self.properties
            .agent_pool_profiles
            .iter_mut()
            .find(|p| p.is_windows())
    }

    pub fn has_windows_nodes(&self) -> bool {
        self.properties
            .agent_pool_profiles
            .iter()
            .any(|p| p.count > 0 && p.is_windows())
    }

    /// Linux admin user, falling back to the engine's default
    pub fn admin_username(&self) -> &str {
        match self.properties.linux_profile.admin_username.as_str() {
            "" => DEFAULT_ADMIN_USER,
            user => user,
        }
    }

    pub fn set_dns_prefix(&mut self, prefix: impl Into<String>) {
        self.properties.master_profile.dns_prefix = prefix.into();
    }

    pub fn has_ssh_key(&self) -> bool {
        !self.properties.linux_profile.ssh.public_keys.is_empty()
    }

    /// Add an authorized key. Only a single key is supported.
    pub fn add_ssh_public_key(&mut self, key_data: impl Into<String>) -> Result<()> {
        let keys = &mut self.properties.linux_profile.ssh.public_keys;
        if !keys.is_empty() {
            return Err(TestrigError::InvalidSpec(
                "only one ssh key is supported".to_string(),
            ));
        }
        keys.push(SshPublicKey {
            key_data: key_data.into(),
        });
        Ok(())
    }

    /// Windows nodes are requested but nobody supplied an admin password
    pub fn needs_windows_password(&self) -> bool {
        self.has_windows_nodes()
            && self
                .properties
                .windows_profile
                .as_ref()
                .is_none_or(|w| w.admin_password.is_empty())
    }

    pub fn set_windows_password(&mut self, password: impl Into<String>) {
        let profile = self
            .properties
            .windows_profile
            .get_or_insert_with(|| WindowsProfile {
                admin_username: DEFAULT_ADMIN_USER.to_string(),
                admin_password: String::new(),
            });
        if profile.admin_username.is_empty() {
            profile.admin_username = DEFAULT_ADMIN_USER.to_string();
        }
        profile.admin_password = password.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_json() {
        let model = ApiModel::default();
        let json = serde_json::to_value(&model).unwrap();

        assert_eq!(json["apiVersion"], "vlabs");
        let props = &json["properties"];
        assert_eq!(props["orchestratorProfile"]["orchestratorRelease"], "1.10");
        assert_eq!(props["masterProfile"]["osDiskSizeGB"], 200);
        assert_eq!(props["agentPoolProfiles"][0]["name"], "agentpool1");
        assert_eq!(props["agentPoolProfiles"][0]["acceleratedNetworkingEnabled"], true);
        assert_eq!(props["linuxProfile"]["adminUsername"], "azureuser");
        assert!(props.get("windowsProfile").is_none());
    }

    #[test]
    fn test_prune_and_validate() {
        let mut model = ApiModel::default();
        model.prune_empty_agent_pools();
        assert_eq!(model.properties.agent_pool_profiles.len(), 1);
        assert!(model.validate_for_create().is_ok());

        model.linux_agent_pool_mut().unwrap().count = 0;
        model.prune_empty_agent_pools();
        let err = model.validate_for_create().unwrap_err();
        assert!(matches!(err, TestrigError::InvalidSpec(_)));
    }

    #[test]
    fn test_single_ssh_key() {
        let mut model = ApiModel::default();
        model.add_ssh_public_key("ssh-rsa AAAA one").unwrap();
        assert!(model.has_ssh_key());
        assert!(model.add_ssh_public_key("ssh-rsa AAAA two").is_err());

        model
            .properties
            .linux_profile
            .ssh
            .public_keys
            .push(SshPublicKey {
                key_data: "ssh-rsa AAAA two".into(),
            });
        assert!(model.validate_for_create().is_err());
    }

    #[test]
    fn test_windows_password_needed_only_with_nodes() {
        let mut model = ApiModel::default();
        assert!(!model.needs_windows_password());

        model.windows_agent_pool_mut().unwrap().count = 2;
        assert!(model.needs_windows_password());

        model.set_windows_password("Secret123");
        assert!(!model.needs_windows_password());
        let profile = model.properties.windows_profile.as_ref().unwrap();
        assert_eq!(profile.admin_username, "azureuser");
    }

    #[test]
    fn test_partial_model_parses() {
        let model: ApiModel = serde_json::from_str(
            r#"{"apiVersion":"vlabs","properties":{"linuxProfile":{"adminUsername":""}}}"#,
        )
        .unwrap();
        assert_eq!(model.admin_username(), "azureuser");
        assert!(model.properties.agent_pool_profiles.is_empty());
    }
}
