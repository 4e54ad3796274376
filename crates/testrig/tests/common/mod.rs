use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Scratch state directory plus a service principal file, so no command
/// ever reaches for the Azure CLI
pub struct TestState {
    pub root: TempDir,
}

impl TestState {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("auth.json"),
            r#"{
  "clientId": "00000000-0000-0000-0000-000000000001",
  "clientSecret": "not-a-secret",
  "subscriptionId": "00000000-0000-0000-0000-000000000002",
  "tenantId": "00000000-0000-0000-0000-000000000003"
}"#,
        )
        .unwrap();
        Self { root }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join("state")
    }

    /// Write `<state>/<name>/state.json` verbatim
    pub fn seed(&self, name: &str, state_json: &str) {
        let dir = self.state_dir().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state.json"), state_json).unwrap();
    }

    #[allow(dead_code)]
    pub fn cluster_exists(&self, name: &str) -> bool {
        self.state_dir().join(name).exists()
    }

    /// `testrig` bound to this state directory with a clean environment
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("testrig").unwrap();
        for var in [
            "TESTRIG_CONFIG",
            "TESTRIG_STATE_DIR",
            "TESTRIG_LOCATION",
            "TESTRIG_SUBSCRIPTION",
            "TESTRIG_ACS_ENGINE_PATH",
            "TESTRIG_MAX_CONCURRENT_REMOVALS",
            "RUST_LOG",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("NO_COLOR", "1")
            .env("AZURE_AUTH_LOCATION", self.root.path().join("auth.json"))
            .arg("--state-dir")
            .arg(self.state_dir());
        cmd
    }
}
