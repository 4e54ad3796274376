//! Cluster lifecycle statuses and the transitions allowed between them
//!
//! ```text
//!   (reserve) ──► Initialized ──► Creating ──► Ready ──┐
//!                     │              │                 │
//!                     └──► Failed ◄──┘                 │
//!                            │                         │
//!                            └────────► Removing ◄─────┘
//!                                       │     ▲
//!                           (deleted) ◄─┘     │
//!                                       └─► Dead
//! ```

use crate::error::{Result, TestrigError};
use serde::{Deserialize, Serialize};

/// Status of a cluster record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    /// Name reserved, nothing materialized yet
    Initialized,
    /// Spec written, provisioning in progress
    Creating,
    /// Provisioning finished
    Ready,
    /// Provisioning failed; see the record's failure message
    Failed,
    /// Cloud teardown in progress
    Removing,
    /// Cloud teardown failed; local state kept for inspection or retry
    Dead,
}

impl ClusterStatus {
    /// Whether `self -> next` is a legal lifecycle step
    pub fn can_transition_to(self, next: ClusterStatus) -> bool {
        use ClusterStatus::*;
        matches!(
            (self, next),
            (Initialized, Creating)
                | (Initialized, Failed)
                | (Creating, Ready)
                | (Creating, Failed)
                | (Ready, Removing)
                | (Failed, Removing)
                | (Dead, Removing)
                | (Removing, Dead)
        )
    }

    /// A workflow currently owns the record
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ClusterStatus::Initialized | ClusterStatus::Creating | ClusterStatus::Removing
        )
    }

    /// Reject removal while a create or another remove may be running
    pub fn ensure_removable(self) -> Result<()> {
        if self.is_in_flight() {
            return Err(TestrigError::Conflict(format!(
                "cannot remove while status is in state {:?}",
                self.title()
            )));
        }
        Ok(())
    }

    /// Capitalized name for table output
    pub fn title(self) -> &'static str {
        match self {
            ClusterStatus::Initialized => "Initialized",
            ClusterStatus::Creating => "Creating",
            ClusterStatus::Ready => "Ready",
            ClusterStatus::Failed => "Failed",
            ClusterStatus::Removing => "Removing",
            ClusterStatus::Dead => "Dead",
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title().to_ascii_lowercase())
    }
}
