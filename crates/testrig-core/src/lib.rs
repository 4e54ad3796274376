//! testrig core
//!
//! Cluster lifecycle tracking and the workflows built on it. All durable
//! state lives in one directory per cluster under the state root; there is
//! no other index.
//!
//! - [`create_cluster`] reserves a name, materializes credentials, runs the
//!   provisioning engine and submits the deployment
//! - [`remove_clusters`] tears clusters down concurrently and reports every
//!   outcome
//! - [`list_clusters`] / [`inspect_cluster`] read the store without failing
//!   on a single bad entry

pub mod create;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod model;
pub mod remove;
pub mod secrets;
pub mod state;
pub mod workflow;

// Re-exports
pub use create::{CreateRequest, create_cluster};
pub use engine::{AcsEngine, ProvisioningEngine, read_deployment};
pub use error::{Result, TestrigError};
pub use inventory::{
    ClusterSummary, EntryError, InspectReport, Listing, SshTarget, check_ssh_args, fqdn,
    inspect_cluster, kubeconfig_path, list_clusters, ssh_target,
};
pub use lifecycle::ClusterStatus;
pub use model::ApiModel;
pub use remove::{RemoveOutcome, RemoveReport, remove_cluster, remove_clusters};
pub use state::{ClusterRecord, StateStore};
pub use workflow::{WorkflowConfig, cancellable, ensure_authenticated};
