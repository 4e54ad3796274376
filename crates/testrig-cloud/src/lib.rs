//! testrig cloud abstraction
//!
//! This crate defines the provider seam used by the cluster workflows in
//! `testrig-core`. A provider only has to manage resource groups and
//! template deployments; everything else about a cluster lives in the
//! local state directory.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   testrig CLI                    │
//! │          (create / ls / inspect / rm)            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 testrig-core                     │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │  Workflows   │  │ State Store  │             │
//! │  └──────┬───────┘  └──────────────┘             │
//! └─────────┼───────────────────────────────────────┘
//!           │ trait CloudProvider
//! ┌─────────▼───────┐
//! │  testrig-cloud  │
//! │     -azure      │
//! └─────────────────┘
//! ```

pub mod error;
pub mod provider;

// Re-exports
pub use error::{CloudError, Result};
pub use provider::{
    AuthStatus, CloudProvider, DeploymentResult, DeploymentTemplate, PollConfig, PollStatus,
    poll_until,
};
