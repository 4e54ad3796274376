//! Azure provider for testrig
//!
//! This crate implements the `CloudProvider` trait against Azure Resource
//! Manager, letting testrig create and delete the resource groups and
//! template deployments that back a test cluster.
//!
//! # Requirements
//!
//! Either:
//!
//! - `AZURE_AUTH_LOCATION` pointing at a service principal auth file, or
//! - the `az` CLI installed and logged in (`az login`)
//!
//! # Example
//!
//! ```ignore
//! use testrig_cloud::CloudProvider;
//! use testrig_cloud_azure::AzureProvider;
//!
//! let provider = AzureProvider::from_env(None).await?;
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//!
//! provider.delete_resource_group("demo-8c1f0e9a4b2d7736").await?;
//! ```

pub mod arm;
pub mod az;
pub mod credential;
pub mod error;
pub mod provider;

pub use arm::ArmClient;
pub use az::{AccountInfo, AzureCli};
pub use credential::{AuthFile, Credential, CredentialSource};
pub use error::{AzureError, Result};
pub use provider::AzureProvider;
