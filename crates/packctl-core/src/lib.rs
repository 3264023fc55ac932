//! packctl Core - Core types for the package lifecycle client
//!
//! This crate provides the cluster-independent building blocks of packctl:
//! - `PackageInstallRequest` / `RepositoryRequest` / `RegistrySecretRequest`: what the caller asks for
//! - `naming`: deterministic names of the resources created on behalf of an install
//! - `OwnershipIndex`: which dependent resources an install owns
//! - `PackctlConfig`: user configuration with poll defaults

pub mod config;
pub mod error;
pub mod naming;
pub mod ownership;
pub mod request;
pub mod version;

pub use config::PackctlConfig;
pub use error::{CoreError, Result};
pub use naming::DependentKind;
pub use ownership::OwnershipIndex;
pub use request::{
    PackageInstallRequest, PollSettings, RegistrySecretRequest, RepositoryRequest, ValuesFile,
};
pub use version::VersionConstraint;
