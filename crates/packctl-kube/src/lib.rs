//! packctl Kube - package lifecycle orchestration against a Kubernetes cluster
//!
//! This crate provides:
//! - **Resource Store**: typed CRUD on cluster resources, live or in-memory
//! - **Lifecycle Client**: install, update and uninstall packages; add, update
//!   and delete package repositories; manage registry credentials
//! - **Dependents**: service accounts, cluster roles, bindings and values
//!   secrets created on behalf of an install, tracked by owner annotations
//! - **Reconciliation Polling**: generation-aware waiting on controller status
//! - **Progress Reporting**: a bounded message stream plus a single outcome
//! - **Cleanup**: removal of exactly the dependents an install owns

pub mod cleanup;
pub mod client;
pub mod crd;
pub mod dependents;
pub mod error;
pub mod lifecycle;
pub mod packages;
pub mod poller;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod store;

pub use cleanup::CleanupResolver;
pub use client::{PackageClient, downgrade};
pub use crd::{
    GenericStatus, Package, PackageInstall, PackageRepository, Reconcilable, SecretExport,
};
pub use dependents::DependentManager;
pub use error::{NonCriticalReason, PackageError, Result};
pub use poller::{ConditionWatch, PollState, Poller};
pub use progress::{ProgressSender, ProgressSession};
pub use store::{
    CancellableStore, KubeStore, MockStore, ObjectKey, OperationCounts, ResourceStore, StoreCall,
    StoreObject, StoreOp,
};
