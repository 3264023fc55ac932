//! Package lifecycle client
//!
//! [`PackageClient`] is the entry point for every operation. Each lifecycle
//! operation runs as one background task and returns a [`ProgressSession`]
//! right away; the `*_sync` variants drive the session to completion and turn
//! non-critical signals into warnings.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use packctl_core::{PackageInstallRequest, PollSettings, RepositoryRequest};
use tokio_util::sync::CancellationToken;

use crate::error::{NonCriticalReason, PackageError, Result};
use crate::poller::Poller;
use crate::progress::{self, ProgressSender, ProgressSession};
use crate::store::{CancellableStore, KubeStore, ObjectKey, ResourceStore};

/// Client for package and repository lifecycle operations
pub struct PackageClient<S> {
    store: Arc<S>,
}

impl<S> Clone for PackageClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl PackageClient<KubeStore> {
    /// Connect to the cluster from the default kubeconfig
    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(KubeStore::try_default().await?))
    }
}

/// One lifecycle operation, run by the background task
enum Task {
    Install(PackageInstallRequest),
    Update(PackageInstallRequest),
    Uninstall(PackageInstallRequest),
    AddRepository(RepositoryRequest),
    UpdateRepository(RepositoryRequest),
    DeleteRepository(RepositoryRequest),
}

impl Task {
    fn name(&self) -> &'static str {
        match self {
            Task::Install(_) => "install",
            Task::Update(_) => "update",
            Task::Uninstall(_) => "uninstall",
            Task::AddRepository(_) => "add-repository",
            Task::UpdateRepository(_) => "update-repository",
            Task::DeleteRepository(_) => "delete-repository",
        }
    }

    fn target(&self) -> (&str, &str) {
        match self {
            Task::Install(r) | Task::Update(r) | Task::Uninstall(r) => (&r.name, &r.namespace),
            Task::AddRepository(r) | Task::UpdateRepository(r) | Task::DeleteRepository(r) => {
                (&r.name, &r.namespace)
            }
        }
    }
}

impl<S: ResourceStore + 'static> PackageClient<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Get the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    // ========== Packages ==========

    /// Install a package; an existing install is updated instead
    pub fn install(&self, request: PackageInstallRequest) -> ProgressSession {
        self.spawn(Task::Install(request))
    }

    /// Update an installed package, installing it when requested
    pub fn update(&self, request: PackageInstallRequest) -> ProgressSession {
        self.spawn(Task::Update(request))
    }

    /// Uninstall a package and the dependents created for it
    pub fn uninstall(&self, request: PackageInstallRequest) -> ProgressSession {
        self.spawn(Task::Uninstall(request))
    }

    pub async fn install_sync(
        &self,
        request: PackageInstallRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<Option<NonCriticalReason>> {
        downgrade(self.install(request).wait_with(on_progress).await)
    }

    pub async fn update_sync(
        &self,
        request: PackageInstallRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<Option<NonCriticalReason>> {
        downgrade(self.update(request).wait_with(on_progress).await)
    }

    /// Uninstall and wait; returns whether the package was installed
    pub async fn uninstall_sync(
        &self,
        request: PackageInstallRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<bool> {
        let signal = downgrade(self.uninstall(request).wait_with(on_progress).await)?;
        Ok(signal.is_none())
    }

    // ========== Repositories ==========

    /// Add a repository; an existing one is updated instead
    pub fn add_repository(&self, request: RepositoryRequest) -> ProgressSession {
        self.spawn(Task::AddRepository(request))
    }

    pub fn update_repository(&self, request: RepositoryRequest) -> ProgressSession {
        self.spawn(Task::UpdateRepository(request))
    }

    pub fn delete_repository(&self, request: RepositoryRequest) -> ProgressSession {
        self.spawn(Task::DeleteRepository(request))
    }

    pub async fn add_repository_sync(
        &self,
        request: RepositoryRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<Option<NonCriticalReason>> {
        downgrade(self.add_repository(request).wait_with(on_progress).await)
    }

    pub async fn update_repository_sync(
        &self,
        request: RepositoryRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<Option<NonCriticalReason>> {
        downgrade(self.update_repository(request).wait_with(on_progress).await)
    }

    /// Delete and wait; returns whether the repository existed
    pub async fn delete_repository_sync(
        &self,
        request: RepositoryRequest,
        on_progress: impl FnMut(&str),
    ) -> Result<bool> {
        let signal = downgrade(self.delete_repository(request).wait_with(on_progress).await)?;
        Ok(signal.is_none())
    }

    fn spawn(&self, task: Task) -> ProgressSession {
        let (sender, session) = progress::channel();
        let store = CancellableStore::new(Arc::clone(&self.store), session.cancellation_token());

        let (name, namespace) = task.target();
        tracing::info!(operation = task.name(), name, namespace, "starting");

        tokio::spawn(async move {
            let result = {
                let operation = Operation {
                    store,
                    progress: &sender,
                };
                operation.run(task).await
            };
            sender.finish(result);
        });
        session
    }
}

/// Turn a non-critical signal into a warning
///
/// Used by the `*_sync` helpers, and by callers that drive a
/// [`ProgressSession`] themselves.
pub fn downgrade(result: Result<()>) -> Result<Option<NonCriticalReason>> {
    match result {
        Ok(()) => Ok(None),
        Err(PackageError::NonCritical(reason)) => {
            tracing::warn!(%reason, "non-critical");
            Ok(Some(reason))
        }
        Err(e) => Err(e),
    }
}

/// State shared by the steps of one running operation
pub(crate) struct Operation<'a, S> {
    pub(crate) store: CancellableStore<S>,
    pub(crate) progress: &'a ProgressSender,
}

impl<'a, S: ResourceStore + 'static> Operation<'a, S> {
    async fn run(&self, task: Task) -> Result<()> {
        match task {
            Task::Install(request) => self.install(request).await,
            Task::Update(request) => self.update(request).await,
            Task::Uninstall(request) => self.uninstall(request).await,
            Task::AddRepository(request) => self.add_repository(request).await,
            Task::UpdateRepository(request) => self.update_repository(request).await,
            Task::DeleteRepository(request) => self.delete_repository(request).await,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        self.store.token()
    }

    pub(crate) fn poller(&self, settings: PollSettings) -> Poller<'_, CancellableStore<S>> {
        Poller::new(&self.store, self.progress, self.token(), settings)
    }

    /// Make sure the namespace exists, creating it when asked to
    pub(crate) async fn ensure_namespace(&self, namespace: &str, create: bool) -> Result<()> {
        let key = ObjectKey::cluster(namespace);
        if !create {
            self.store.get::<Namespace>(&key).await?;
            return Ok(());
        }
        if self.store.get_opt::<Namespace>(&key).await?.is_some() {
            return Ok(());
        }

        self.progress
            .report(format!("Creating namespace '{}'", namespace))
            .await;
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self.store.create(&ns).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_already_exists() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
