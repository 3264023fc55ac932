//! Add, update and delete of package repositories

use futures::FutureExt;
use futures::future::BoxFuture;
use packctl_core::RepositoryRequest;
use packctl_core::naming::DEFAULT_TAG_CONSTRAINT;
use packctl_core::request::image_has_tag;

use crate::client::Operation;
use crate::crd::{PackageRepository, PackageRepositorySpec};
use crate::error::{NonCriticalReason, PackageError, Result};
use crate::store::{ObjectKey, ResourceStore};

/// Tag-selection constraint for an image: untagged images follow the newest tag
pub fn tag_constraint(image: &str) -> Option<&'static str> {
    (!image_has_tag(image)).then_some(DEFAULT_TAG_CONSTRAINT)
}

pub fn build_repository(request: &RepositoryRequest) -> PackageRepository {
    let mut repository = PackageRepository::new(&request.name, PackageRepositorySpec::default());
    repository.metadata.namespace = Some(request.namespace.clone());
    repository.set_source(&request.url, tag_constraint(&request.url));
    repository
}

fn require_url(request: &RepositoryRequest) -> Result<()> {
    if request.url.trim().is_empty() {
        return Err(PackageError::InvalidRequest(format!(
            "a URL is required for package repository '{}'",
            request.name
        )));
    }
    Ok(())
}

/// Reject a new repository whose name or image is already used in the namespace
pub fn validate_unique(request: &RepositoryRequest, existing: &[PackageRepository]) -> Result<()> {
    for repository in existing {
        if repository.metadata.name.as_deref() == Some(request.name.as_str()) {
            return Err(PackageError::RepositoryNameExists {
                name: request.name.clone(),
                namespace: request.namespace.clone(),
            });
        }
        if repository.image() == Some(request.url.as_str()) {
            return Err(PackageError::RepositoryUrlExists {
                url: request.url.clone(),
                namespace: request.namespace.clone(),
            });
        }
    }
    Ok(())
}

impl<'a, S: ResourceStore + 'static> Operation<'a, S> {
    pub(crate) fn add_repository(&self, request: RepositoryRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            require_url(&request)?;
            let key = ObjectKey::namespaced(&request.namespace, &request.name);

            self.progress
                .report(format!("Getting package repository '{}'", request.name))
                .await;
            if self.store.get_opt::<PackageRepository>(&key).await?.is_some() {
                self.progress
                    .report(format!("Updating package repository '{}'", request.name))
                    .await;
                self.update_repository(request).await?;
                return Err(PackageError::NonCritical(
                    NonCriticalReason::RepositoryAlreadyExists,
                ));
            }

            self.progress
                .report("Validating provided settings for the package repository")
                .await;
            let existing = self
                .store
                .list::<PackageRepository>(Some(&request.namespace))
                .await?;
            validate_unique(&request, &existing)?;

            self.ensure_namespace(&request.namespace, request.create_namespace)
                .await?;

            self.progress
                .report("Creating package repository resource")
                .await;
            self.store.create(&build_repository(&request)).await?;

            if request.wait {
                self.poller(request.poll)
                    .wait_for_reconcile::<PackageRepository>(&key)
                    .await?;
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) fn update_repository(&self, request: RepositoryRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            require_url(&request)?;
            let key = ObjectKey::namespaced(&request.namespace, &request.name);

            self.progress
                .report(format!("Getting package repository '{}'", request.name))
                .await;
            let Some(current) = self.store.get_opt::<PackageRepository>(&key).await? else {
                if request.create_repository {
                    self.progress
                        .report(format!("Adding package repository '{}'", request.name))
                        .await;
                    return self.add_repository(request).await;
                }
                return Err(PackageError::NonCritical(
                    NonCriticalReason::RepositoryDoesNotExist,
                ));
            };

            let mut updated = current.clone();
            updated.set_source(&request.url, tag_constraint(&request.url));
            if updated.spec != current.spec {
                self.progress
                    .report("Updating package repository resource")
                    .await;
                self.store.update(&updated).await?;
            } else {
                tracing::debug!(key = %key, "package repository unchanged");
            }

            if request.wait {
                self.poller(request.poll)
                    .wait_for_reconcile::<PackageRepository>(&key)
                    .await?;
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn delete_repository(&self, request: RepositoryRequest) -> Result<()> {
        let key = ObjectKey::namespaced(&request.namespace, &request.name);

        self.progress
            .report(format!("Getting package repository '{}'", request.name))
            .await;
        if self.store.get_opt::<PackageRepository>(&key).await?.is_none() {
            return Err(PackageError::NonCritical(
                NonCriticalReason::RepositoryDoesNotExist,
            ));
        }

        self.progress
            .report(format!(
                "Deleting package repository '{}' from namespace '{}'",
                request.name, request.namespace
            ))
            .await;
        match self.store.delete::<PackageRepository>(&key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        if request.wait {
            self.poller(request.poll)
                .wait_for_deletion::<PackageRepository>(&key)
                .await?;
        }
        Ok(())
    }
}
