//! Install, update and uninstall of packages

use std::collections::BTreeMap;

use futures::FutureExt;
use futures::future::BoxFuture;
use packctl_core::{DependentKind, OwnershipIndex, PackageInstallRequest};

use crate::cleanup::CleanupResolver;
use crate::client::Operation;
use crate::crd::{PackageInstall, PackageInstallSpec, PackageRef, VersionSelectionSemver};
use crate::dependents::DependentManager;
use crate::error::{NonCriticalReason, PackageError, Result};
use crate::packages::resolve_package;
use crate::store::{ObjectKey, ResourceStore};

/// Hint attached to reconciliation failures after install or update
pub const UPDATE_HINT: &str = "use `packctl package update` to correct the settings";

fn with_update_hint(err: PackageError) -> PackageError {
    match err {
        PackageError::ReconcileFailed {
            action,
            message,
            hint: None,
        } => PackageError::ReconcileFailed {
            action,
            message,
            hint: Some(UPDATE_HINT.to_string()),
        },
        other => other,
    }
}

/// PackageInstall for a request whose dependents were created
pub fn build_install(request: &PackageInstallRequest, index: &OwnershipIndex) -> PackageInstall {
    let mut install = PackageInstall::new(
        &request.name,
        PackageInstallSpec {
            service_account_name: request.service_account_name.clone(),
            package_ref: Some(PackageRef {
                ref_name: request.package_name.clone(),
                version_selection: Some(VersionSelectionSemver::with_prereleases(&request.version)),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    install.metadata.namespace = Some(request.namespace.clone());

    if let Some(secret) = &request.secret_name {
        install.add_secret_ref(secret);
    }

    let mut annotations = BTreeMap::new();
    index.write_annotations(&mut annotations);
    if !annotations.is_empty() {
        install.metadata.annotations = Some(annotations);
    }
    if !request.labels.is_empty() {
        install.metadata.labels = Some(request.labels.clone());
    }
    install
}

fn ownership_of(install: &PackageInstall) -> OwnershipIndex {
    install
        .metadata
        .annotations
        .as_ref()
        .map(OwnershipIndex::from_annotations)
        .unwrap_or_default()
}

impl<'a, S: ResourceStore + 'static> Operation<'a, S> {
    pub(crate) fn install(&self, mut request: PackageInstallRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            let key = ObjectKey::namespaced(&request.namespace, &request.name);

            self.progress
                .report(format!("Getting package install for '{}'", request.name))
                .await;
            if self.store.get_opt::<PackageInstall>(&key).await?.is_some() {
                self.progress
                    .report(format!("Updating package '{}'", request.name))
                    .await;
                self.update(request).await?;
                return Err(PackageError::NonCritical(NonCriticalReason::AlreadyInstalled));
            }

            let values = request.read_values_file()?;
            self.ensure_namespace(&request.namespace, request.create_namespace)
                .await?;

            self.progress
                .report(format!("Getting package metadata for '{}'", request.package_name))
                .await;
            resolve_package(
                &self.store,
                &request.namespace,
                &request.package_name,
                &request.version,
            )
            .await?;

            let (name, namespace) = (request.name.clone(), request.namespace.clone());
            let index = DependentManager::new(&self.store, self.progress, &name, &namespace)
                .create_for(&mut request, values.as_ref())
                .await?;

            self.progress.report("Creating package resource").await;
            self.store.create(&build_install(&request, &index)).await?;

            if request.wait {
                self.poller(request.poll)
                    .wait_for_reconcile::<PackageInstall>(&key)
                    .await
                    .map_err(with_update_hint)?;
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) fn update(&self, mut request: PackageInstallRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            let key = ObjectKey::namespaced(&request.namespace, &request.name);

            self.progress
                .report(format!("Getting package install for '{}'", request.name))
                .await;
            let Some(current) = self.store.get_opt::<PackageInstall>(&key).await? else {
                if request.install {
                    self.progress
                        .report(format!("Installing package '{}'", request.name))
                        .await;
                    return self.install(request).await;
                }
                return Err(PackageError::NonCritical(NonCriticalReason::NotInstalled));
            };

            let installed_package = current.package_name().unwrap_or_default().to_string();
            if !request.package_name.is_empty() && request.package_name != installed_package {
                return Err(PackageError::PackageMismatch {
                    install: request.name.clone(),
                    package: installed_package,
                });
            }
            request.package_name = installed_package;
            if request.version.is_empty() {
                request.version = current.version_constraint().unwrap_or_default().to_string();
            }

            self.progress
                .report(format!("Getting package metadata for '{}'", request.package_name))
                .await;
            resolve_package(
                &self.store,
                &request.namespace,
                &request.package_name,
                &request.version,
            )
            .await?;

            let values = request.read_values_file()?;
            let mut updated = current.clone();
            updated.set_version_constraint(&request.version);

            if let Some(values) = &values {
                let mut index = ownership_of(&current);
                let secret = match index.get(DependentKind::Secret) {
                    Some(existing) => {
                        self.progress
                            .report(format!("Updating secret '{}'", existing))
                            .await;
                        existing.to_string()
                    }
                    None => {
                        let generated = DependentKind::Secret.name_for(&request.name, &request.namespace);
                        self.progress
                            .report(format!("Creating secret '{}'", generated))
                            .await;
                        generated
                    }
                };
                DependentManager::new(&self.store, self.progress, &request.name, &request.namespace)
                    .write_values_secret(&secret, values)
                    .await?;

                index.record(DependentKind::Secret, &secret);
                index.write_annotations(updated.metadata.annotations.get_or_insert_with(BTreeMap::new));
                updated.add_secret_ref(&secret);
                request.secret_name = Some(secret);
            }

            if updated.spec != current.spec || updated.metadata.annotations != current.metadata.annotations {
                self.progress
                    .report(format!("Updating package install for '{}'", request.name))
                    .await;
                self.store.update(&updated).await?;
            } else {
                tracing::debug!(key = %key, "package install unchanged");
            }

            if request.wait {
                self.poller(request.poll)
                    .wait_for_reconcile::<PackageInstall>(&key)
                    .await
                    .map_err(with_update_hint)?;
            }
            Ok(())
        }
        .boxed()
    }

    pub(crate) async fn uninstall(&self, request: PackageInstallRequest) -> Result<()> {
        let key = ObjectKey::namespaced(&request.namespace, &request.name);
        let cleanup = CleanupResolver::new(&self.store, self.progress, &request.name, &request.namespace);

        self.progress
            .report(format!("Getting package install for '{}'", request.name))
            .await;
        let Some(current) = self.store.get_opt::<PackageInstall>(&key).await? else {
            let removed = cleanup.remove_orphans().await?;
            if !removed.is_empty() {
                tracing::info!(count = removed.len(), "removed orphaned dependents");
            }
            self.progress
                .report(format!(
                    "package '{}' is not installed in namespace '{}'",
                    request.name, request.namespace
                ))
                .await;
            return Err(PackageError::NonCritical(NonCriticalReason::NotInstalled));
        };

        self.progress
            .report(format!(
                "Deleting package install '{}' from namespace '{}'",
                request.name, request.namespace
            ))
            .await;
        match self.store.delete::<PackageInstall>(&key).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.poller(request.poll)
            .wait_for_deletion::<PackageInstall>(&key)
            .await?;

        cleanup.remove_indexed(&ownership_of(&current)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_install() {
        let mut request = PackageInstallRequest::new("pkg1", "ns1")
            .with_package("fluent-bit.example.com", "1.0.0");
        request.service_account_name = Some("pkg1-ns1-sa".to_string());
        request.secret_name = Some("pkg1-ns1-values".to_string());
        request.labels.insert("team".to_string(), "infra".to_string());

        let mut index = OwnershipIndex::new();
        index.record(DependentKind::ServiceAccount, "pkg1-ns1-sa");
        index.record(DependentKind::Secret, "pkg1-ns1-values");

        let install = build_install(&request, &index);
        assert_eq!(install.metadata.namespace.as_deref(), Some("ns1"));
        assert_eq!(install.package_name(), Some("fluent-bit.example.com"));
        assert_eq!(install.version_constraint(), Some("1.0.0"));
        assert!(install.references_secret("pkg1-ns1-values"));
        assert_eq!(ownership_of(&install), index);
        assert_eq!(install.metadata.labels.unwrap()["team"], "infra");
    }

    #[test]
    fn test_update_hint_only_on_reconcile_failure() {
        let err = with_update_hint(PackageError::ReconcileFailed {
            action: "reconciliation",
            message: "boom".to_string(),
            hint: None,
        });
        assert_eq!(err.hint().as_deref(), Some(UPDATE_HINT));

        let err = with_update_hint(PackageError::Cancelled);
        assert!(err.hint().is_none());
    }
}
