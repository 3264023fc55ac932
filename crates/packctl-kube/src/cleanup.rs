//! Removal of dependents owned by an install

use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::Resource;
use packctl_core::naming::{OWNER_ANNOTATION, owner_marker};
use packctl_core::{DependentKind, OwnershipIndex};

use crate::error::Result;
use crate::progress::ProgressSender;
use crate::store::{ObjectKey, ResourceStore, StoreObject};

/// Deletes the dependents of one install
///
/// Resources found by their generated name are only deleted when their owner
/// annotation names this install; a same-named resource owned by someone else,
/// or by nobody, is left alone.
pub struct CleanupResolver<'a, S> {
    store: &'a S,
    progress: &'a ProgressSender,
    install: &'a str,
    namespace: &'a str,
    marker: String,
}

impl<'a, S: ResourceStore> CleanupResolver<'a, S> {
    pub fn new(store: &'a S, progress: &'a ProgressSender, install: &'a str, namespace: &'a str) -> Self {
        Self {
            store,
            progress,
            install,
            namespace,
            marker: owner_marker(install, namespace),
        }
    }

    fn key(&self, kind: DependentKind, name: &str) -> ObjectKey {
        if kind.is_namespaced() {
            ObjectKey::namespaced(self.namespace, name)
        } else {
            ObjectKey::cluster(name)
        }
    }

    /// Delete dependents left behind without an install, found by their generated names
    pub async fn remove_orphans(&self) -> Result<Vec<(DependentKind, String)>> {
        let mut removed = Vec::new();
        for kind in DependentKind::TEARDOWN_ORDER {
            let name = kind.name_for(self.install, self.namespace);
            if self.remove(kind, &name).await? {
                removed.push((kind, name));
            }
        }
        Ok(removed)
    }

    /// Delete the dependents recorded in an install's ownership index
    ///
    /// A recorded name whose resource now carries another owner is skipped.
    pub async fn remove_indexed(&self, index: &OwnershipIndex) -> Result<usize> {
        let mut removed = 0;
        for (kind, name) in index.teardown() {
            if self.remove(kind, name).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn remove(&self, kind: DependentKind, name: &str) -> Result<bool> {
        let key = self.key(kind, name);
        match kind {
            DependentKind::ServiceAccount => self.delete_if_owned::<ServiceAccount>(kind, &key).await,
            DependentKind::ClusterRole => self.delete_if_owned::<ClusterRole>(kind, &key).await,
            DependentKind::ClusterRoleBinding => {
                self.delete_if_owned::<ClusterRoleBinding>(kind, &key).await
            }
            DependentKind::Secret => self.delete_if_owned::<Secret>(kind, &key).await,
        }
    }

    async fn delete_if_owned<K: StoreObject>(&self, kind: DependentKind, key: &ObjectKey) -> Result<bool> {
        let Some(obj) = self.store.get_opt::<K>(key).await? else {
            return Ok(false);
        };

        let owner = obj
            .meta()
            .annotations
            .as_ref()
            .and_then(|a| a.get(OWNER_ANNOTATION));
        if owner != Some(&self.marker) {
            tracing::debug!(kind = %kind, key = %key, owner = ?owner, "not owned, skipping");
            return Ok(false);
        }

        self.progress
            .report(format!("Deleting {} '{}'", kind.description(), key.name))
            .await;
        self.delete::<K>(key).await
    }

    /// Delete, treating "not found" as already done
    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<bool> {
        match self.store.delete::<K>(key).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
