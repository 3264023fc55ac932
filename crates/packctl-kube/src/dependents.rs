//! Resources created on behalf of a package install
//!
//! An install without a caller-supplied service account gets its own service
//! account, a cluster role and a binding between the two. A values file turns
//! into a secret. Each of them carries the owner annotation, and the generated
//! names are recorded in an [`OwnershipIndex`] for the install.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use packctl_core::naming::{OWNER_ANNOTATION, owner_marker};
use packctl_core::{DependentKind, OwnershipIndex, PackageInstallRequest, ValuesFile};

use crate::error::{PackageError, Result};
use crate::progress::ProgressSender;
use crate::store::{ObjectKey, ResourceStore, StoreObject};

fn owned_meta(name: &str, namespace: Option<&str>, marker: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(String::from),
        annotations: Some(BTreeMap::from([(
            OWNER_ANNOTATION.to_string(),
            marker.to_string(),
        )])),
        ..Default::default()
    }
}

pub fn service_account(name: &str, namespace: &str, marker: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: owned_meta(name, Some(namespace), marker),
        ..Default::default()
    }
}

/// Cluster role granting everything; the controller deploys arbitrary resources
pub fn cluster_admin_role(name: &str, marker: &str) -> ClusterRole {
    ClusterRole {
        metadata: owned_meta(name, None, marker),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["*".to_string()]),
            resources: Some(vec!["*".to_string()]),
            verbs: vec!["*".to_string()],
            ..Default::default()
        }]),
        ..Default::default()
    }
}

pub fn cluster_role_binding(
    name: &str,
    role: &str,
    service_account: &str,
    namespace: &str,
    marker: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: owned_meta(name, None, marker),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: DependentKind::ClusterRole.kind().to_string(),
            name: role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: DependentKind::ServiceAccount.kind().to_string(),
            name: service_account.to_string(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }]),
    }
}

/// Secret holding a values file under its base name
pub fn values_secret(name: &str, namespace: &str, marker: &str, values: &ValuesFile) -> Secret {
    Secret {
        metadata: owned_meta(name, Some(namespace), marker),
        data: Some(BTreeMap::from([(
            values.file_name.clone(),
            ByteString(values.contents.clone()),
        )])),
        ..Default::default()
    }
}

fn dependent_error(kind: &str, name: &str, source: PackageError) -> PackageError {
    match source {
        PackageError::Cancelled => source,
        source => PackageError::Dependent {
            kind: kind.to_string(),
            name: name.to_string(),
            source: Box::new(source),
        },
    }
}

/// Create `desired`, replacing the existing object if the name is taken
///
/// Errors other than "already exists" are wrapped with the kind and name of
/// the object.
pub async fn create_or_update<S: ResourceStore, K: StoreObject>(store: &S, desired: &K) -> Result<K> {
    let key = ObjectKey::of(desired)?;
    let kind = K::kind(&());

    match store.create(desired).await {
        Ok(created) => Ok(created),
        Err(e) if e.is_already_exists() => {
            tracing::debug!(kind = %kind, key = %key, "exists, updating");
            let existing: K = store
                .get(&key)
                .await
                .map_err(|e| dependent_error(&kind, &key.name, e))?;
            let mut replacement = desired.clone();
            replacement.meta_mut().resource_version = existing.meta().resource_version.clone();
            store
                .update(&replacement)
                .await
                .map_err(|e| dependent_error(&kind, &key.name, e))
        }
        Err(e) => Err(dependent_error(&kind, &key.name, e)),
    }
}

/// Creates and updates the dependents of one install
pub struct DependentManager<'a, S> {
    store: &'a S,
    progress: &'a ProgressSender,
    install: &'a str,
    namespace: &'a str,
    marker: String,
}

impl<'a, S: ResourceStore> DependentManager<'a, S> {
    pub fn new(store: &'a S, progress: &'a ProgressSender, install: &'a str, namespace: &'a str) -> Self {
        Self {
            store,
            progress,
            install,
            namespace,
            marker: owner_marker(install, namespace),
        }
    }

    /// Create `desired`, replacing the existing object if the name is taken
    pub async fn create_or_update<K: StoreObject>(&self, desired: &K) -> Result<K> {
        create_or_update(self.store, desired).await
    }

    /// Create everything an install needs, filling the generated names into `request`
    pub async fn create_for(
        &self,
        request: &mut PackageInstallRequest,
        values: Option<&ValuesFile>,
    ) -> Result<OwnershipIndex> {
        let mut index = OwnershipIndex::new();

        match request.service_account_name.clone() {
            None => {
                let sa = DependentKind::ServiceAccount.name_for(self.install, self.namespace);
                self.progress
                    .report(format!("Creating service account '{}'", sa))
                    .await;
                self.create_or_update(&service_account(&sa, self.namespace, &self.marker))
                    .await?;
                index.record(DependentKind::ServiceAccount, &sa);
                request.service_account_name = Some(sa.clone());

                let role = DependentKind::ClusterRole.name_for(self.install, self.namespace);
                self.progress
                    .report(format!("Creating cluster admin role '{}'", role))
                    .await;
                self.create_or_update(&cluster_admin_role(&role, &self.marker))
                    .await?;
                index.record(DependentKind::ClusterRole, &role);
                request.cluster_role_name = Some(role.clone());

                let binding = DependentKind::ClusterRoleBinding.name_for(self.install, self.namespace);
                self.progress
                    .report(format!("Creating cluster role binding '{}'", binding))
                    .await;
                self.create_or_update(&cluster_role_binding(
                    &binding,
                    &role,
                    &sa,
                    self.namespace,
                    &self.marker,
                ))
                .await?;
                index.record(DependentKind::ClusterRoleBinding, &binding);
                request.cluster_role_binding_name = Some(binding);
            }
            Some(sa) => self.verify_service_account(&sa).await?,
        }

        if let Some(values) = values {
            let secret = DependentKind::Secret.name_for(self.install, self.namespace);
            self.progress
                .report(format!("Creating secret '{}'", secret))
                .await;
            self.write_values_secret(&secret, values).await?;
            index.record(DependentKind::Secret, &secret);
            request.secret_name = Some(secret);
        }

        Ok(index)
    }

    /// Create or replace the values secret
    pub async fn write_values_secret(&self, name: &str, values: &ValuesFile) -> Result<Secret> {
        self.create_or_update(&values_secret(name, self.namespace, &self.marker, values))
            .await
    }

    /// Check that a caller-supplied service account exists and isn't owned by another install
    pub async fn verify_service_account(&self, name: &str) -> Result<()> {
        let key = ObjectKey::namespaced(self.namespace, name);
        let sa: ServiceAccount = self.store.get(&key).await?;

        let owner = sa
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(OWNER_ANNOTATION));
        match owner {
            Some(owner) if *owner != self.marker => Err(PackageError::ServiceAccountConflict {
                name: name.to_string(),
                namespace: self.namespace.to_string(),
            }),
            _ => Ok(()),
        }
    }
}
