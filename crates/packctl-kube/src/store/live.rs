//! Store backed by a live Kubernetes API server
//!
//! Requests go through `Api<DynamicObject>` built from the typed resource's
//! `ApiResource`, so one code path serves both namespaced and cluster-scoped
//! kinds. Objects are converted to and from their typed form with serde.

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{ObjectKey, ResourceStore, StoreObject};
use crate::error::{PackageError, Result};

/// Store that reads and writes through a `kube::Client`
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K: StoreObject>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<K> {
        tracing::debug!(kind = %kind_of::<K>(), key = %key, "get");
        let obj = self
            .api::<K>(key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| {
                PackageError::from_kube(e, &kind_of::<K>(), &key.name, key.namespace.as_deref())
            })?;
        from_dynamic(obj)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        tracing::debug!(kind = %kind_of::<K>(), namespace = ?namespace, "list");
        let list = self
            .api::<K>(namespace)
            .list(&ListParams::default())
            .await?;
        list.items.into_iter().map(from_dynamic::<K>).collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj)?;
        tracing::debug!(kind = %kind_of::<K>(), key = %key, "create");
        let created = self
            .api::<K>(key.namespace.as_deref())
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| {
                PackageError::from_kube(e, &kind_of::<K>(), &key.name, key.namespace.as_deref())
            })?;
        from_dynamic(created)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj)?;
        tracing::debug!(kind = %kind_of::<K>(), key = %key, "update");
        let updated = self
            .api::<K>(key.namespace.as_deref())
            .replace(&key.name, &PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| {
                PackageError::from_kube(e, &kind_of::<K>(), &key.name, key.namespace.as_deref())
            })?;
        from_dynamic(updated)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        tracing::debug!(kind = %kind_of::<K>(), key = %key, "delete");
        self.api::<K>(key.namespace.as_deref())
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| {
                PackageError::from_kube(e, &kind_of::<K>(), &key.name, key.namespace.as_deref())
            })
    }
}
