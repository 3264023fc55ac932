//! Typed access to cluster resources
//!
//! Every component talks to the cluster through [`ResourceStore`]:
//! - **KubeStore**: a live `kube::Client`
//! - **MockStore**: in-memory, for tests without a cluster
//! - **CancellableStore**: wraps another store and aborts calls on cancellation

mod cancellable;
mod live;
mod mock;

pub use cancellable::CancellableStore;
pub use live::KubeStore;
pub use mock::{MockStore, OperationCounts, StoreCall, StoreOp};

use std::fmt;
use std::sync::Arc;

use kube::Resource;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{PackageError, Result};

/// Objects the store can read and write
pub trait StoreObject:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Name and optional namespace of an object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object
    pub fn of<K: Resource>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let name = meta
            .name
            .clone()
            .ok_or_else(|| PackageError::InvalidRequest("object has no name".to_string()))?;
        Ok(Self {
            namespace: meta.namespace.clone(),
            name,
        })
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// CRUD on cluster resources
///
/// Implementations must be Send + Sync for use across async tasks. Missing
/// objects are reported as [`PackageError::NotFound`], name clashes on create
/// as [`PackageError::AlreadyExists`].
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<K>;

    /// List objects, in one namespace or across all of them
    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>>;

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K>;

    /// Replace an existing object
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K>;

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()>;

    /// Get an object, mapping "not found" to `None`
    async fn get_opt<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>> {
        match self.get::<K>(key).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for Arc<S> {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<K> {
        (**self).get(key).await
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        (**self).list(namespace).await
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        (**self).create(obj).await
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K> {
        (**self).update(obj).await
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        (**self).delete::<K>(key).await
    }
}
