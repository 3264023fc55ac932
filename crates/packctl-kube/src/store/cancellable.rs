//! Store wrapper that aborts in-flight calls on cancellation

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{ObjectKey, ResourceStore, StoreObject};
use crate::error::{PackageError, Result};

/// Races every call of the inner store against a cancellation token
pub struct CancellableStore<S> {
    inner: Arc<S>,
    token: CancellationToken,
}

impl<S> Clone for CancellableStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            token: self.token.clone(),
        }
    }
}

impl<S: ResourceStore> CancellableStore<S> {
    pub fn new(inner: Arc<S>, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

macro_rules! cancellable {
    ($token:expr, $call:expr) => {
        tokio::select! {
            biased;
            _ = $token.cancelled() => Err(PackageError::Cancelled),
            result = $call => result,
        }
    };
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for CancellableStore<S> {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<K> {
        cancellable!(self.token, self.inner.get::<K>(key))
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        cancellable!(self.token, self.inner.list::<K>(namespace))
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        cancellable!(self.token, self.inner.create(obj))
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K> {
        cancellable!(self.token, self.inner.update(obj))
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        cancellable!(self.token, self.inner.delete::<K>(key))
    }
}
