//! Mock store for testing
//!
//! Objects are kept in memory as JSON, keyed by API version, kind, namespace and
//! name, so any typed resource can be stored without a cluster. A reconciler
//! callback can play the controller by editing objects after every write.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ObjectKey, ResourceStore, StoreObject};
use crate::error::{PackageError, Result};

type Reconciler = Arc<dyn Fn(&mut Value) + Send + Sync>;

/// (apiVersion, kind, namespace, name)
type StoreKey = (String, String, Option<String>, String);

/// Store operations, for counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            StoreOp::Get => "get",
            StoreOp::List => "list",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        };
        f.write_str(op)
    }
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl OperationCounts {
    /// Creates, updates and deletes
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub kind: String,
    pub namespace: Option<String>,
    /// Empty for lists
    pub name: String,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<StoreKey, Value>,
    counts: OperationCounts,
    journal: Vec<StoreCall>,
    failures: Vec<(StoreOp, String)>,
    reconciler: Option<Reconciler>,
    resource_version: u64,
}

impl State {
    fn record(&mut self, op: StoreOp, kind: &str, namespace: Option<&str>, name: &str) -> Result<()> {
        match op {
            StoreOp::Get => self.counts.gets += 1,
            StoreOp::List => self.counts.lists += 1,
            StoreOp::Create => self.counts.creates += 1,
            StoreOp::Update => self.counts.updates += 1,
            StoreOp::Delete => self.counts.deletes += 1,
        }
        self.journal.push(StoreCall {
            op,
            kind: kind.to_string(),
            namespace: namespace.map(String::from),
            name: name.to_string(),
        });

        if self.failures.iter().any(|(o, k)| *o == op && k == kind) {
            return Err(PackageError::Store(format!("injected {} failure for {}", op, kind)));
        }
        Ok(())
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn reconcile(&self, value: &mut Value) {
        if let Some(reconciler) = &self.reconciler {
            reconciler(value);
        }
    }
}

/// In-memory store for testing
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

fn store_key<K: StoreObject>(key: &ObjectKey) -> StoreKey {
    (
        K::api_version(&()).into_owned(),
        K::kind(&()).into_owned(),
        key.namespace.clone(),
        key.name.clone(),
    )
}

fn not_found<K: StoreObject>(key: &ObjectKey) -> PackageError {
    PackageError::NotFound {
        kind: K::kind(&()).into_owned(),
        name: key.name.clone(),
        namespace: key.namespace.clone(),
    }
}

fn metadata_mut(value: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    if !value.get("metadata").is_some_and(Value::is_object) {
        value["metadata"] = Value::Object(Default::default());
    }
    value.get_mut("metadata").and_then(Value::as_object_mut)
}

/// Everything the caller controls: the object without metadata and status
fn desired_state(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(map) = value.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    value
}

impl MockStore {
    /// Create a new empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `reconciler` on every object after it is created or updated
    pub fn with_reconciler<F>(self, reconciler: F) -> Self
    where
        F: Fn(&mut Value) + Send + Sync + 'static,
    {
        self.state().reconciler = Some(Arc::new(reconciler));
        self
    }

    /// Make every `op` on `kind` fail
    pub fn fail_on(&self, op: StoreOp, kind: &str) {
        self.state().failures.push((op, kind.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Seed an object without counting it as an operation
    ///
    /// The object's status and generation are kept as given; generation
    /// defaults to 1.
    pub fn insert<K: StoreObject>(&self, obj: &K) -> Result<()> {
        let key = ObjectKey::of(obj)?;
        let mut value = serde_json::to_value(obj)?;
        let mut state = self.state();
        let resource_version = state.next_resource_version();
        if let Some(meta) = metadata_mut(&mut value) {
            meta.entry("generation").or_insert(Value::from(1));
            meta.insert("resourceVersion".to_string(), Value::from(resource_version));
        }
        state.objects.insert(store_key::<K>(&key), value);
        Ok(())
    }

    /// Read an object without counting it as an operation
    pub fn object<K: StoreObject>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.state();
        state
            .objects
            .get(&store_key::<K>(key))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains<K: StoreObject>(&self, key: &ObjectKey) -> bool {
        self.state().objects.contains_key(&store_key::<K>(key))
    }

    /// Edit a stored object in place, as the controller would
    pub fn patch<K: StoreObject>(&self, key: &ObjectKey, edit: impl FnOnce(&mut Value)) -> bool {
        match self.state().objects.get_mut(&store_key::<K>(key)) {
            Some(value) => {
                edit(value);
                true
            }
            None => false,
        }
    }

    /// Count stored objects
    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.state().counts.clone()
    }

    /// Calls in the order they were made
    pub fn journal(&self) -> Vec<StoreCall> {
        self.state().journal.clone()
    }

    /// Reset operation counts and the journal
    pub fn reset_counts(&self) {
        let mut state = self.state();
        state.counts = OperationCounts::default();
        state.journal.clear();
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ResourceStore for MockStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<K> {
        let mut state = self.state();
        state.record(StoreOp::Get, &K::kind(&()), key.namespace.as_deref(), &key.name)?;

        let value = state
            .objects
            .get(&store_key::<K>(key))
            .cloned()
            .ok_or_else(|| not_found::<K>(key))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list<K: StoreObject>(&self, namespace: Option<&str>) -> Result<Vec<K>> {
        let mut state = self.state();
        state.record(StoreOp::List, &K::kind(&()), namespace, "")?;

        let api_version = K::api_version(&());
        let kind = K::kind(&());
        state
            .objects
            .iter()
            .filter(|((v, k, ns, _), _)| {
                *v == api_version && *k == kind && namespace.is_none_or(|n| ns.as_deref() == Some(n))
            })
            .map(|(_, value)| serde_json::from_value(value.clone()).map_err(PackageError::from))
            .collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj)?;
        let mut state = self.state();
        state.record(StoreOp::Create, &K::kind(&()), key.namespace.as_deref(), &key.name)?;

        let skey = store_key::<K>(&key);
        if state.objects.contains_key(&skey) {
            return Err(PackageError::AlreadyExists {
                kind: K::kind(&()).into_owned(),
                name: key.name,
                namespace: key.namespace,
            });
        }

        let mut value = serde_json::to_value(obj)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("status");
        }
        let resource_version = state.next_resource_version();
        if let Some(meta) = metadata_mut(&mut value) {
            meta.insert("generation".to_string(), Value::from(1));
            meta.insert("resourceVersion".to_string(), Value::from(resource_version));
        }
        state.reconcile(&mut value);
        state.objects.insert(skey, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K> {
        let key = ObjectKey::of(obj)?;
        let mut state = self.state();
        state.record(StoreOp::Update, &K::kind(&()), key.namespace.as_deref(), &key.name)?;

        let skey = store_key::<K>(&key);
        let existing = state
            .objects
            .get(&skey)
            .cloned()
            .ok_or_else(|| not_found::<K>(&key))?;

        let mut value = serde_json::to_value(obj)?;
        let mut generation = existing["metadata"]["generation"].as_i64().unwrap_or(1);
        if desired_state(&existing) != desired_state(&value) {
            generation += 1;
        }

        if let Some(map) = value.as_object_mut() {
            match existing.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }
        let resource_version = state.next_resource_version();
        if let Some(meta) = metadata_mut(&mut value) {
            meta.insert("generation".to_string(), Value::from(generation));
            meta.insert("resourceVersion".to_string(), Value::from(resource_version));
        }
        state.reconcile(&mut value);
        state.objects.insert(skey, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.state();
        state.record(StoreOp::Delete, &K::kind(&()), key.namespace.as_deref(), &key.name)?;

        state
            .objects
            .remove(&store_key::<K>(key))
            .map(|_| ())
            .ok_or_else(|| not_found::<K>(key))
    }
}
