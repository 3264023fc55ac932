//! Ownership index of dependent resources
//!
//! An install records the dependents packctl created for it as annotations on
//! the install itself (`packctl.io/package-<Kind>: <name>`). This module turns
//! those annotations into an explicit map so cleanup reads entries instead of
//! splitting annotation keys.

use std::collections::BTreeMap;

use crate::naming::{DependentKind, OWNER_ANNOTATION};

/// Dependent resources owned by one install, keyed by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnershipIndex {
    entries: BTreeMap<DependentKind, String>,
}

impl OwnershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dependent created for the install
    pub fn record(&mut self, kind: DependentKind, name: impl Into<String>) {
        self.entries.insert(kind, name.into());
    }

    /// Name of the owned dependent of `kind`, if any
    pub fn get(&self, kind: DependentKind) -> Option<&str> {
        self.entries.get(&kind).map(String::as_str)
    }

    pub fn contains(&self, kind: DependentKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Owned dependents in teardown order
    pub fn teardown(&self) -> impl Iterator<Item = (DependentKind, &str)> {
        DependentKind::TEARDOWN_ORDER
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|name| (kind, name)))
    }

    /// Read the index from an owner's annotations
    ///
    /// Keys that do not carry the packctl prefix or name an unknown kind are ignored.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let prefix = format!("{}-", OWNER_ANNOTATION);
        let entries = annotations
            .iter()
            .filter_map(|(key, value)| {
                let kind = DependentKind::from_kind(key.strip_prefix(&prefix)?)?;
                Some((kind, value.clone()))
            })
            .collect();
        Self { entries }
    }

    /// Write the index into an owner's annotations
    pub fn write_annotations(&self, annotations: &mut BTreeMap<String, String>) {
        for (kind, name) in &self.entries {
            annotations.insert(kind.index_annotation(), name.clone());
        }
    }

    /// Merge entries from another index, overriding on conflict
    pub fn merge(&mut self, other: &OwnershipIndex) {
        for (kind, name) in &other.entries {
            self.entries.insert(*kind, name.clone());
        }
    }
}
