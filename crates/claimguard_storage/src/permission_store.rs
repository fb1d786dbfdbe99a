#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use claimguard_kernel_contracts::context::{Context, ContextSet};
use claimguard_kernel_contracts::{ContractViolation, Tristate};
use serde::{Deserialize, Serialize};

use crate::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStoreKind {
    /// Session-scoped; rebuilt on every start.
    Transient,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSnapshotRow {
    pub context_digest: String,
    pub contexts: Vec<Context>,
    pub key: String,
    pub value: bool,
}

type ScopedValues = BTreeMap<ContextSet, BTreeMap<String, bool>>;

/// Permission key -> bool, scoped by the exact context set used to write it.
/// `Undefined` is never stored; it is the absence of a key.
#[derive(Debug)]
pub struct PermissionStore {
    kind: PermissionStoreKind,
    scoped: RwLock<ScopedValues>,
}

impl PermissionStore {
    pub fn new(kind: PermissionStoreKind) -> Self {
        Self {
            kind,
            scoped: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn kind(&self) -> PermissionStoreKind {
        self.kind
    }

    fn read_scoped(&self) -> RwLockReadGuard<'_, ScopedValues> {
        self.scoped.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_scoped(&self) -> RwLockWriteGuard<'_, ScopedValues> {
        self.scoped.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every key set under exactly `contexts`.
    pub fn query(&self, contexts: &ContextSet) -> BTreeMap<String, bool> {
        self.read_scoped()
            .get(contexts)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_value(&self, contexts: &ContextSet, key: &str) -> Tristate {
        let scoped = self.read_scoped();
        Tristate::from_stored(scoped.get(contexts).and_then(|m| m.get(key)).copied())
    }

    /// Upserts `value`, or removes the key when `value` is `Undefined`.
    /// Returns the value previously visible for the key.
    pub fn set_value(
        &self,
        contexts: &ContextSet,
        key: &str,
        value: Tristate,
    ) -> Result<Tristate, StorageError> {
        if key.trim().is_empty() || key.len() > 192 || key.chars().any(char::is_whitespace) {
            return Err(StorageError::ContractViolation(
                ContractViolation::InvalidValue {
                    field: "permission_store.key",
                    reason: "must be non-empty, <= 192 chars and without whitespace",
                },
            ));
        }

        let mut scoped = self.write_scoped();
        let previous = match value.as_bool() {
            Some(v) => scoped
                .entry(contexts.clone())
                .or_default()
                .insert(key.to_string(), v),
            None => {
                let removed = scoped.get_mut(contexts).and_then(|m| m.remove(key));
                if scoped.get(contexts).map(BTreeMap::is_empty).unwrap_or(false) {
                    scoped.remove(contexts);
                }
                removed
            }
        };
        Ok(Tristate::from_stored(previous))
    }

    /// Drops every value scoped to exactly `contexts`; returns how many keys went.
    pub fn clear_contexts(&self, contexts: &ContextSet) -> usize {
        self.write_scoped()
            .remove(contexts)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        self.write_scoped().clear();
    }

    pub fn context_set_count(&self) -> usize {
        self.read_scoped().len()
    }

    pub fn snapshot(&self) -> Vec<PermissionSnapshotRow> {
        let scoped = self.read_scoped();
        let mut out = Vec::new();
        for (contexts, values) in scoped.iter() {
            let context_digest = contexts.digest_hex();
            let context_list: Vec<Context> = contexts.iter().cloned().collect();
            for (key, value) in values {
                out.push(PermissionSnapshotRow {
                    context_digest: context_digest.clone(),
                    contexts: context_list.clone(),
                    key: key.clone(),
                    value: *value,
                });
            }
        }
        out
    }

    /// Loads rows produced by [`PermissionStore::snapshot`], replacing any
    /// value already present for the same `(contexts, key)`.
    pub fn restore(&self, rows: &[PermissionSnapshotRow]) -> usize {
        let mut scoped = self.write_scoped();
        for row in rows {
            let contexts: ContextSet = row.contexts.iter().cloned().collect();
            scoped
                .entry(contexts)
                .or_default()
                .insert(row.key.clone(), row.value);
        }
        rows.len()
    }
}

/// The two logical stores flag layers read from.
#[derive(Debug)]
pub struct FlagStores {
    transient: PermissionStore,
    persistent: PermissionStore,
}

impl FlagStores {
    pub fn new_in_memory() -> Self {
        Self {
            transient: PermissionStore::new(PermissionStoreKind::Transient),
            persistent: PermissionStore::new(PermissionStoreKind::Persistent),
        }
    }

    pub fn store(&self, kind: PermissionStoreKind) -> &PermissionStore {
        match kind {
            PermissionStoreKind::Transient => &self.transient,
            PermissionStoreKind::Persistent => &self.persistent,
        }
    }

    pub fn transient(&self) -> &PermissionStore {
        &self.transient
    }

    pub fn persistent(&self) -> &PermissionStore {
        &self.persistent
    }
}

impl Default for FlagStores {
    fn default() -> Self {
        Self::new_in_memory()
    }
}
