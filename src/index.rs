//! Pod index mapping pod identity to the latest pod record
//!
//! A single reader/writer lock guards the whole map. Readers share the lock;
//! every mutation takes it exclusively. Records are stored behind `Arc`, so a
//! reader always gets a complete snapshot and never holds the lock while
//! using it. Nothing inside the lock performs I/O or awaits.

use crate::k8s::types::{PodIdentity, PodRecord};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe index shared by reconcilers and the lookup service
#[derive(Clone, Default)]
pub struct PodIndex {
    inner: Arc<RwLock<HashMap<PodIdentity, Arc<PodRecord>>>>,
}

impl PodIndex {
    /// Create a new empty pod index
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the record stored for an identity
    pub fn get(&self, identity: &PodIdentity) -> Option<Arc<PodRecord>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .cloned()
    }

    /// Store a record, replacing whatever was there. Returns the displaced record.
    pub fn set(&self, identity: PodIdentity, record: PodRecord) -> Option<Arc<PodRecord>> {
        let record = Arc::new(record);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity, record)
    }

    /// Remove an identity. Removing an absent identity is a no-op.
    pub fn delete(&self, identity: &PodIdentity) -> Option<Arc<PodRecord>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
    }

    /// Get the number of indexed pods
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All indexed identities, sorted (for debugging/metrics)
    pub fn identities(&self) -> Vec<PodIdentity> {
        let mut ids: Vec<PodIdentity> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
