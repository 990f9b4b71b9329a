//! Per-request service storage.
//!
//! Instances of StoragePersistent services are cached here, keyed by the
//! identity (pointer address) of the descriptor that produced them. One
//! storage lives for one request cycle, giving "same instance within a
//! request, fresh instances across requests" semantics.
//!
//! The storage also carries the in-resolve marker stack used for
//! dependency cycle detection: resolution always runs through a
//! `&mut ServiceStorage`, so the stack sees every nested resolve of one
//! call chain.

use std::any::Any;
use std::collections::HashMap;

pub(crate) type BoxedInstance = Box<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ServiceStorage {
    instances: HashMap<usize, BoxedInstance>,
    resolving: Vec<usize>,
}

impl ServiceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the instance cached for a descriptor identity.
    pub(crate) fn get(&self, key: usize) -> Option<&BoxedInstance> {
        self.instances.get(&key)
    }

    /// Caches an instance under a descriptor identity.
    pub(crate) fn set(&mut self, key: usize, value: BoxedInstance) {
        self.instances.insert(key, value);
    }

    /// Marks a descriptor as resolving; fails when it already is, which
    /// means the dependency graph has a cycle.
    pub(crate) fn begin_resolve(&mut self, key: usize) -> Result<(), CycleDetected> {
        if self.resolving.contains(&key) {
            return Err(CycleDetected);
        }
        self.resolving.push(key);
        Ok(())
    }

    pub(crate) fn end_resolve(&mut self, key: usize) {
        if let Some(position) = self.resolving.iter().rposition(|&candidate| candidate == key) {
            self.resolving.remove(position);
        }
    }

    /// Drops all cached instances; the storage can be reused for the next
    /// request.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.resolving.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl std::fmt::Debug for ServiceStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceStorage").field("instances", &self.instances.len()).finish()
    }
}

/// Marker error for [`ServiceStorage::begin_resolve`].
#[derive(Debug)]
pub(crate) struct CycleDetected;
