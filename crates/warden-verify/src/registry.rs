//! Sharded context registry.
//!
//! Per-subject mutable state lives behind a fixed set of shard locks
//! rather than one global lock, preserving the single-writer-per-key
//! discipline under parallel verification: writes to a given subject are
//! atomic with respect to other writes to the same subject, and subjects
//! on different shards never contend.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

use warden_core::SubjectId;

use crate::types::VerificationContext;

const SHARD_COUNT: usize = 16;

pub struct ContextRegistry {
    shards: Vec<RwLock<HashMap<SubjectId, VerificationContext>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }

    fn shard(&self, subject: &SubjectId) -> &RwLock<HashMap<SubjectId, VerificationContext>> {
        let mut hasher = DefaultHasher::new();
        subject.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Register a subject with a fresh context. Returns false when the
    /// subject was already registered (the existing context is kept).
    pub fn register(&self, subject: SubjectId) -> bool {
        let shard = self.shard(&subject);
        let mut map = shard.write().expect("context registry lock poisoned");
        if map.contains_key(&subject) {
            return false;
        }
        map.insert(subject.clone(), VerificationContext::new(subject));
        true
    }

    /// Insert or replace a fully populated context.
    pub fn insert(&self, context: VerificationContext) {
        let shard = self.shard(&context.subject_id);
        let mut map = shard.write().expect("context registry lock poisoned");
        map.insert(context.subject_id.clone(), context);
    }

    /// Remove a subject. Returns whether it was registered.
    pub fn deregister(&self, subject: &SubjectId) -> bool {
        let shard = self.shard(subject);
        let mut map = shard.write().expect("context registry lock poisoned");
        map.remove(subject).is_some()
    }

    pub fn get(&self, subject: &SubjectId) -> Option<VerificationContext> {
        let shard = self.shard(subject);
        let map = shard.read().expect("context registry lock poisoned");
        map.get(subject).cloned()
    }

    pub fn contains(&self, subject: &SubjectId) -> bool {
        let shard = self.shard(subject);
        let map = shard.read().expect("context registry lock poisoned");
        map.contains_key(subject)
    }

    /// Apply a mutation to the subject's context under the shard lock.
    /// Returns false when the subject is not registered, in which case
    /// the closure is not called.
    pub fn update<F>(&self, subject: &SubjectId, mutate: F) -> bool
    where
        F: FnOnce(&mut VerificationContext),
    {
        let shard = self.shard(subject);
        let mut map = shard.write().expect("context registry lock poisoned");
        match map.get_mut(subject) {
            Some(context) => {
                mutate(context);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().expect("context registry lock poisoned").len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all registered subject ids.
    pub fn subject_ids(&self) -> Vec<SubjectId> {
        let mut ids = Vec::new();
        for shard in &self.shards {
            let map = shard.read().expect("context registry lock poisoned");
            ids.extend(map.keys().cloned());
        }
        ids
    }
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}
