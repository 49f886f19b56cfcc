//! Per-entity mutual exclusion for full-replace writes
//!
//! Two runs replacing the pivot rows of the same base entity must not
//! interleave their delete and insert halves. Engines take an [`EntityLock`] as
//! a required argument and hold the returned guard across the write.

use crate::contract::EntityType;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64;

/// Identity of the rows a unit rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub base_type: EntityType,
    pub base_id: i64,
    pub target_type: Option<EntityType>,
}

impl LockKey {
    pub fn entity(base_type: EntityType, base_id: i64) -> Self {
        Self {
            base_type,
            base_id,
            target_type: None,
        }
    }

    pub fn pair(base_type: EntityType, base_id: i64, target_type: EntityType) -> Self {
        Self {
            base_type,
            base_id,
            target_type: Some(target_type),
        }
    }

    /// Stable 64-bit key for database advisory locks
    pub fn advisory_key(&self) -> i64 {
        xxh3_64(self.to_string().as_bytes()) as i64
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target_type {
            Some(target) => write!(f, "{}:{}:{}", self.base_type, self.base_id, target),
            None => write!(f, "{}:{}", self.base_type, self.base_id),
        }
    }
}

/// Held lock; releasing happens on drop
pub struct LockGuard {
    _inner: Box<dyn Send>,
}

impl LockGuard {
    pub fn new(inner: impl Send + 'static) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

#[async_trait]
pub trait EntityLock: Send + Sync {
    /// Wait until `key` is free and take it
    async fn acquire(&self, key: LockKey) -> Result<LockGuard>;
}

/// In-process lock table, enough when a single process runs all workers
#[derive(Default)]
pub struct KeyedLocks {
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have ever been locked and are still tracked
    pub fn tracked(&self) -> usize {
        self.slots.len()
    }

    /// Drop slots nobody holds or waits on
    pub fn prune(&self) {
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }
}

#[async_trait]
impl EntityLock for KeyedLocks {
    async fn acquire(&self, key: LockKey) -> Result<LockGuard> {
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.lock_owned().await;
        Ok(LockGuard::new(guard))
    }
}
