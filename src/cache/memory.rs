//! In-process cache store.

use super::{CacheKey, CacheRow, CacheStore};
use crate::error::CacheError;
use std::collections::HashMap;
use std::sync::Mutex;

/// A [`CacheStore`] backed by a mutex-guarded map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    rows: Mutex<HashMap<CacheKey, CacheRow>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub fn len(&self) -> Result<usize, CacheError> {
        let rows = self.rows.lock().map_err(|_| CacheError::LockPoisoned)?;
        Ok(rows.len())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl CacheStore for MemoryCacheStore {
    fn load(&self, key: CacheKey) -> Result<Option<CacheRow>, CacheError> {
        let rows = self.rows.lock().map_err(|_| CacheError::LockPoisoned)?;
        Ok(rows.get(&key).cloned())
    }

    fn store(&self, key: CacheKey, row: &CacheRow) -> Result<(), CacheError> {
        let mut rows = self.rows.lock().map_err(|_| CacheError::LockPoisoned)?;
        rows.insert(key, row.clone());
        Ok(())
    }

    fn delete(&self, key: CacheKey) -> Result<bool, CacheError> {
        let mut rows = self.rows.lock().map_err(|_| CacheError::LockPoisoned)?;
        Ok(rows.remove(&key).is_some())
    }
}
