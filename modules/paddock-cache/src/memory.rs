// In-process backend. Rows are kept in normalized form and never purged, so
// expired rows stay readable here and CacheStore must reject them itself.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::backend::{CacheBackend, CacheRecord};
use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use crate::normalize::StoredValue;

#[derive(Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<CacheKey, BTreeMap<String, StoredValue>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(op: &'static str) -> CacheError {
    CacheError::backend(op, "memory backend lock poisoned")
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get_item(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let item = {
            let rows = self.rows.read().map_err(|_| poisoned("get"))?;
            rows.get(key).cloned()
        };
        item.map(CacheRecord::from_item).transpose()
    }

    async fn put_item(&self, record: CacheRecord) -> Result<()> {
        let key = record.key.clone();
        let item = record.into_item();
        self.rows.write().map_err(|_| poisoned("put"))?.insert(key, item);
        Ok(())
    }

    async fn delete_item(&self, key: &CacheKey) -> Result<()> {
        self.rows.write().map_err(|_| poisoned("delete"))?.remove(key);
        Ok(())
    }
}
