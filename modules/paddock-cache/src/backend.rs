// Backend seam. DynamoDB in production, MemoryBackend for tests and offline
// runs. Backends store and return records as-is; TTL is judged by CacheStore.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::{CacheError, Result};
use crate::keys::CacheKey;
use crate::normalize::StoredValue;

pub const PK_ATTR: &str = "PK";
pub const SK_ATTR: &str = "SK";
pub const DATA_ATTR: &str = "data";
pub const FETCHED_AT_ATTR: &str = "fetched_at";
pub const TTL_ATTR: &str = "ttl";

/// One stored row: `{PK, SK, data, fetched_at, ttl}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    pub key: CacheKey,
    pub data: StoredValue,
    /// Epoch seconds.
    pub fetched_at: i64,
    /// Epoch seconds after which the row is dead.
    pub ttl: i64,
}

impl CacheRecord {
    pub fn is_live(&self, now: i64) -> bool {
        self.ttl >= now
    }

    pub fn into_item(self) -> BTreeMap<String, StoredValue> {
        BTreeMap::from([
            (PK_ATTR.to_string(), StoredValue::S(self.key.pk)),
            (SK_ATTR.to_string(), StoredValue::S(self.key.sk)),
            (DATA_ATTR.to_string(), self.data),
            (FETCHED_AT_ATTR.to_string(), StoredValue::N(self.fetched_at.to_string())),
            (TTL_ATTR.to_string(), StoredValue::N(self.ttl.to_string())),
        ])
    }

    /// Rows missing a key attribute, the payload, or a numeric ttl are malformed.
    pub fn from_item(mut item: BTreeMap<String, StoredValue>) -> Result<Self> {
        let text = |item: &BTreeMap<String, StoredValue>, attr: &str| {
            item.get(attr)
                .and_then(StoredValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| CacheError::Malformed(format!("missing string attribute {attr}")))
        };
        let pk = text(&item, PK_ATTR)?;
        let sk = text(&item, SK_ATTR)?;
        let ttl = item
            .get(TTL_ATTR)
            .and_then(StoredValue::as_i64)
            .ok_or_else(|| CacheError::Malformed(format!("{pk}/{sk}: missing ttl")))?;
        let fetched_at = item.get(FETCHED_AT_ATTR).and_then(StoredValue::as_i64).unwrap_or(0);
        let data = item
            .remove(DATA_ATTR)
            .ok_or_else(|| CacheError::Malformed(format!("{pk}/{sk}: missing data")))?;

        Ok(Self {
            key: CacheKey { pk, sk },
            data,
            fetched_at,
            ttl,
        })
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_item(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;

    /// Overwrites any existing row with the same key.
    async fn put_item(&self, record: CacheRecord) -> Result<()>;

    async fn delete_item(&self, key: &CacheKey) -> Result<()>;
}
