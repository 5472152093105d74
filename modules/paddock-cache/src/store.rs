// CacheStore: typed, TTL-checked access to a CacheBackend.
//
// Reads re-check `ttl` against the store's clock even when the backend purges
// on its own. Every backend or payload failure is logged and turned into a
// miss (reads) or `false` (writes); nothing here returns an error.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use paddock_common::{CacheBackendKind, Config, HorseRaceHistory, JockeyStats, ParentInfo, RaceCard, RaceSummary};

use crate::backend::{CacheBackend, CacheRecord};
use crate::dynamo::DynamoBackend;
use crate::error::Result;
use crate::keys::{prompt_hash, CacheKey};
use crate::memory::MemoryBackend;
use crate::normalize::{denormalize, normalize};

/// Epoch-seconds source.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Payload stored under `ANALYSIS#{race_id}` / `PROMPT#{hash}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_result: serde_json::Value,
    pub custom_prompt: String,
    pub prompt_hash: String,
}

#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    ttl_secs: i64,
    clock: Clock,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl_secs: i64) -> Self {
        Self {
            backend,
            ttl_secs,
            clock: Arc::new(|| Utc::now().timestamp()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Build the backend named by `config.cache_backend`.
    pub async fn from_config(config: &Config) -> Self {
        let backend: Arc<dyn CacheBackend> = match config.cache_backend {
            CacheBackendKind::DynamoDb => Arc::new(DynamoBackend::from_config(config).await),
            CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        };
        Self::new(backend, config.cache_ttl_secs)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    // --- Generic access ---

    /// Live payload under `key`, or `None` on miss, expiry, or any failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.try_get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>> {
        let Some(record) = self.backend.get_item(key).await? else {
            debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        let now = self.now();
        if !record.is_live(now) {
            debug!(key = %key, ttl = record.ttl, now, "Cache entry expired");
            return Ok(None);
        }

        let value = serde_json::from_value(denormalize(&record.data)?)?;
        debug!(key = %key, fetched_at = record.fetched_at, "Cache hit");
        Ok(Some(value))
    }

    /// Write `value` under `key`, replacing any previous entry. `false` on failure.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) -> bool {
        match self.try_set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    async fn try_set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) -> Result<()> {
        let now = self.now();
        let record = CacheRecord {
            key: key.clone(),
            data: normalize(&serde_json::to_value(value)?),
            fetched_at: now,
            ttl: now.saturating_add(self.ttl_secs),
        };
        self.backend.put_item(record).await?;
        debug!(key = %key, "Cache write");
        Ok(())
    }

    pub async fn delete(&self, key: &CacheKey) -> bool {
        match self.backend.delete_item(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    // --- Per-entity accessors ---

    pub async fn get_race_ids(&self, date: &str, track: &str) -> Option<Vec<RaceSummary>> {
        self.get(&CacheKey::race_ids(date, track)).await
    }

    pub async fn set_race_ids(&self, date: &str, track: &str, races: &[RaceSummary]) -> bool {
        self.set(&CacheKey::race_ids(date, track), races).await
    }

    pub async fn get_race_card(&self, race_id: &str) -> Option<RaceCard> {
        self.get(&CacheKey::race_card(race_id)).await
    }

    pub async fn set_race_card(&self, card: &RaceCard) -> bool {
        self.set(&CacheKey::race_card(&card.race_id), card).await
    }

    pub async fn get_horse_history(&self, horse_id: &str) -> Option<HorseRaceHistory> {
        self.get(&CacheKey::horse_history(horse_id)).await
    }

    pub async fn set_horse_history(&self, history: &HorseRaceHistory) -> bool {
        self.set(&CacheKey::horse_history(&history.horse_id), history).await
    }

    pub async fn get_horse_parents(&self, horse_id: &str) -> Option<ParentInfo> {
        self.get(&CacheKey::horse_parents(horse_id)).await
    }

    pub async fn set_horse_parents(&self, parents: &ParentInfo) -> bool {
        self.set(&CacheKey::horse_parents(&parents.horse_id), parents).await
    }

    pub async fn get_jockey_stats(&self, jockey_id: &str) -> Option<JockeyStats> {
        self.get(&CacheKey::jockey_stats(jockey_id)).await
    }

    pub async fn set_jockey_stats(&self, stats: &JockeyStats) -> bool {
        self.set(&CacheKey::jockey_stats(&stats.jockey_id), stats).await
    }

    pub async fn get_analysis(&self, race_id: &str, custom_prompt: &str) -> Option<AnalysisRecord> {
        self.get(&CacheKey::analysis(race_id, custom_prompt)).await
    }

    pub async fn set_analysis(&self, race_id: &str, custom_prompt: &str, analysis_result: serde_json::Value) -> bool {
        let record = AnalysisRecord {
            analysis_result,
            custom_prompt: custom_prompt.to_string(),
            prompt_hash: prompt_hash(custom_prompt),
        };
        self.set(&CacheKey::analysis(race_id, custom_prompt), &record).await
    }
}
