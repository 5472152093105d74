// Race dataset assembly.
//
// Card first (cache, then fetch, then cache write), then every entrant in a
// bounded pool. Each entrant resolves history, pedigree and jockey stats
// concurrently, each cache-first. All fetches share one PageSource and so one
// rate limiter. Entrants finish in any order; the dataset is re-sorted by
// horse number before it is returned.
//
// Only the card is fatal. A failed sub-record is merged as its zero value and
// reported as an AssemblyWarning.

use std::pin::pin;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use paddock_cache::CacheStore;
use paddock_common::{
    is_valid_race_id, AssemblyWarning, Config, HorseRaceHistory, HorseRecord, JockeyStats, ParentInfo, RaceCard,
    RaceDataset, RaceEntrant, RaceSummary, SubRecordKind,
};
use paddock_scraper::extract::today_jst;
use paddock_scraper::{
    refresh_days_since, HorseScraper, JockeyScraper, PageSource, PedigreeOutcome, RaceScraper, ScrapeError,
};

use crate::error::AssemblyError;

/// How an assembly ended. A cancelled run carries whatever entrants had
/// fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Complete(RaceDataset),
    Cancelled(RaceDataset),
}

impl AssemblyOutcome {
    pub fn dataset(&self) -> &RaceDataset {
        match self {
            AssemblyOutcome::Complete(d) | AssemblyOutcome::Cancelled(d) => d,
        }
    }

    pub fn into_dataset(self) -> RaceDataset {
        match self {
            AssemblyOutcome::Complete(d) | AssemblyOutcome::Cancelled(d) => d,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, AssemblyOutcome::Complete(_))
    }
}

pub struct Assembler {
    races: RaceScraper,
    horses: HorseScraper,
    jockeys: JockeyScraper,
    cache: CacheStore,
    max_concurrency: usize,
}

impl Assembler {
    pub fn new(source: Arc<dyn PageSource>, cache: CacheStore, config: &Config) -> Self {
        Self {
            races: RaceScraper::new(source.clone(), config.race_base_url.clone()),
            horses: HorseScraper::new(source.clone(), config.db_base_url.clone()),
            jockeys: JockeyScraper::new(source, config.db_base_url.clone()),
            cache,
            max_concurrency: config.max_concurrent_entrants.max(1),
        }
    }

    pub fn races(&self) -> &RaceScraper {
        &self.races
    }

    pub fn horses(&self) -> &HorseScraper {
        &self.horses
    }

    pub fn jockeys(&self) -> &JockeyScraper {
        &self.jockeys
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    // --- Cache-or-fetch lookups ---

    /// Races at the venue matching `track` on `date`. Empty listings are not
    /// cached, the card for a future date may not be published yet.
    pub async fn resolve_race_ids(&self, date: &str, track: &str) -> Result<Vec<RaceSummary>, AssemblyError> {
        if let Some(races) = self.cache.get_race_ids(date, track).await {
            return Ok(races);
        }

        let races: Vec<RaceSummary> = self
            .races
            .list_by_date(date)
            .await
            .map_err(|source| AssemblyError::RaceList {
                date: date.to_string(),
                source,
            })?
            .into_iter()
            .filter(|r| r.track_name.contains(track))
            .collect();

        if !races.is_empty() {
            self.cache.set_race_ids(date, track, &races).await;
        }
        Ok(races)
    }

    /// The race card, with `track_hint` written into `track_name` when given.
    ///
    /// A card with no entrants (unknown race, or the draw has not happened)
    /// is an error and never cached. A stored card without entrants is
    /// ignored and refetched.
    pub async fn race_card(&self, race_id: &str, track_hint: Option<&str>) -> Result<RaceCard, AssemblyError> {
        if !is_valid_race_id(race_id) {
            return Err(AssemblyError::InvalidRaceId(race_id.to_string()));
        }

        match self.cache.get_race_card(race_id).await {
            Some(mut card) if !card.entrants.is_empty() => {
                if let Some(hint) = track_hint {
                    card.track_name = Some(hint.to_string());
                }
                return Ok(card);
            }
            Some(_) => debug!(race_id, "Ignoring cached race card without entrants"),
            None => {}
        }

        let mut card = self
            .races
            .fetch_card(race_id)
            .await
            .map_err(|source| AssemblyError::RaceCard {
                race_id: race_id.to_string(),
                source,
            })?;
        if let Some(hint) = track_hint {
            card.track_name = Some(hint.to_string());
        }
        self.cache.set_race_card(&card).await;
        Ok(card)
    }

    /// Cached histories get `days_since_last_race` recomputed for today.
    pub async fn horse_history(&self, horse_id: &str) -> Result<HorseRaceHistory, ScrapeError> {
        if let Some(mut history) = self.cache.get_horse_history(horse_id).await {
            refresh_days_since(&mut history, today_jst());
            return Ok(history);
        }
        let history = self.horses.fetch_history(horse_id).await?;
        self.cache.set_horse_history(&history).await;
        Ok(history)
    }

    /// Pedigree with parent profiles. A pedigree with a failed parent
    /// profile is returned but not cached, so the next run retries it.
    pub async fn horse_parents(&self, horse_id: &str) -> Result<PedigreeOutcome, ScrapeError> {
        if let Some(info) = self.cache.get_horse_parents(horse_id).await {
            return Ok(PedigreeOutcome {
                info,
                failed: Vec::new(),
            });
        }
        let outcome = self.horses.fetch_pedigree(horse_id).await?;
        if outcome.failed.is_empty() {
            self.cache.set_horse_parents(&outcome.info).await;
        }
        Ok(outcome)
    }

    /// An entrant without a jockey link fails here, before any lookup.
    pub async fn jockey_stats(&self, jockey_id: &str) -> Result<JockeyStats, ScrapeError> {
        ScrapeError::check_identifier("jockey id", jockey_id)?;
        if let Some(stats) = self.cache.get_jockey_stats(jockey_id).await {
            return Ok(stats);
        }
        let stats = self.jockeys.fetch_stats(jockey_id).await?;
        self.cache.set_jockey_stats(&stats).await;
        Ok(stats)
    }

    // --- Assembly ---

    async fn resolve_entrant(&self, entrant: RaceEntrant) -> (HorseRecord, Vec<AssemblyWarning>) {
        let (history, pedigree, jockey) = tokio::join!(
            self.horse_history(&entrant.horse_id),
            self.horse_parents(&entrant.horse_id),
            self.jockey_stats(&entrant.jockey_id),
        );

        let horse_number = entrant.horse_number;
        let mut warnings = Vec::new();
        let mut degrade = |kind: SubRecordKind, message: String| {
            warn!(horse_number, horse_id = %entrant.horse_id, %kind, error = %message, "Sub-record degraded to zero value");
            warnings.push(AssemblyWarning {
                horse_number,
                kind,
                message,
            });
        };

        let history = history
            .map_err(|e| degrade(SubRecordKind::History, e.to_string()))
            .ok();

        let parents: Option<ParentInfo> = match pedigree {
            Ok(outcome) => {
                for role in &outcome.failed {
                    degrade(SubRecordKind::ParentProfile, format!("{role} profile unavailable"));
                }
                Some(outcome.info)
            }
            Err(e) => {
                degrade(SubRecordKind::Pedigree, e.to_string());
                None
            }
        };

        let jockey = jockey
            .map_err(|e| degrade(SubRecordKind::Jockey, e.to_string()))
            .ok();

        (HorseRecord::merge(entrant, history, parents, jockey), warnings)
    }

    /// Assemble the full dataset for `race_id`.
    ///
    /// Cancelling `cancel` drops every in-flight fetch. Before the card is
    /// resolved that is `AssemblyError::Cancelled`; afterwards the entrants
    /// resolved so far come back as `AssemblyOutcome::Cancelled`.
    pub async fn assemble(
        &self,
        race_id: &str,
        track_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AssemblyOutcome, AssemblyError> {
        let mut card = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AssemblyError::Cancelled),
            card = self.race_card(race_id, track_hint) => card?,
        };

        let entrants = std::mem::take(&mut card.entrants);
        let total = entrants.len();
        info!(race_id, race_name = %card.race_name, entrants = total, "Assembling race dataset");

        let mut pending = pin!(stream::iter(entrants.into_iter().map(|e| self.resolve_entrant(e)))
            .buffer_unordered(self.max_concurrency));

        let mut horses = Vec::with_capacity(total);
        let mut warnings = Vec::new();
        let cancelled = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                next = pending.next() => match next {
                    Some((horse, w)) => {
                        debug!(horse_number = horse.entrant.horse_number, "Entrant resolved");
                        horses.push(horse);
                        warnings.extend(w);
                    }
                    None => break false,
                },
            }
        };

        horses.sort_by_key(|h| h.entrant.horse_number);
        warnings.sort_by_key(|w| w.horse_number);

        let dataset = RaceDataset {
            race_id: card.race_id,
            race_name: card.race_name,
            distance_meters: card.distance_meters,
            track_surface: card.track_surface,
            track_name: card.track_name,
            horses,
            warnings,
        };

        if cancelled {
            warn!(race_id, resolved = dataset.horses.len(), entrants = total, "Assembly cancelled");
            return Ok(AssemblyOutcome::Cancelled(dataset));
        }

        info!(
            race_id,
            horses = dataset.horses.len(),
            warnings = dataset.warnings.len(),
            schema_mismatches = self.horses.schema_mismatches(),
            "Race dataset assembled"
        );
        Ok(AssemblyOutcome::Complete(dataset))
    }
}
