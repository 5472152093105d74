// Horse results, pedigree and profile scraping.
//
// The results page is the primary page for history and detailed results.
// The pedigree page is primary for ParentInfo; each parent's profile page is
// secondary and degrades to zeros on failure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use scraper::Html;
use tracing::{debug, info, warn};

use paddock_common::{
    DetailedResult, HorseOverallStats, HorseRaceHistory, ParentInfo, ParentProfile, ParentRole, PastResult,
    NO_HISTORY_DAYS,
};

use crate::error::{Result, ScrapeError};
use crate::extract::{days_since, extract_first, parse_distance, parse_position, select_all, today_jst, Strategy};
use crate::fetcher::PageSource;
use crate::pedigree::{parse_overall_stats, parse_parent_links, parse_profile_tally, ParentLink};
use crate::schema::{read_row, ResultField, SchemaRow};

/// Rows of the results table kept for a history.
pub const RECENT_RESULTS_LIMIT: usize = 10;

/// ParentInfo plus which parents' profile pages could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PedigreeOutcome {
    pub info: ParentInfo,
    pub failed: Vec<ParentRole>,
}

/// Rows read through the results schema, plus how many were rejected.
#[derive(Debug, Clone)]
pub struct ResultsTable {
    pub horse_name: String,
    pub rows: Vec<SchemaRow>,
    pub mismatches: u64,
}

pub struct HorseScraper {
    source: Arc<dyn PageSource>,
    base_url: String,
    schema_mismatches: AtomicU64,
}

impl HorseScraper {
    pub fn new(source: Arc<dyn PageSource>, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            schema_mismatches: AtomicU64::new(0),
        }
    }

    pub fn results_url(&self, horse_id: &str) -> String {
        format!("{}/horse/result/{horse_id}/", self.base_url)
    }

    pub fn pedigree_url(&self, horse_id: &str) -> String {
        format!("{}/horse/ped/{horse_id}/", self.base_url)
    }

    pub fn profile_url(&self, horse_id: &str) -> String {
        format!("{}/horse/{horse_id}/", self.base_url)
    }

    /// Results-table rows rejected by the column schema since construction.
    /// A rising count means the source layout drifted.
    pub fn schema_mismatches(&self) -> u64 {
        self.schema_mismatches.load(Ordering::Relaxed)
    }

    async fn results_table(&self, horse_id: &str, limit: Option<usize>) -> Result<ResultsTable> {
        ScrapeError::check_identifier("horse id", horse_id)?;
        let page = self.source.fetch(&self.results_url(horse_id)).await?;
        let table = parse_results_table(&page.html, limit);
        if table.mismatches > 0 {
            warn!(horse_id, skipped = table.mismatches, "Results rows narrower than schema");
            self.schema_mismatches.fetch_add(table.mismatches, Ordering::Relaxed);
        }
        Ok(table)
    }

    /// Up to the ten most recent results, newest first.
    pub async fn fetch_history(&self, horse_id: &str) -> Result<HorseRaceHistory> {
        let table = self.results_table(horse_id, Some(RECENT_RESULTS_LIMIT)).await?;
        let history = history_from_table(table, horse_id, today_jst());
        info!(
            horse_id,
            results = history.recent_results.len(),
            days_since_last_race = history.days_since_last_race,
            "Fetched horse history"
        );
        Ok(history)
    }

    /// Every results row the schema can read, newest first, optionally capped.
    pub async fn fetch_race_results(&self, horse_id: &str, limit: Option<usize>) -> Result<Vec<DetailedResult>> {
        let table = self.results_table(horse_id, limit).await?;
        Ok(table.rows.iter().map(detailed_result).collect())
    }

    /// Sire and dam with their career tallies. A parent whose profile page
    /// fails keeps its name and id with zeroed stats, and is listed in
    /// `failed`.
    pub async fn fetch_pedigree(&self, horse_id: &str) -> Result<PedigreeOutcome> {
        ScrapeError::check_identifier("horse id", horse_id)?;
        let page = self.source.fetch(&self.pedigree_url(horse_id)).await?;
        let (sire_link, dam_link) = parse_parent_links(&page.html);

        if dam_link.id.is_empty() {
            debug!(horse_id, "No dam row matched the foaling-decade id pattern");
        }

        let (sire, dam) = tokio::join!(
            self.parent_profile(horse_id, ParentRole::Sire, sire_link),
            self.parent_profile(horse_id, ParentRole::Dam, dam_link),
        );

        let mut failed = Vec::new();
        let sire = sire.unwrap_or_else(|profile| {
            failed.push(ParentRole::Sire);
            profile
        });
        let dam = dam.unwrap_or_else(|profile| {
            failed.push(ParentRole::Dam);
            profile
        });

        info!(horse_id, sire = %sire.name, dam = %dam.name, failed = failed.len(), "Fetched pedigree");
        Ok(PedigreeOutcome {
            info: ParentInfo {
                horse_id: horse_id.to_string(),
                sire,
                dam,
            },
            failed,
        })
    }

    /// `Err` carries the degraded profile so the caller can still use it.
    async fn parent_profile(
        &self,
        horse_id: &str,
        role: ParentRole,
        link: ParentLink,
    ) -> std::result::Result<ParentProfile, ParentProfile> {
        if link.id.is_empty() {
            return Ok(link.into_profile());
        }
        let url = self.profile_url(&link.id);
        let mut profile = link.into_profile();
        match self.source.fetch(&url).await {
            Ok(page) => {
                parse_profile_tally(&page.html).apply_to(&mut profile);
                Ok(profile)
            }
            Err(e) => {
                warn!(horse_id, %role, parent_id = %profile.id, error = %e, "Parent profile unavailable");
                Err(profile)
            }
        }
    }

    /// Career summary from the horse's own profile page.
    pub async fn fetch_overall_stats(&self, horse_id: &str) -> Result<HorseOverallStats> {
        ScrapeError::check_identifier("horse id", horse_id)?;
        let page = self.source.fetch(&self.profile_url(horse_id)).await?;
        Ok(parse_overall_stats(&page.html, horse_id))
    }
}

/// Read the results table. Narrow rows are skipped and counted before
/// `limit` is applied.
pub fn parse_results_table(html: &str, limit: Option<usize>) -> ResultsTable {
    let doc = Html::parse_document(html);
    let root = doc.root_element();
    let horse_name = extract_first(root, &[Strategy::Text(".horse_title h1")], "");

    let mut rows = Vec::new();
    let mut mismatches = 0u64;
    for tr in select_all(root, ".db_h_race_results tbody tr") {
        if limit.is_some_and(|n| rows.len() >= n) {
            break;
        }
        match read_row(tr) {
            Some(row) => rows.push(row),
            None => mismatches += 1,
        }
    }

    ResultsTable {
        horse_name,
        rows,
        mismatches,
    }
}

/// Parse a results page into a history as of `today`.
pub fn parse_history(html: &str, horse_id: &str, today: NaiveDate) -> HorseRaceHistory {
    history_from_table(parse_results_table(html, Some(RECENT_RESULTS_LIMIT)), horse_id, today)
}

fn history_from_table(table: ResultsTable, horse_id: &str, today: NaiveDate) -> HorseRaceHistory {
    let recent_results: Vec<PastResult> = table
        .rows
        .iter()
        .map(|row| PastResult {
            date: row.get(ResultField::Date).to_string(),
            track: row.get(ResultField::Venue).to_string(),
            distance: row.get(ResultField::Distance).to_string(),
            position: parse_position(row.get(ResultField::FinishPosition)),
            time: row.get(ResultField::Time).to_string(),
            margin: row.get(ResultField::Margin).to_string(),
        })
        .collect();

    let mut history = HorseRaceHistory {
        horse_id: horse_id.to_string(),
        horse_name: table.horse_name,
        recent_results,
        days_since_last_race: NO_HISTORY_DAYS,
    };
    refresh_days_since(&mut history, today);
    history
}

/// Recompute `days_since_last_race` from the newest result as of `today`.
/// Stored histories go stale by a day every day.
pub fn refresh_days_since(history: &mut HorseRaceHistory, today: NaiveDate) {
    history.days_since_last_race = history
        .recent_results
        .first()
        .map(|r| days_since(&r.date, today))
        .unwrap_or(NO_HISTORY_DAYS);
}

fn detailed_result(row: &SchemaRow) -> DetailedResult {
    let text = |f| row.get(f).to_string();
    let (track_surface, distance_meters) = parse_distance(row.get(ResultField::Distance));

    DetailedResult {
        date: text(ResultField::Date),
        venue: text(ResultField::Venue),
        weather: text(ResultField::Weather),
        race_number: text(ResultField::RaceNumber),
        race_name: text(ResultField::RaceName),
        num_horses: text(ResultField::NumHorses),
        gate_number: text(ResultField::GateNumber),
        horse_number: text(ResultField::HorseNumber),
        odds: text(ResultField::Odds),
        popularity: text(ResultField::Popularity),
        finish_position: text(ResultField::FinishPosition),
        jockey: text(ResultField::Jockey),
        weight: text(ResultField::Weight),
        distance: text(ResultField::Distance),
        track_surface,
        distance_meters,
        track_condition: text(ResultField::TrackCondition),
        track_index: text(ResultField::TrackIndex),
        time: text(ResultField::Time),
        margin: text(ResultField::Margin),
        time_index: text(ResultField::TimeIndex),
        passing: text(ResultField::Passing),
        pace: text(ResultField::Pace),
        last_3f: text(ResultField::Last3f),
        horse_weight: text(ResultField::HorseWeight),
        trainer_comment: text(ResultField::TrainerComment),
        note: text(ResultField::Note),
        winner: text(ResultField::Winner),
        prize: text(ResultField::Prize),
    }
}

#[cfg(test)]
mod tests {
    use paddock_common::{Surface, UNPARSED_POSITION};

    use super::*;

    const RESULTS: &str = include_str!("../tests/fixtures/horse_results.html");

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 12, 1).unwrap()
    }

    #[test]
    fn history_reads_schema_columns() {
        let h = parse_history(RESULTS, "2019105219", today());
        assert_eq!(h.horse_name, "リバティアイランド");
        let first = &h.recent_results[0];
        assert_eq!(first.date, "2023/11/26");
        assert_eq!(first.track, "5東京8");
        assert_eq!(first.distance, "芝2400");
        assert_eq!(first.position, 2);
        assert_eq!(first.time, "2:21.8");
        assert_eq!(first.margin, "0.7");
        assert_eq!(h.days_since_last_race, 5);
    }

    #[test]
    fn history_caps_at_ten_and_skips_narrow_rows() {
        // Fixture: 12 full rows and one narrow row in third position.
        let table = parse_results_table(RESULTS, Some(RECENT_RESULTS_LIMIT));
        assert_eq!(table.rows.len(), RECENT_RESULTS_LIMIT);
        assert_eq!(table.mismatches, 1);
    }

    #[test]
    fn refresh_recomputes_against_a_later_day() {
        let mut h = parse_history(RESULTS, "2019105219", today());
        refresh_days_since(&mut h, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(h.days_since_last_race, 35);

        let mut empty = HorseRaceHistory::empty("2021100001");
        empty.days_since_last_race = 3;
        refresh_days_since(&mut empty, today());
        assert_eq!(empty.days_since_last_race, NO_HISTORY_DAYS);
    }

    #[test]
    fn scratched_race_gets_position_sentinel() {
        let h = parse_history(RESULTS, "2019105219", today());
        assert!(h.recent_results.iter().any(|r| r.position == UNPARSED_POSITION));
    }

    #[test]
    fn missing_table_yields_sentinel_history() {
        let h = parse_history(
            r#"<div class="horse_title"><h1>新馬</h1></div>"#,
            "2021100001",
            today(),
        );
        assert_eq!(h.horse_name, "新馬");
        assert!(h.recent_results.is_empty());
        assert_eq!(h.days_since_last_race, NO_HISTORY_DAYS);
    }

    #[test]
    fn detailed_rows_parse_distance() {
        let table = parse_results_table(RESULTS, None);
        assert_eq!(table.rows.len(), 12);
        let detailed: Vec<DetailedResult> = table.rows.iter().map(detailed_result).collect();
        assert_eq!(detailed[0].track_surface, Surface::Turf);
        assert_eq!(detailed[0].distance_meters, 2400);
        assert_eq!(detailed[0].weather, "晴");
        assert_eq!(detailed[0].jockey, "川田将雅");
        assert_eq!(detailed[0].prize, "20,000.0");
    }
}
