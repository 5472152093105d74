use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Sentinels ---

/// `days_since_last_race` when there is no history or the last date is unparseable.
pub const NO_HISTORY_DAYS: i64 = 999;

/// Finish position for a row whose position cell has no digits (DNF, scratched, blank).
pub const UNPARSED_POSITION: u32 = 99;

/// Length of a race identifier: YYYY + venue + meeting + day + race number.
pub const RACE_ID_LEN: usize = 12;

/// True when `race_id` is exactly twelve ASCII digits.
pub fn is_valid_race_id(race_id: &str) -> bool {
    race_id.len() == RACE_ID_LEN && race_id.bytes().all(|b| b.is_ascii_digit())
}

/// Race number (1-12) encoded in the trailing two digits of a race identifier.
pub fn race_number(race_id: &str) -> Option<u32> {
    if !is_valid_race_id(race_id) {
        return None;
    }
    race_id[RACE_ID_LEN - 2..].parse().ok()
}

/// True when `date` is a `YYYYMMDD` calendar date.
pub fn is_valid_race_date(date: &str) -> bool {
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && chrono::NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
}

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Turf,
    Dirt,
    Jump,
    #[default]
    Unknown,
}

impl Surface {
    /// Label as printed on the source site. Unknown renders empty.
    pub fn label(&self) -> &'static str {
        match self {
            Surface::Turf => "芝",
            Surface::Dirt => "ダート",
            Surface::Jump => "障害",
            Surface::Unknown => "",
        }
    }
}

impl std::fmt::Display for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Surface::Turf => write!(f, "turf"),
            Surface::Dirt => write!(f, "dirt"),
            Surface::Jump => write!(f, "jump"),
            Surface::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParentRole {
    Sire,
    Dam,
}

impl std::fmt::Display for ParentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParentRole::Sire => write!(f, "sire"),
            ParentRole::Dam => write!(f, "dam"),
        }
    }
}

// --- Race ---

/// One item of a per-date race listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RaceSummary {
    pub race_id: String,
    pub track_name: String,
    pub race_number: u32,
    pub race_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RaceEntrant {
    pub horse_id: String,
    pub horse_name: String,
    pub jockey_id: String,
    pub jockey_name: String,
    pub frame_number: u32,
    pub horse_number: u32,
}

/// Entry table of one race. Entrants keep on-page (post position) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RaceCard {
    pub race_id: String,
    pub race_name: String,
    pub distance_meters: u32,
    pub track_surface: Surface,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    pub entrants: Vec<RaceEntrant>,
}

// --- Horse ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PastResult {
    pub date: String,
    pub track: String,
    pub distance: String,
    /// 1..N, or [`UNPARSED_POSITION`].
    pub position: u32,
    pub time: String,
    pub margin: String,
}

/// Most recent results first, as the source presents them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HorseRaceHistory {
    pub horse_id: String,
    pub horse_name: String,
    pub recent_results: Vec<PastResult>,
    /// Days since `recent_results[0]`, or [`NO_HISTORY_DAYS`].
    pub days_since_last_race: i64,
}

impl HorseRaceHistory {
    pub fn empty(horse_id: &str) -> Self {
        Self {
            horse_id: horse_id.to_string(),
            horse_name: String::new(),
            recent_results: Vec::new(),
            days_since_last_race: NO_HISTORY_DAYS,
        }
    }
}

/// A full results-table row, all columns the schema knows about.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct DetailedResult {
    pub date: String,
    pub venue: String,
    pub weather: String,
    pub race_number: String,
    pub race_name: String,
    pub num_horses: String,
    pub gate_number: String,
    pub horse_number: String,
    pub odds: String,
    pub popularity: String,
    pub finish_position: String,
    pub jockey: String,
    pub weight: String,
    pub distance: String,
    pub track_surface: Surface,
    pub distance_meters: u32,
    pub track_condition: String,
    /// Track variant index (馬場指数).
    pub track_index: String,
    pub time: String,
    pub margin: String,
    /// Speed figure; blank on most pages.
    #[serde(default)]
    pub time_index: String,
    pub passing: String,
    pub pace: String,
    pub last_3f: String,
    pub horse_weight: String,
    #[serde(default)]
    pub trainer_comment: String,
    #[serde(default)]
    pub note: String,
    /// Winner, or runner-up when this horse won.
    #[serde(default)]
    pub winner: String,
    pub prize: String,
}

/// Career summary from a horse's profile page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HorseOverallStats {
    pub horse_id: String,
    pub horse_name: String,
    /// Raw record text, e.g. `2戦0勝 [0-0-0-2]`.
    pub overall_record: String,
    pub wins: u32,
    pub races: u32,
}

/// Earnings and career tally of one parent.
///
/// An empty `id` means the parent link was not resolved and no profile fetch
/// was attempted; every numeric field is then zero.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ParentProfile {
    pub name: String,
    pub id: String,
    pub earnings: String,
    pub first: u32,
    pub second: u32,
    pub third: u32,
    pub fourth_or_lower: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ParentInfo {
    pub horse_id: String,
    pub sire: ParentProfile,
    pub dam: ParentProfile,
}

// --- Jockey ---

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RateRecord {
    pub wins: u32,
    pub seconds: u32,
    pub thirds: u32,
    pub total_races: u32,
    pub win_rate: f64,
    pub place_rate: f64,
    pub show_rate: f64,
}

impl RateRecord {
    /// Build a record whose rates are derived from the counts, rounded to one
    /// decimal. Zero starts yields all-zero rates.
    pub fn from_counts(wins: u32, seconds: u32, thirds: u32, total_races: u32) -> Self {
        let rate = |n: u32| {
            if total_races == 0 {
                0.0
            } else {
                round1(f64::from(n) / f64::from(total_races) * 100.0)
            }
        };
        Self {
            wins,
            seconds,
            thirds,
            total_races,
            win_rate: rate(wins),
            place_rate: rate(wins + seconds),
            show_rate: rate(wins + seconds + thirds),
        }
    }

    /// Sum counts across records and recompute rates from the totals.
    pub fn sum<'a>(records: impl IntoIterator<Item = &'a RateRecord>) -> Self {
        let (w, s, t, n) = records.into_iter().fold((0, 0, 0, 0), |acc, r| {
            (
                acc.0 + r.wins,
                acc.1 + r.seconds,
                acc.2 + r.thirds,
                acc.3 + r.total_races,
            )
        });
        Self::from_counts(w, s, t, n)
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct JockeyStats {
    pub jockey_id: String,
    pub jockey_name: String,
    pub overall: RateRecord,
    /// Counts summed over the five most recent year rows.
    pub recent_window: RateRecord,
}

// --- Assembled dataset ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubRecordKind {
    History,
    Pedigree,
    ParentProfile,
    Jockey,
}

impl std::fmt::Display for SubRecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubRecordKind::History => write!(f, "history"),
            SubRecordKind::Pedigree => write!(f, "pedigree"),
            SubRecordKind::ParentProfile => write!(f, "parent_profile"),
            SubRecordKind::Jockey => write!(f, "jockey"),
        }
    }
}

/// A sub-record that could not be resolved and was zero-valued instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyWarning {
    pub horse_number: u32,
    pub kind: SubRecordKind,
    pub message: String,
}

/// One entrant with every resolved sub-record merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HorseRecord {
    #[serde(flatten)]
    pub entrant: RaceEntrant,
    pub recent_results: Vec<PastResult>,
    pub days_since_last_race: i64,
    pub jockey_overall: RateRecord,
    pub jockey_recent: RateRecord,
    pub sire: ParentProfile,
    pub dam: ParentProfile,
}

impl HorseRecord {
    /// Merge whatever sub-records resolved. Missing ones take their zero value.
    pub fn merge(
        entrant: RaceEntrant,
        history: Option<HorseRaceHistory>,
        parents: Option<ParentInfo>,
        jockey: Option<JockeyStats>,
    ) -> Self {
        let (recent_results, days_since_last_race) = match history {
            Some(h) => (h.recent_results, h.days_since_last_race),
            None => (Vec::new(), NO_HISTORY_DAYS),
        };
        let parents = parents.unwrap_or_default();
        let jockey = jockey.unwrap_or_default();

        Self {
            entrant,
            recent_results,
            days_since_last_race,
            jockey_overall: jockey.overall,
            jockey_recent: jockey.recent_window,
            sire: parents.sire,
            dam: parents.dam,
        }
    }
}

/// The denormalized race handed to the analysis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RaceDataset {
    pub race_id: String,
    pub race_name: String,
    pub distance_meters: u32,
    pub track_surface: Surface,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    /// Sorted by horse number.
    pub horses: Vec<HorseRecord>,
    #[serde(default)]
    pub warnings: Vec<AssemblyWarning>,
}
