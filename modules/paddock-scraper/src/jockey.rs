// Jockey year-by-year statistics.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info};

use paddock_common::{JockeyStats, RateRecord};

use crate::error::{Result, ScrapeError};
use crate::extract::{cells, clean_text, parse_count, parse_percentage, select_all, select_first};
use crate::fetcher::PageSource;

/// Year rows summed into the recent window.
pub const RECENT_YEARS: usize = 5;

const CUMULATIVE_LABEL: &str = "累計";
const MIN_STATS_CELLS: usize = 12;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").expect("valid regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

pub struct JockeyScraper {
    source: Arc<dyn PageSource>,
    base_url: String,
}

impl JockeyScraper {
    pub fn new(source: Arc<dyn PageSource>, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn jockey_url(&self, jockey_id: &str) -> String {
        format!("{}/jockey/{jockey_id}/", self.base_url)
    }

    pub async fn fetch_stats(&self, jockey_id: &str) -> Result<JockeyStats> {
        ScrapeError::check_identifier("jockey id", jockey_id)?;
        let page = self.source.fetch(&self.jockey_url(jockey_id)).await?;
        let stats = parse_jockey_stats(&page.html, jockey_id);
        info!(
            jockey_id,
            jockey_name = %stats.jockey_name,
            total_races = stats.overall.total_races,
            recent_races = stats.recent_window.total_races,
            "Fetched jockey stats"
        );
        Ok(stats)
    }
}

/// Counts and displayed rates of one stats row.
struct StatsRow {
    counts: RateRecord,
    displayed: (f64, f64, f64),
}

fn read_stats_row(row: ElementRef) -> Option<StatsRow> {
    let tds = cells(row);
    if tds.len() < MIN_STATS_CELLS {
        return None;
    }
    let count = |i: usize| parse_count(&clean_text(tds[i]));
    let pct = |i: usize| parse_percentage(&clean_text(tds[i]));

    Some(StatsRow {
        counts: RateRecord::from_counts(count(2), count(3), count(4), count(6)),
        displayed: (pct(9), pct(10), pct(11)),
    })
}

fn first_cell_text(row: ElementRef) -> String {
    select_first(row, "td").map(clean_text).unwrap_or_default()
}

/// Parse the first year-by-year table. The cumulative row gives `overall`;
/// the next five year rows are summed into `recent_window`.
pub fn parse_jockey_stats(html: &str, jockey_id: &str) -> JockeyStats {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let jockey_name = select_first(root, ".db_head_name h1")
        .map(|h1| WHITESPACE_RE.replace_all(h1.text().collect::<String>().trim(), " ").into_owned())
        .unwrap_or_default();

    let rows = select_first(root, "table.ResultsByYears")
        .map(|table| select_all(table, "tbody tr"))
        .unwrap_or_default();

    let overall = rows
        .first()
        .filter(|row| first_cell_text(**row).contains(CUMULATIVE_LABEL))
        .and_then(|row| read_stats_row(*row))
        .map(|row| {
            let shown = row.displayed;
            let derived = (row.counts.win_rate, row.counts.place_rate, row.counts.show_rate);
            if shown != derived {
                debug!(jockey_id, ?shown, ?derived, "Displayed rates differ from counts");
            }
            row.counts
        })
        .unwrap_or_default();

    let year_rows: Vec<RateRecord> = rows
        .iter()
        .skip(1)
        .filter(|row| YEAR_RE.is_match(&first_cell_text(**row)))
        .take(RECENT_YEARS)
        .filter_map(|row| read_stats_row(*row))
        .map(|row| row.counts)
        .collect();

    JockeyStats {
        jockey_id: jockey_id.to_string(),
        jockey_name,
        overall,
        recent_window: RateRecord::sum(&year_rows),
    }
}
