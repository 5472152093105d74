// Pedigree table and profile table parsing.
//
// The blood table is a generation grid. The sire is the first linked cell of
// the first row. The dam sits somewhere after DAM_ROW_OFFSET among rows that
// look alike; she is picked by `is_foaling_decade_id` on the linked horse id.
// That heuristic is weak: ids assigned under older conventions can defeat it.
// Keep it isolated here so it can be swapped without touching the scrapers.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use paddock_common::{HorseOverallStats, ParentProfile};

use crate::extract::{cells, clean_text, horse_id_from_href, select_all, select_first, Strategy};

/// Rows before this index never hold the dam.
pub const DAM_ROW_OFFSET: usize = 8;

static TALLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)-(\d+)-(\d+)-(\d+)\]").expect("valid regex"));
static STARTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)戦").expect("valid regex"));
static WINS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)勝").expect("valid regex"));

const EARNINGS_LABEL: &str = "獲得賞金";
const RECORD_LABEL: &str = "通算成績";

/// Name and id of a parent as linked from the blood table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentLink {
    pub name: String,
    pub id: String,
}

impl ParentLink {
    /// Profile with no stats yet. Stats come from a separate page.
    pub fn into_profile(self) -> ParentProfile {
        ParentProfile {
            name: self.name,
            id: self.id,
            ..ParentProfile::default()
        }
    }
}

/// Earnings and career tally from a horse's profile table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTally {
    pub earnings: String,
    pub first: u32,
    pub second: u32,
    pub third: u32,
    pub fourth_or_lower: u32,
}

impl ProfileTally {
    pub fn apply_to(self, profile: &mut ParentProfile) {
        profile.earnings = self.earnings;
        profile.first = self.first;
        profile.second = self.second;
        profile.third = self.third;
        profile.fourth_or_lower = self.fourth_or_lower;
    }
}

/// Horse ids registered in Japan start with the foaling year.
pub fn is_foaling_decade_id(id: &str) -> bool {
    id.len() >= 4
        && id.as_bytes()[..4].iter().all(u8::is_ascii_digit)
        && (id.starts_with("19") || id.starts_with("20"))
}

/// Sire and dam links from a pedigree page. Missing ones come back empty.
pub fn parse_parent_links(html: &str) -> (ParentLink, ParentLink) {
    let doc = Html::parse_document(html);
    let Some(table) = select_first(doc.root_element(), ".blood_table") else {
        return (ParentLink::default(), ParentLink::default());
    };
    let rows = select_all(table, "tr");

    let link_of = |a: scraper::ElementRef| ParentLink {
        name: clean_text(a),
        id: horse_id_from_href(a.value().attr("href").unwrap_or_default()),
    };

    let sire = rows
        .first()
        .and_then(|row| select_first(*row, "td a"))
        .map(link_of)
        .unwrap_or_default();

    let dam = rows
        .iter()
        .skip(DAM_ROW_OFFSET)
        .filter_map(|row| cells(*row).first().and_then(|td| select_first(*td, "a")))
        .map(link_of)
        .find(|link| is_foaling_decade_id(&link.id))
        .unwrap_or_default();

    (sire, dam)
}

/// (label, value) pairs of the `.db_prof_table`.
fn profile_rows(doc: &Html) -> Vec<(String, String)> {
    let Some(table) = select_first(doc.root_element(), ".db_prof_table") else {
        return Vec::new();
    };
    select_all(table, "tr")
        .into_iter()
        .filter_map(|row| {
            let label = crate::extract::extract_first(row, &[Strategy::Text("th")], "");
            let value = select_first(row, "td").map(clean_text)?;
            (!label.is_empty()).then_some((label, value))
        })
        .collect()
}

fn capture_u32(re: &Regex, text: &str) -> u32 {
    re.captures(text)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// Earnings and `[1st-2nd-3rd-other]` tally, matched by row label.
pub fn parse_profile_tally(html: &str) -> ProfileTally {
    let doc = Html::parse_document(html);
    let mut tally = ProfileTally::default();
    let mut seen_earnings = false;

    for (label, value) in profile_rows(&doc) {
        // Central earnings come first; later 地方 rows are ignored.
        if label.contains(EARNINGS_LABEL) && !seen_earnings {
            tally.earnings = value.clone();
            seen_earnings = true;
        }
        if label.contains(RECORD_LABEL) {
            if let Some(c) = TALLY_RE.captures(&value) {
                tally.first = c[1].parse().unwrap_or(0);
                tally.second = c[2].parse().unwrap_or(0);
                tally.third = c[3].parse().unwrap_or(0);
                tally.fourth_or_lower = c[4].parse().unwrap_or(0);
            }
        }
    }

    tally
}

/// Career summary (`N戦M勝 [..]`) from a profile page.
pub fn parse_overall_stats(html: &str, horse_id: &str) -> HorseOverallStats {
    let doc = Html::parse_document(html);
    let horse_name = crate::extract::extract_first(doc.root_element(), &[Strategy::Text(".horse_title h1")], "");

    let overall_record = profile_rows(&doc)
        .into_iter()
        .find(|(label, _)| label.contains(RECORD_LABEL))
        .map(|(_, value)| value)
        .unwrap_or_default();

    HorseOverallStats {
        horse_id: horse_id.to_string(),
        horse_name,
        wins: capture_u32(&WINS_RE, &overall_record),
        races: capture_u32(&STARTS_RE, &overall_record),
        overall_record,
    }
}
