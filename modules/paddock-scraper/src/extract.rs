// Field extractors.
//
// Pure functions over a parsed document or a row within it. Absence is data:
// nothing here returns an error, every miss resolves to a default or sentinel.

use std::sync::LazyLock;

use chrono::{FixedOffset, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;

use paddock_common::{Surface, NO_HISTORY_DAYS, UNPARSED_POSITION};

const JST_OFFSET_SECS: i32 = 9 * 3600;

static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));
static RACE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"race_id=(\d+)").expect("valid regex"));

static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("valid selector"));

/// One way of pulling a value out of an element.
#[derive(Debug, Clone, Copy)]
pub enum Strategy<'a> {
    /// Text of the first descendant matching a CSS selector.
    Text(&'a str),
    /// Attribute of the first descendant matching a CSS selector.
    Attr(&'a str, &'a str),
    /// Text of the nth `td` cell.
    Column(usize),
    /// Text of the first match of a selector inside the nth `td` cell.
    ColumnSelect(usize, &'a str),
}

/// Parse a CSS selector. Malformed selectors are logged and treated as
/// matching nothing.
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!(css, error = %e, "Unparseable selector");
            None
        }
    }
}

/// Text content with each text node trimmed and concatenated.
pub fn clean_text(el: ElementRef) -> String {
    el.text().map(str::trim).collect()
}

/// First descendant of `scope` matching `css`.
pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    scope.select(&sel).next()
}

/// All descendants of `scope` matching `css`.
pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// The `td` cells of a row.
pub fn cells(row: ElementRef) -> Vec<ElementRef> {
    row.select(&TD).collect()
}

fn apply(scope: ElementRef, strategy: &Strategy) -> Option<String> {
    let value = match *strategy {
        Strategy::Text(css) => clean_text(select_first(scope, css)?),
        Strategy::Attr(css, attr) => select_first(scope, css)?.value().attr(attr)?.trim().to_string(),
        Strategy::Column(i) => clean_text(scope.select(&TD).nth(i)?),
        Strategy::ColumnSelect(i, css) => clean_text(select_first(scope.select(&TD).nth(i)?, css)?),
    };
    (!value.is_empty()).then_some(value)
}

/// Return the first strategy's non-empty result, or `default`.
pub fn extract_first(scope: ElementRef, strategies: &[Strategy], default: &str) -> String {
    strategies
        .iter()
        .find_map(|s| apply(scope, s))
        .unwrap_or_else(|| default.to_string())
}

// --- Numbers ---

/// Keep only digits, accepting full-width ones. Separators and suffixes drop out.
fn digits_only(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            '0'..='9' => Some(c),
            '０'..='９' => char::from_u32(c as u32 - '０' as u32 + '0' as u32),
            _ => None,
        })
        .collect()
}

/// Count-like integer. `"1,234"` → 1234, garbage → 0.
pub fn parse_count(s: &str) -> u32 {
    digits_only(s).parse().unwrap_or(0)
}

/// Finish position. Anything without digits (取消, 中止, blank) is
/// [`UNPARSED_POSITION`].
pub fn parse_position(s: &str) -> u32 {
    digits_only(s).parse().unwrap_or(UNPARSED_POSITION)
}

/// Percentage text with an optional ASCII or full-width percent sign.
pub fn parse_percentage(s: &str) -> f64 {
    let cleaned: String = s.chars().filter(|c| !matches!(c, '%' | '％')).collect();
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Split a compound distance such as `ダ1500` or `芝2000m` into surface and
/// meters. Jump is checked first since jump courses also name their turf.
pub fn parse_distance(s: &str) -> (Surface, u32) {
    let surface = if s.contains('障') {
        Surface::Jump
    } else if s.contains('芝') {
        Surface::Turf
    } else if s.contains('ダ') {
        Surface::Dirt
    } else {
        Surface::Unknown
    };
    let meters = DIGIT_RUN_RE
        .find(s)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    (surface, meters)
}

// --- Dates ---

/// `YYYY/MM/DD`, also accepting `.` or `-` separators.
pub fn parse_race_date(s: &str) -> Option<NaiveDate> {
    let normalized = s.trim().replace(['.', '-'], "/");
    NaiveDate::parse_from_str(&normalized, "%Y/%m/%d").ok()
}

/// Whole days from `date` to `today`, or [`NO_HISTORY_DAYS`] when the date
/// does not parse.
pub fn days_since(date: &str, today: NaiveDate) -> i64 {
    match parse_race_date(date) {
        Some(d) => (today - d).num_days(),
        None => NO_HISTORY_DAYS,
    }
}

/// Today's date on the source site's calendar (JST).
pub fn today_jst() -> NaiveDate {
    let now = Utc::now();
    match FixedOffset::east_opt(JST_OFFSET_SECS) {
        Some(jst) => now.with_timezone(&jst).date_naive(),
        None => now.date_naive(),
    }
}

// --- Identifiers in links ---

/// 12-digit race id from a `...?race_id=202305040101&...` link.
pub fn race_id_from_href(href: &str) -> Option<String> {
    let caps = RACE_ID_RE.captures(href)?;
    let id = &caps[1];
    paddock_common::is_valid_race_id(id).then(|| id.to_string())
}

/// Horse id from `/horse/2019104567/`, also the `/horse/ped/` and
/// `/horse/result/` forms.
pub fn horse_id_from_href(href: &str) -> String {
    let mut parts = href.trim_matches('/').split(['/', '?', '#']).skip_while(|p| *p != "horse");
    parts.next();
    parts
        .find(|p| !p.is_empty() && *p != "ped" && *p != "result")
        .unwrap_or_default()
        .to_string()
}

/// Jockey id: the last all-digit path segment after `jockey`, e.g.
/// `/jockey/result/recent/01167/`.
pub fn jockey_id_from_href(href: &str) -> String {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    path.trim_matches('/')
        .split('/')
        .skip_while(|p| *p != "jockey")
        .skip(1)
        .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
        .last()
        .unwrap_or_default()
        .to_string()
}
