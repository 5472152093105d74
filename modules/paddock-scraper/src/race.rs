// Race listing and race card scraping.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::Html;
use tracing::{info, warn};

use paddock_common::{is_valid_race_date, is_valid_race_id, race_number, RaceCard, RaceEntrant, RaceSummary};

use crate::error::{Result, ScrapeError};
use crate::extract::{
    clean_text, extract_first, horse_id_from_href, jockey_id_from_href, parse_count, parse_distance,
    race_id_from_href, select_all, select_first, Strategy,
};
use crate::fetcher::PageSource;

pub struct RaceScraper {
    source: Arc<dyn PageSource>,
    base_url: String,
}

impl RaceScraper {
    pub fn new(source: Arc<dyn PageSource>, base_url: impl Into<String>) -> Self {
        Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn race_list_url(&self, date: &str) -> String {
        format!("{}/top/race_list_sub.html?kaisai_date={date}", self.base_url)
    }

    pub fn race_card_url(&self, race_id: &str) -> String {
        format!("{}/race/shutuba.html?race_id={race_id}", self.base_url)
    }

    /// Every race held on `date` (`YYYYMMDD`), grouped by venue in page order.
    pub async fn list_by_date(&self, date: &str) -> Result<Vec<RaceSummary>> {
        if !is_valid_race_date(date) {
            return Err(ScrapeError::InvalidIdentifier {
                kind: "race date",
                value: date.to_string(),
            });
        }

        let page = self.source.fetch(&self.race_list_url(date)).await?;
        let races = parse_race_list(&page.html);
        info!(date, races = races.len(), "Fetched race list");
        Ok(races)
    }

    /// Race id of the `race_number`th race at the venue whose name contains
    /// `track_name`, if one is listed on `date`.
    pub async fn find_race_id(&self, date: &str, track_name: &str, race_number: u32) -> Result<Option<String>> {
        let races = self.list_by_date(date).await?;
        Ok(races
            .into_iter()
            .find(|r| r.track_name.contains(track_name) && r.race_number == race_number)
            .map(|r| r.race_id))
    }

    /// Entry table for one race.
    pub async fn fetch_card(&self, race_id: &str) -> Result<RaceCard> {
        if !is_valid_race_id(race_id) {
            return Err(ScrapeError::InvalidIdentifier {
                kind: "race id",
                value: race_id.to_string(),
            });
        }

        let page = self.source.fetch(&self.race_card_url(race_id)).await?;
        let CardPage { card, undrawn } = parse_race_card(&page.html, race_id);
        if card.entrants.is_empty() {
            return Err(if undrawn > 0 {
                ScrapeError::NotYetDrawn {
                    race_id: race_id.to_string(),
                    pending: undrawn,
                }
            } else {
                ScrapeError::RaceNotFound {
                    race_id: race_id.to_string(),
                }
            });
        }
        info!(
            race_id,
            race_name = %card.race_name,
            entrants = card.entrants.len(),
            "Fetched race card"
        );
        Ok(card)
    }
}

/// Parse a per-date race listing. Items whose link has no valid race id are
/// skipped.
pub fn parse_race_list(html: &str) -> Vec<RaceSummary> {
    let doc = Html::parse_document(html);
    let mut races = Vec::new();

    for section in select_all(doc.root_element(), ".RaceList_DataList") {
        let track_name = extract_first(section, &[Strategy::Text("dt.RaceList_DataHeader .RaceList_DataTitle")], "");

        for item in select_all(section, "li.RaceList_DataItem") {
            let Some(href) = select_first(item, "a").and_then(|a| a.value().attr("href")) else {
                continue;
            };
            let Some(race_id) = race_id_from_href(href) else {
                continue;
            };
            let Some(number) = race_number(&race_id) else {
                continue;
            };

            races.push(RaceSummary {
                race_name: extract_first(item, &[Strategy::Text(".RaceList_ItemTitle .ItemTitle")], ""),
                track_name: track_name.clone(),
                race_number: number,
                race_id,
            });
        }
    }

    races
}

/// A parsed card plus the entry rows whose horse number is still blank.
#[derive(Debug, Clone)]
pub struct CardPage {
    pub card: RaceCard,
    pub undrawn: usize,
}

/// Parse a race card. Header rows, rows without both number cells, rows
/// without a horse link, and rows repeating a horse number are dropped.
/// Rows with a blank horse number are dropped and counted in `undrawn`.
pub fn parse_race_card(html: &str, race_id: &str) -> CardPage {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let race_name = extract_first(root, &[Strategy::Text(".RaceName")], "");
    let distance_text = extract_first(root, &[Strategy::Text(".RaceData01 span")], "");
    let (track_surface, distance_meters) = parse_distance(&distance_text);

    let mut seen = HashSet::new();
    let mut entrants = Vec::new();
    let mut undrawn = 0;

    for row in select_all(root, "tr.HorseList") {
        if select_first(row, "th").is_some() {
            continue;
        }
        let (Some(frame), Some(number)) = (
            select_first(row, r#"td[class^="Waku"]"#),
            select_first(row, r#"td[class^="Umaban"]"#),
        ) else {
            continue;
        };
        let Some(horse_link) = select_first(row, ".HorseInfo a") else {
            continue;
        };

        let number_text = clean_text(number);
        if number_text.is_empty() {
            undrawn += 1;
            continue;
        }
        let horse_number = parse_count(&number_text);
        if horse_number == 0 || !seen.insert(horse_number) {
            warn!(race_id, horse_number, "Dropping entrant with missing or duplicate horse number");
            continue;
        }

        let (jockey_name, jockey_id) = match select_first(row, ".Jockey a") {
            Some(a) => (clean_text(a), jockey_id_from_href(a.value().attr("href").unwrap_or_default())),
            None => (String::new(), String::new()),
        };

        entrants.push(RaceEntrant {
            horse_id: horse_id_from_href(horse_link.value().attr("href").unwrap_or_default()),
            horse_name: clean_text(horse_link),
            jockey_id,
            jockey_name,
            frame_number: parse_count(&clean_text(frame)),
            horse_number,
        });
    }

    if undrawn > 0 {
        warn!(race_id, undrawn, drawn = entrants.len(), "Entry rows without a horse number");
    }

    CardPage {
        card: RaceCard {
            race_id: race_id.to_string(),
            race_name,
            distance_meters,
            track_surface,
            track_name: None,
            entrants,
        },
        undrawn,
    }
}

#[cfg(test)]
mod tests {
    use paddock_common::Surface;

    use super::*;

    const RACE_LIST: &str = include_str!("../tests/fixtures/race_list.html");
    const RACE_CARD: &str = include_str!("../tests/fixtures/race_card.html");

    #[test]
    fn race_list_groups_by_venue() {
        let races = parse_race_list(RACE_LIST);
        assert_eq!(races.len(), 4);
        assert_eq!(races[0].race_id, "202305050801");
        assert_eq!(races[0].track_name, "5回東京8日目");
        assert_eq!(races[0].race_number, 1);
        assert_eq!(races[0].race_name, "2歳未勝利");
        assert!(races[2].track_name.contains("京都"));
        assert_eq!(races[3].race_number, 11);
    }

    #[test]
    fn race_list_number_comes_from_id() {
        for race in parse_race_list(RACE_LIST) {
            assert_eq!(race.race_number, race.race_id[10..].parse::<u32>().unwrap());
        }
    }

    #[test]
    fn race_list_skips_items_without_valid_id() {
        let html = r#"<div class="RaceList_DataList">
            <dt class="RaceList_DataHeader"><p class="RaceList_DataTitle">中山</p></dt>
            <li class="RaceList_DataItem"><a href="/race/movie.html">movie</a></li>
            <li class="RaceList_DataItem"><span>no link</span></li>
        </div>"#;
        assert!(parse_race_list(html).is_empty());
    }

    #[test]
    fn race_card_metadata() {
        let card = parse_race_card(RACE_CARD, "202305050811").card;
        assert_eq!(card.race_name, "ジャパンカップ");
        assert_eq!(card.track_surface, Surface::Turf);
        assert_eq!(card.distance_meters, 2400);
        assert_eq!(card.track_name, None);
    }

    #[test]
    fn race_card_entrants_keep_page_order() {
        let card = parse_race_card(RACE_CARD, "202305050811").card;
        let numbers: Vec<u32> = card.entrants.iter().map(|e| e.horse_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let first = &card.entrants[0];
        assert_eq!(first.horse_id, "2019105219");
        assert_eq!(first.horse_name, "リバティアイランド");
        assert_eq!(first.jockey_id, "01126");
        assert_eq!(first.jockey_name, "川田");
        assert_eq!(first.frame_number, 1);
    }

    #[test]
    fn race_card_drops_malformed_rows() {
        // The fixture also carries a header row, a row without an Umaban cell,
        // and a row repeating horse number 2.
        let card = parse_race_card(RACE_CARD, "202305050811").card;
        assert_eq!(card.entrants.len(), 3);
    }

    #[test]
    fn race_card_entrant_without_jockey_link() {
        let card = parse_race_card(RACE_CARD, "202305050811").card;
        let third = &card.entrants[2];
        assert_eq!(third.jockey_id, "");
        assert_eq!(third.jockey_name, "");
    }

    #[test]
    fn empty_page_yields_empty_card() {
        let page = parse_race_card("<html></html>", "202305050811");
        assert_eq!(page.undrawn, 0);
        let card = page.card;
        assert_eq!(card.race_name, "");
        assert_eq!(card.track_surface, Surface::Unknown);
        assert_eq!(card.distance_meters, 0);
        assert!(card.entrants.is_empty());
    }

    #[test]
    fn blank_horse_numbers_count_as_undrawn() {
        let html = r#"<h1 class="RaceName">有馬記念</h1>
        <table><tbody>
        <tr class="HorseList"><td class="Waku Txt_C"></td><td class="Umaban Txt_C"></td>
            <td class="HorseInfo"><a href="https://db.netkeiba.com/horse/2020105001">A</a></td></tr>
        <tr class="HorseList"><td class="Waku Txt_C"></td><td class="Umaban Txt_C"> </td>
            <td class="HorseInfo"><a href="https://db.netkeiba.com/horse/2020105002">B</a></td></tr>
        </tbody></table>"#;
        let page = parse_race_card(html, "202306050911");
        assert!(page.card.entrants.is_empty());
        assert_eq!(page.undrawn, 2);
    }
}
