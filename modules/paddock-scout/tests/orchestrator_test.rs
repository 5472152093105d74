//! Assembler end to end over MockPages and an in-memory cache.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use paddock_cache::{CacheStore, MemoryBackend};
use paddock_common::{
    CacheBackendKind, Config, HorseRaceHistory, PastResult, RaceCard, RaceEntrant, SubRecordKind, Surface,
    NO_HISTORY_DAYS,
};
use paddock_scout::{Assembler, AssemblyError, AssemblyOutcome};
use paddock_scraper::extract::{days_since, today_jst};
use paddock_scraper::testing::{exhausted, MockPages};
use paddock_scraper::ScrapeError;

const RACE: &str = "https://race.test";
const DB: &str = "https://db.test";
const RACE_ID: &str = "202305050811";

const RACE_LIST: &str = include_str!("../../paddock-scraper/tests/fixtures/race_list.html");
const RACE_CARD: &str = include_str!("../../paddock-scraper/tests/fixtures/race_card.html");
const RESULTS: &str = include_str!("../../paddock-scraper/tests/fixtures/horse_results.html");
const PEDIGREE: &str = include_str!("../../paddock-scraper/tests/fixtures/pedigree.html");
const PROFILE: &str = include_str!("../../paddock-scraper/tests/fixtures/parent_profile.html");
const JOCKEY: &str = include_str!("../../paddock-scraper/tests/fixtures/jockey.html");
const RACE_CARD_PREDRAW: &str = include_str!("../../paddock-scraper/tests/fixtures/race_card_predraw.html");

const ROOKIE_JOCKEY: &str = r#"<html><body>
<div class="db_head_name"><h1>新人 騎手</h1></div>
<table class="ResultsByYears"><tbody></tbody></table>
</body></html>"#;

const NO_RESULTS: &str = "<html><body><div class=\"horse_title\"><h1>デビュー前</h1></div></body></html>";

fn config(max_concurrent_entrants: usize) -> Config {
    Config {
        race_base_url: RACE.to_string(),
        db_base_url: DB.to_string(),
        cache_backend: CacheBackendKind::Memory,
        max_concurrent_entrants,
        ..Config::default()
    }
}

fn card_url(race_id: &str) -> String {
    format!("{RACE}/race/shutuba.html?race_id={race_id}")
}

fn results_url(horse_id: &str) -> String {
    format!("{DB}/horse/result/{horse_id}/")
}

fn pedigree_url(horse_id: &str) -> String {
    format!("{DB}/horse/ped/{horse_id}/")
}

fn jockey_url(jockey_id: &str) -> String {
    format!("{DB}/jockey/{jockey_id}/")
}

/// The fixture card resolves to three entrants:
/// #1 2019105219 with full data and jockey 01126,
/// #2 2019105283 whose pedigree page fails and whose jockey 05339 has no starts,
/// #3 2018105027 with no results yet and no jockey link.
fn race_pages() -> MockPages {
    let ped2 = pedigree_url("2019105283");
    MockPages::new()
        .on_page(&card_url(RACE_ID), RACE_CARD)
        .on_page(&results_url("2019105219"), RESULTS)
        .on_page(&pedigree_url("2019105219"), PEDIGREE)
        .on_page(&jockey_url("01126"), JOCKEY)
        .on_page(&results_url("2019105283"), RESULTS)
        .on_error(&ped2, exhausted(&ped2))
        .on_page(&jockey_url("05339"), ROOKIE_JOCKEY)
        .on_page(&results_url("2018105027"), NO_RESULTS)
        .on_page(&pedigree_url("2018105027"), PEDIGREE)
        .on_page(&format!("{DB}/horse/2012102013/"), PROFILE)
        .on_page(&format!("{DB}/horse/2005100097/"), PROFILE)
}

fn cache() -> CacheStore {
    CacheStore::new(Arc::new(MemoryBackend::new()), 604_800)
}

#[tokio::test]
async fn failed_sub_records_degrade_to_zero_values() {
    let assembler = Assembler::new(Arc::new(race_pages()), cache(), &config(4));

    let outcome = assembler.assemble(RACE_ID, None, &CancellationToken::new()).await.unwrap();
    assert!(outcome.is_complete());
    let dataset = outcome.into_dataset();

    assert_eq!(dataset.race_name, "ジャパンカップ");
    assert_eq!(dataset.track_surface, Surface::Turf);
    assert_eq!(dataset.distance_meters, 2400);
    let numbers: Vec<u32> = dataset.horses.iter().map(|h| h.entrant.horse_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    let first = &dataset.horses[0];
    assert_eq!(first.recent_results.len(), 10);
    assert_eq!(first.sire.name, "キタサンブラック");
    assert_eq!(first.sire.first, 12);
    assert_eq!(first.jockey_overall.wins, 2000);

    // Pedigree failed: zeroed parents, everything else still merged.
    let second = &dataset.horses[1];
    assert_eq!(second.sire.id, "");
    assert_eq!(second.sire.first, 0);
    assert!(second.dam.earnings.is_empty());
    assert_eq!(second.recent_results.len(), 10);
    // A jockey with no starts is a valid record with zero rates, not a failure.
    assert_eq!(second.jockey_overall.total_races, 0);
    assert_eq!(second.jockey_overall.win_rate, 0.0);
    assert_eq!(second.jockey_recent.show_rate, 0.0);

    let third = &dataset.horses[2];
    assert!(third.recent_results.is_empty());
    assert_eq!(third.days_since_last_race, NO_HISTORY_DAYS);
    assert_eq!(third.dam.id, "2005100097");

    let warnings: Vec<(u32, SubRecordKind)> = dataset.warnings.iter().map(|w| (w.horse_number, w.kind)).collect();
    assert_eq!(warnings, vec![(2, SubRecordKind::Pedigree), (3, SubRecordKind::Jockey)]);
}

#[tokio::test]
async fn second_run_is_served_from_cache() {
    let pages = Arc::new(race_pages());
    let assembler = Assembler::new(pages.clone(), cache(), &config(4));
    let cancel = CancellationToken::new();

    let first = assembler.assemble(RACE_ID, None, &cancel).await.unwrap();
    let second = assembler.assemble(RACE_ID, None, &cancel).await.unwrap();
    assert_eq!(first, second);

    assert_eq!(pages.request_count(&card_url(RACE_ID)), 1);
    assert_eq!(pages.request_count(&results_url("2019105219")), 1);
    assert_eq!(pages.request_count(&pedigree_url("2019105219")), 1);
    assert_eq!(pages.request_count(&jockey_url("01126")), 1);
    // Failures are never cached.
    assert_eq!(pages.request_count(&pedigree_url("2019105283")), 2);
}

#[tokio::test]
async fn pedigree_with_a_failed_parent_is_not_cached() {
    let dam = format!("{DB}/horse/2005100097/");
    let pages = Arc::new(
        MockPages::new()
            .on_page(&pedigree_url("2020100123"), PEDIGREE)
            .on_page(&format!("{DB}/horse/2012102013/"), PROFILE)
            .on_error(&dam, exhausted(&dam)),
    );
    let store = cache();
    let assembler = Assembler::new(pages.clone(), store.clone(), &config(4));

    let outcome = assembler.horse_parents("2020100123").await.unwrap();
    assert_eq!(outcome.failed.len(), 1);
    assert!(store.get_horse_parents("2020100123").await.is_none());

    assembler.horse_parents("2020100123").await.unwrap();
    assert_eq!(pages.request_count(&pedigree_url("2020100123")), 2);
}

#[tokio::test]
async fn track_hint_is_written_into_dataset_and_cached_card() {
    let store = cache();
    let assembler = Assembler::new(Arc::new(race_pages()), store.clone(), &config(4));

    let dataset = assembler
        .assemble(RACE_ID, Some("東京"), &CancellationToken::new())
        .await
        .unwrap()
        .into_dataset();
    assert_eq!(dataset.track_name.as_deref(), Some("東京"));

    let cached = store.get_race_card(RACE_ID).await.unwrap();
    assert_eq!(cached.track_name.as_deref(), Some("東京"));
}

#[tokio::test]
async fn horses_and_warnings_come_back_in_horse_number_order() {
    let entrant = |n: u32, horse_id: &str| RaceEntrant {
        horse_id: horse_id.to_string(),
        horse_name: format!("馬{n}"),
        jockey_id: format!("0{n}000"),
        jockey_name: String::new(),
        frame_number: n,
        horse_number: n,
    };
    let store = cache();
    store
        .set_race_card(&RaceCard {
            race_id: RACE_ID.to_string(),
            race_name: "テスト".to_string(),
            distance_meters: 1600,
            track_surface: Surface::Dirt,
            track_name: None,
            entrants: vec![entrant(3, "2020100003"), entrant(1, "2020100001"), entrant(2, "2020100002")],
        })
        .await;

    // Nothing registered: every sub-record 404s.
    let assembler = Assembler::new(Arc::new(MockPages::new()), store, &config(3));
    let dataset = assembler
        .assemble(RACE_ID, None, &CancellationToken::new())
        .await
        .unwrap()
        .into_dataset();

    let numbers: Vec<u32> = dataset.horses.iter().map(|h| h.entrant.horse_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    assert_eq!(dataset.warnings.len(), 9);
    assert!(dataset.warnings.windows(2).all(|w| w[0].horse_number <= w[1].horse_number));
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_the_entrants_resolved_so_far() {
    // One entrant at a time, 50ms per page. #1 needs card + pedigree + profiles,
    // so it lands at 150ms; #2 is still in flight at 175ms.
    let pages = race_pages().with_latency(Duration::from_millis(50));
    let assembler = Assembler::new(Arc::new(pages), cache(), &config(1));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(175)).await;
        trigger.cancel();
    });

    match assembler.assemble(RACE_ID, None, &cancel).await.unwrap() {
        AssemblyOutcome::Cancelled(partial) => {
            assert_eq!(partial.race_name, "ジャパンカップ");
            let numbers: Vec<u32> = partial.horses.iter().map(|h| h.entrant.horse_number).collect();
            assert_eq!(numbers, vec![1]);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_before_the_card_is_an_error() {
    let assembler = Assembler::new(Arc::new(race_pages()), cache(), &config(4));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = assembler.assemble(RACE_ID, None, &cancel).await;
    assert!(matches!(result, Err(AssemblyError::Cancelled)));
}

#[tokio::test]
async fn malformed_race_id_is_rejected_without_fetching() {
    let pages = Arc::new(MockPages::new());
    let assembler = Assembler::new(pages.clone(), cache(), &config(4));

    let result = assembler.assemble("2023-05-05", None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AssemblyError::InvalidRaceId(_))));
    assert!(pages.requests().is_empty());
}

#[tokio::test]
async fn missing_card_is_fatal() {
    let assembler = Assembler::new(Arc::new(MockPages::new()), cache(), &config(4));
    let result = assembler.assemble(RACE_ID, None, &CancellationToken::new()).await;
    assert!(matches!(result, Err(AssemblyError::RaceCard { .. })));
}

#[tokio::test]
async fn race_ids_are_filtered_by_venue_and_cached_when_found() {
    let list_url = format!("{RACE}/top/race_list_sub.html?kaisai_date=20231126");
    let pages = Arc::new(MockPages::new().on_page(&list_url, RACE_LIST));
    let assembler = Assembler::new(pages.clone(), cache(), &config(4));

    let kyoto = assembler.resolve_race_ids("20231126", "京都").await.unwrap();
    let ids: Vec<&str> = kyoto.iter().map(|r| r.race_id.as_str()).collect();
    assert_eq!(ids, vec!["202308050801", "202308050811"]);
    assembler.resolve_race_ids("20231126", "京都").await.unwrap();
    assert_eq!(pages.request_count(&list_url), 1);

    // An empty selection is not cached.
    assert!(assembler.resolve_race_ids("20231126", "中山").await.unwrap().is_empty());
    assert!(assembler.resolve_race_ids("20231126", "中山").await.unwrap().is_empty());
    assert_eq!(pages.request_count(&list_url), 3);
}

#[tokio::test]
async fn unknown_race_is_fatal_and_not_cached() {
    let unknown = "202399999999";
    let pages = Arc::new(MockPages::new().on_page(&card_url(unknown), "<html><body></body></html>"));
    let store = cache();
    let assembler = Assembler::new(pages.clone(), store.clone(), &config(4));

    let result = assembler.assemble(unknown, None, &CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(AssemblyError::RaceCard {
            source: ScrapeError::RaceNotFound { .. },
            ..
        })
    ));
    assert!(store.get_race_card(unknown).await.is_none());
}

#[tokio::test]
async fn card_before_the_draw_is_fatal_and_refetched_later() {
    let race_id = "202306050911";
    let pages = Arc::new(MockPages::new().on_page(&card_url(race_id), RACE_CARD_PREDRAW));
    let store = cache();
    let assembler = Assembler::new(pages.clone(), store.clone(), &config(4));

    for _ in 0..2 {
        let result = assembler.assemble(race_id, None, &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(AssemblyError::RaceCard {
                source: ScrapeError::NotYetDrawn { pending: 2, .. },
                ..
            })
        ));
    }
    assert!(store.get_race_card(race_id).await.is_none());
    assert_eq!(pages.request_count(&card_url(race_id)), 2);
}

#[tokio::test]
async fn stored_card_without_entrants_is_refetched() {
    let store = cache();
    store
        .set_race_card(&RaceCard {
            race_id: RACE_ID.to_string(),
            race_name: String::new(),
            distance_meters: 0,
            track_surface: Surface::Unknown,
            track_name: None,
            entrants: Vec::new(),
        })
        .await;
    let pages = Arc::new(race_pages());
    let assembler = Assembler::new(pages.clone(), store.clone(), &config(4));

    let card = assembler.race_card(RACE_ID, None).await.unwrap();
    assert_eq!(card.entrants.len(), 3);
    assert_eq!(pages.request_count(&card_url(RACE_ID)), 1);
    assert_eq!(store.get_race_card(RACE_ID).await.unwrap().entrants.len(), 3);
}

#[tokio::test]
async fn cached_history_days_are_recomputed_for_today() {
    let store = cache();
    store
        .set_horse_history(&HorseRaceHistory {
            horse_id: "2019105219".to_string(),
            horse_name: "リバティアイランド".to_string(),
            recent_results: vec![PastResult {
                date: "2023/11/26".to_string(),
                track: "5東京8".to_string(),
                distance: "芝2400".to_string(),
                position: 2,
                time: "2:21.8".to_string(),
                margin: "0.7".to_string(),
            }],
            // Value as of the day it was written.
            days_since_last_race: 5,
        })
        .await;
    let pages = Arc::new(MockPages::new());
    let assembler = Assembler::new(pages.clone(), store, &config(4));

    let history = assembler.horse_history("2019105219").await.unwrap();
    assert_eq!(history.days_since_last_race, days_since("2023/11/26", today_jst()));
    assert!(history.days_since_last_race > 5);
    assert!(pages.requests().is_empty());
}
