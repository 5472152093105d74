use paddock_scraper::ScrapeError;

/// Failures fatal to a whole assembly. Per-entrant sub-record failures are
/// never errors; they surface as `AssemblyWarning`s on the dataset.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Invalid race id: {0:?}")]
    InvalidRaceId(String),

    #[error("Race card {race_id} unavailable: {source}")]
    RaceCard {
        race_id: String,
        #[source]
        source: ScrapeError,
    },

    #[error("Race list for {date} unavailable: {source}")]
    RaceList {
        date: String,
        #[source]
        source: ScrapeError,
    },

    #[error("Cancelled before the race card was resolved")]
    Cancelled,
}
