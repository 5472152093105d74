pub mod encoding;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod horse;
pub mod jockey;
pub mod pedigree;
pub mod race;
pub mod rate_limit;
pub mod schema;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::{FetchError, Result, ScrapeError};
pub use fetcher::{FetchSettings, HttpFetcher, Page, PageSource};
pub use horse::{refresh_days_since, HorseScraper, PedigreeOutcome};
pub use jockey::JockeyScraper;
pub use race::{CardPage, RaceScraper};
pub use rate_limit::RateLimiter;
