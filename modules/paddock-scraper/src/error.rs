/// Result type alias for scraper operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Why a page could not be retrieved.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Server error (status {status}): {url}")]
    Server { status: u16, url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// 4xx. The identifier is presumed invalid or the resource gone.
    #[error("Client error (status {status}): {url}")]
    Client { status: u16, url: String },

    #[error("Failed to fetch {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Timeouts, 5xx and transport failures. These are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout { .. } | FetchError::Server { .. } | FetchError::Network { .. }
        )
    }

    /// 4xx responses. Never retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::Client { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url }
            | FetchError::Server { url, .. }
            | FetchError::Network { url, .. }
            | FetchError::Client { url, .. }
            | FetchError::Exhausted { url, .. } => url,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid {kind}: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// The card page came back without a single entry row.
    #[error("No race card for {race_id}")]
    RaceNotFound { race_id: String },

    /// Entry rows are listed but horse numbers are not assigned yet.
    #[error("Race {race_id} has {pending} entrants awaiting the post-position draw")]
    NotYetDrawn { race_id: String, pending: usize },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ScrapeError {
    /// Horse and jockey ids are path segments; reject anything that is not
    /// a plain alphanumeric token before it reaches a URL.
    pub fn check_identifier(kind: &'static str, value: &str) -> Result<()> {
        if !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(())
        } else {
            Err(ScrapeError::InvalidIdentifier {
                kind,
                value: value.to_string(),
            })
        }
    }
}
