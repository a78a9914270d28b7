use chrono::{DateTime, Utc};

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("No capture available yet for the requested instant {requested}")]
    NotYetAvailable { requested: DateTime<Utc> },

    #[error("Back-off after a recent '{gate}' error, retry in {remaining_secs}s")]
    Backoff {
        gate: &'static str,
        remaining_secs: i64,
    },

    #[error("Archive replied 429 Too Many Requests for {url}")]
    RateLimited { url: String },

    #[error("Archive replied {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Malformed CDX line: {0}")]
    CdxFormat(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ArchiveError {
    /// Whether this error updates a back-off gate (spec: TransientArchive).
    pub fn is_transient(&self) -> bool {
        match self {
            ArchiveError::RateLimited { .. } | ArchiveError::Backoff { .. } => true,
            ArchiveError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
