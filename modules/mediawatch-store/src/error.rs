/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("No front page stored for site {site_id}")]
    NoFrontPages { site_id: i64 },

    #[error("Stored timestamp '{0}' is not RFC 3339")]
    MalformedTimestamp(String),

    #[error("Stored vector for title {title_id} has {len} bytes, not a multiple of 4")]
    MalformedVector { title_id: i64, len: usize },
}
