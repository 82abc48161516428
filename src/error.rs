use thiserror::Error;

/// Failures reported by a [`FeedStore`](crate::store::FeedStore) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected the write. For posts this means the
    /// URL is already known.
    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("record not found")]
    NotFound,

    #[error("storage call timed out")]
    Timeout,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("fetch timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("expected <rss> root element, found <{0}>")]
    Root(String),

    #[error("invalid RSS document: {0}")]
    Rss(#[from] rss::Error),
}

#[derive(Debug, Error)]
pub enum PubDateError {
    #[error("{0:?} does not match Mon, 02 Jan 2006 15:04:05 -0700")]
    Layout(String),

    #[error(transparent)]
    Parse(#[from] chrono::ParseError),
}
