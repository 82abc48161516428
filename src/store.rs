use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::{Feed, NewPost, Post};
use crate::error::StorageError;

/// The storage capabilities the polling pipeline depends on.
///
/// Implementations must be safe for concurrent use: every worker in a batch
/// calls into the same store. Uniqueness of `Post.url` is arbitrated here,
/// and a violation must be reported as [`StorageError::Conflict`].
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` feeds that are due for a refresh, in the order they
    /// should be fetched.
    async fn get_next_feeds(&self, limit: i64) -> Result<Vec<Feed>, StorageError>;

    /// Record a poll attempt. Safe to call repeatedly.
    async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Feed, StorageError>;

    async fn save_post(&self, post: NewPost) -> Result<Post, StorageError>;
}

/// Bound a storage call so one stuck query cannot hold up a whole batch.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout),
    }
}
