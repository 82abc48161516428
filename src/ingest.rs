use std::time::Duration;

use tracing::debug;

use crate::db::{NewPost, Post};
use crate::error::StorageError;
use crate::store::{with_timeout, FeedStore};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created(Post),
    /// The URL was already stored; nothing was written.
    Duplicate,
}

/// Persist one post. The store's uniqueness constraint on the URL is the
/// only deduplication, so concurrent workers racing on the same URL end up
/// with one `Created` and any number of `Duplicate`s.
pub async fn save_post<S>(
    store: &S,
    post: NewPost,
    timeout: Duration,
) -> Result<SaveOutcome, StorageError>
where
    S: FeedStore + ?Sized,
{
    let url = post.url.clone();
    match with_timeout(timeout, store.save_post(post)).await {
        Ok(created) => Ok(SaveOutcome::Created(created)),
        Err(StorageError::Conflict(reason)) => {
            debug!(url = %url, reason = %reason, "post already known");
            Ok(SaveOutcome::Duplicate)
        }
        Err(err) => Err(err),
    }
}
