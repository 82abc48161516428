use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::db::{Feed, NewPost};
use crate::error::{DecodeError, FetchError};
use crate::fault::{log_and_continue, Context, Failure};
use crate::ingest::{self, SaveOutcome};
use crate::reader::{self, RawFeedItem, RssChannel};
use crate::scheduler::PollSettings;
use crate::source::FeedSource;
use crate::store::{with_timeout, FeedStore};

/// What happened while polling a single feed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedReport {
    /// The body was fetched and decoded.
    pub loaded: bool,
    pub created: usize,
    pub duplicates: usize,
    /// Items dropped before reaching storage.
    pub skipped: usize,
    /// Items storage refused for a reason other than a duplicate URL.
    pub failed: usize,
    /// The poll attempt was recorded on the feed.
    pub marked: bool,
}

#[derive(Debug, Error)]
enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl LoadError {
    fn stage(&self) -> Failure {
        match self {
            LoadError::Fetch(_) => Failure::Fetch,
            LoadError::Decode(_) => Failure::Decode,
        }
    }
}

async fn load_channel<F>(
    url: &str,
    source: &F,
    settings: &PollSettings,
) -> Result<RssChannel, LoadError>
where
    F: FeedSource + ?Sized,
{
    let body = match tokio::time::timeout(settings.fetch_timeout, source.fetch(url)).await {
        Ok(body) => body?,
        Err(_) => return Err(FetchError::Timeout.into()),
    };
    Ok(reader::decode(&body)?)
}

/// Poll one feed: fetch, decode, store new posts, then record the attempt.
///
/// The attempt is recorded exactly once whatever happened before it, so a
/// broken feed moves to the back of the queue instead of being retried
/// immediately. Failures are logged, never returned.
pub async fn fetch_feed<F, S>(
    feed: Feed,
    source: &F,
    store: &S,
    settings: &PollSettings,
) -> FeedReport
where
    F: FeedSource + ?Sized,
    S: FeedStore + ?Sized,
{
    let ctx = Context::feed(&feed);
    let mut report = FeedReport::default();

    match load_channel(&feed.url, source, settings).await {
        Ok(channel) => {
            report.loaded = true;
            for item in &channel.items {
                ingest_item(&feed, item, store, settings, &mut report).await;
            }
        }
        Err(err) => log_and_continue(err.stage(), &ctx, &err),
    }

    let marked = with_timeout(
        settings.storage_timeout,
        store.mark_feed_fetched(feed.id, Utc::now()),
    )
    .await;
    match marked {
        Ok(_) => report.marked = true,
        Err(err) => log_and_continue(Failure::MarkFetched, &ctx, &err),
    }

    info!(
        feed_id = feed.id,
        feed = %feed.name,
        created = report.created,
        duplicates = report.duplicates,
        skipped = report.skipped,
        failed = report.failed,
        "feed polled"
    );
    report
}

async fn ingest_item<S>(
    feed: &Feed,
    item: &RawFeedItem,
    store: &S,
    settings: &PollSettings,
    report: &mut FeedReport,
) where
    S: FeedStore + ?Sized,
{
    let ctx = Context::feed(feed);

    let published_at = match reader::parse_pub_date(&item.pub_date) {
        Ok(published_at) => published_at,
        Err(err) => {
            report.skipped += 1;
            let item_id = if item.link.is_empty() { &item.title } else { &item.link };
            log_and_continue(Failure::PubDate, &ctx.with_item(item_id), &err);
            return;
        }
    };

    if item.link.is_empty() {
        report.skipped += 1;
        log_and_continue(
            Failure::MissingLink,
            &ctx.with_item(&item.title),
            &"item has no <link>",
        );
        return;
    }

    let post = NewPost::new(
        &item.link,
        &item.title,
        &item.description,
        published_at,
        feed.id,
    );
    match ingest::save_post(store, post, settings.storage_timeout).await {
        Ok(SaveOutcome::Created(_)) => report.created += 1,
        Ok(SaveOutcome::Duplicate) => report.duplicates += 1,
        Err(err) => {
            report.failed += 1;
            log_and_continue(Failure::Persist, &ctx.with_item(&item.link), &err);
        }
    }
}
