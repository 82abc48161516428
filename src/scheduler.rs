use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::fault::{log_and_continue, Context, Failure};
use crate::source::FeedSource;
use crate::store::{with_timeout, FeedStore};
use crate::worker::{self, FeedReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Maximum number of feeds polled concurrently per tick.
    pub batch_size: i64,
    pub fetch_timeout: Duration,
    pub storage_timeout: Duration,
}

/// Totals for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub feeds: usize,
    pub created: usize,
    pub duplicates: usize,
    /// Workers that panicked before finishing. Their feeds are left
    /// unmarked for this tick and stay due, so the next tick retries them.
    pub crashed: usize,
}

impl BatchReport {
    fn absorb(&mut self, feed: FeedReport) {
        self.created += feed.created;
        self.duplicates += feed.duplicates;
    }
}

/// Run one tick: take the next batch from storage, poll every feed in it
/// concurrently and wait for all of them.
pub async fn poll_once<F, S>(settings: &PollSettings, source: &Arc<F>, store: &Arc<S>) -> BatchReport
where
    F: FeedSource + ?Sized + 'static,
    S: FeedStore + ?Sized + 'static,
{
    let feeds = match with_timeout(
        settings.storage_timeout,
        store.get_next_feeds(settings.batch_size),
    )
    .await
    {
        Ok(feeds) => feeds,
        Err(err) => {
            log_and_continue(Failure::Schedule, &Context::none(), &err);
            Vec::new()
        }
    };

    if feeds.is_empty() {
        debug!("no feeds due");
        return BatchReport::default();
    }

    let mut report = BatchReport {
        feeds: feeds.len(),
        ..Default::default()
    };
    info!(feeds = report.feeds, "polling batch");

    let mut workers = JoinSet::new();
    for feed in feeds {
        let source = Arc::clone(source);
        let store = Arc::clone(store);
        let settings = *settings;
        workers.spawn(async move {
            worker::fetch_feed(feed, source.as_ref(), store.as_ref(), &settings).await
        });
    }

    // Join barrier: the next tick may not query storage until every worker
    // of this batch is done.
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(feed_report) => report.absorb(feed_report),
            Err(err) => {
                report.crashed += 1;
                log_and_continue(Failure::Worker, &Context::none(), &err);
            }
        }
    }

    report
}

/// Poll forever, one batch per tick.
///
/// At most one batch is in flight. Ticks that elapse while a batch drains
/// are not queued: they collapse into a single tick that fires as soon as
/// the batch is joined, so sustained slow I/O lowers the effective polling
/// rate.
pub async fn run<F, S>(settings: PollSettings, source: Arc<F>, store: Arc<S>)
where
    F: FeedSource + ?Sized + 'static,
    S: FeedStore + ?Sized + 'static,
{
    info!(
        interval_secs = settings.interval.as_secs_f64(),
        batch_size = settings.batch_size,
        "starting feed poller"
    );

    let mut timer = tokio::time::interval(settings.interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        timer.tick().await;

        let started = Instant::now();
        let report = poll_once(&settings, &source, &store).await;
        let elapsed = started.elapsed();

        if report.feeds > 0 {
            info!(
                feeds = report.feeds,
                created = report.created,
                duplicates = report.duplicates,
                elapsed_ms = elapsed.as_millis() as u64,
                "batch complete"
            );
        }
        if elapsed > settings.interval {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = settings.interval.as_millis() as u64,
                "batch outlasted the poll interval, missed ticks are not replayed"
            );
        }
    }
}
