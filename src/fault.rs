//! Fault isolation for the polling pipeline.
//!
//! Every recoverable failure is recorded here and control goes back to the
//! caller, which carries on with the next item, feed or tick.

use std::fmt;

use tracing::{error, warn};

use crate::db::Feed;

/// Where in the pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Asking storage for the next batch.
    Schedule,
    /// Downloading the feed body.
    Fetch,
    /// Decoding the body as RSS.
    Decode,
    /// An item's `pubDate` did not match the accepted layout.
    PubDate,
    /// An item had no link to key the post on.
    MissingLink,
    /// Saving a post failed for a reason other than a duplicate URL.
    Persist,
    /// Recording the poll attempt on the feed.
    MarkFetched,
    /// A worker task panicked or was cancelled.
    Worker,
}

impl Failure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Failure::Schedule => "schedule",
            Failure::Fetch => "fetch",
            Failure::Decode => "decode",
            Failure::PubDate => "pub_date",
            Failure::MissingLink => "missing_link",
            Failure::Persist => "persist",
            Failure::MarkFetched => "mark_fetched",
            Failure::Worker => "worker",
        }
    }

    /// Item-level problems are expected in the wild and only warn.
    fn is_item_level(&self) -> bool {
        matches!(self, Failure::PubDate | Failure::MissingLink)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers attached to a failure record.
#[derive(Debug, Default, Clone, Copy)]
pub struct Context<'a> {
    pub feed_id: Option<i64>,
    pub feed_url: Option<&'a str>,
    pub item: Option<&'a str>,
}

impl<'a> Context<'a> {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn feed(feed: &'a Feed) -> Self {
        Self {
            feed_id: Some(feed.id),
            feed_url: Some(&feed.url),
            item: None,
        }
    }

    pub fn with_item(mut self, item: &'a str) -> Self {
        self.item = Some(item);
        self
    }
}

pub fn log_and_continue(stage: Failure, ctx: &Context<'_>, err: &dyn fmt::Display) {
    if stage.is_item_level() {
        warn!(
            stage = stage.as_str(),
            feed_id = ctx.feed_id,
            feed_url = ctx.feed_url,
            item = ctx.item,
            error = %err,
            "skipping feed item"
        );
    } else {
        error!(
            stage = stage.as_str(),
            feed_id = ctx.feed_id,
            feed_url = ctx.feed_url,
            item = ctx.item,
            error = %err,
            "polling step failed"
        );
    }
}
