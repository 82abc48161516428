//! In-memory collaborators for exercising the polling pipeline without a
//! database or network.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use bloggregator::db::{Feed, NewPost, Post};
use bloggregator::error::{FetchError, StorageError};
use bloggregator::scheduler::PollSettings;
use bloggregator::source::FeedSource;
use bloggregator::store::FeedStore;

pub fn settings(batch_size: i64) -> PollSettings {
    PollSettings {
        interval: Duration::from_secs(60),
        batch_size,
        fetch_timeout: Duration::from_secs(5),
        storage_timeout: Duration::from_secs(5),
    }
}

pub fn feed(id: i64, url: &str) -> Feed {
    Feed {
        id,
        name: format!("Feed {}", id),
        url: url.to_string(),
        user_id: 1,
        last_fetched_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// An RSS document with one `<item>` per `(link, pubDate)` pair.
pub fn rss(items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(link, pub_date)| {
            format!(
                "<item><title>Title of {0}</title><link>{0}</link>\
                 <description>About {0}</description><pubDate>{1}</pubDate></item>",
                link, pub_date
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test</title><link>https://test.example</link><description>Test feed</description>{}</channel></rss>"#,
        items
    )
}

/// Feeds whose fetch has started but whose poll has not been recorded yet.
#[derive(Default)]
pub struct InFlight(AtomicUsize);

impl InFlight {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub enum Reply {
    Body(String),
    Fail(u16),
    /// The fetch panics, taking its worker down with it.
    Panic,
}

/// Serves canned payloads per URL, optionally after a delay.
pub struct ScriptedSource {
    replies: HashMap<String, (Reply, Duration)>,
    fetches: AtomicUsize,
    in_flight: Arc<InFlight>,
}

impl ScriptedSource {
    pub fn new(in_flight: Arc<InFlight>) -> Self {
        Self {
            replies: HashMap::new(),
            fetches: AtomicUsize::new(0),
            in_flight,
        }
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), (reply, Duration::ZERO));
        self
    }

    pub fn reply_after(mut self, url: &str, reply: Reply, delay: Duration) -> Self {
        self.replies.insert(url.to_string(), (reply, delay));
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.in_flight.0.fetch_add(1, Ordering::SeqCst);

        let (reply, delay) = self
            .replies
            .get(url)
            .cloned()
            .unwrap_or((Reply::Fail(404), Duration::ZERO));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Reply::Body(body) => Ok(body.into_bytes()),
            Reply::Fail(status) => Err(FetchError::Status(status)),
            Reply::Panic => panic!("source blew up fetching {}", url),
        }
    }
}

#[derive(Default)]
struct State {
    feeds: Vec<Feed>,
    posts: HashMap<String, Post>,
    next_post_id: i64,
    next_feeds_calls: usize,
    busy_at_schedule: Vec<usize>,
    marks: Vec<(i64, DateTime<Utc>)>,
    saves: Vec<String>,
}

/// A thread-safe store that records every call made to it.
pub struct MemoryStore {
    state: Mutex<State>,
    in_flight: Arc<InFlight>,
    pub fail_next_feeds: AtomicBool,
    pub fail_mark: AtomicBool,
    save_delay: Mutex<Duration>,
}

impl MemoryStore {
    pub fn new(feeds: Vec<Feed>, in_flight: Arc<InFlight>) -> Self {
        Self {
            state: Mutex::new(State {
                feeds,
                ..Default::default()
            }),
            in_flight,
            fail_next_feeds: AtomicBool::new(false),
            fail_mark: AtomicBool::new(false),
            save_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_save_delay(&self, delay: Duration) {
        *self.save_delay.lock().unwrap() = delay;
    }

    pub fn next_feeds_calls(&self) -> usize {
        self.state.lock().unwrap().next_feeds_calls
    }

    /// How many workers were still running each time a batch was requested.
    pub fn busy_at_schedule(&self) -> Vec<usize> {
        self.state.lock().unwrap().busy_at_schedule.clone()
    }

    pub fn marks(&self) -> Vec<(i64, DateTime<Utc>)> {
        self.state.lock().unwrap().marks.clone()
    }

    pub fn marks_for(&self, feed_id: i64) -> usize {
        self.marks().iter().filter(|(id, _)| *id == feed_id).count()
    }

    pub fn saves(&self) -> Vec<String> {
        self.state.lock().unwrap().saves.clone()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().unwrap().posts.values().cloned().collect()
    }

    pub fn feed(&self, feed_id: i64) -> Option<Feed> {
        let state = self.state.lock().unwrap();
        state.feeds.iter().find(|f| f.id == feed_id).cloned()
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn get_next_feeds(&self, limit: i64) -> Result<Vec<Feed>, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.next_feeds_calls += 1;
        state.busy_at_schedule.push(self.in_flight.get());

        if self.fail_next_feeds.load(Ordering::SeqCst) {
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut due = state.feeds.clone();
        due.sort_by_key(|f| (f.last_fetched_at.is_some(), f.last_fetched_at, f.id));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Feed, StorageError> {
        let mut state = self.state.lock().unwrap();
        state.marks.push((feed_id, at));
        // Pair with the increment in ScriptedSource::fetch.
        self.in_flight.0.fetch_sub(1, Ordering::SeqCst);

        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(StorageError::Database(sqlx::Error::PoolClosed));
        }

        let feed = state
            .feeds
            .iter_mut()
            .find(|f| f.id == feed_id)
            .ok_or(StorageError::NotFound)?;
        if feed.last_fetched_at.map_or(true, |prev| prev < at) {
            feed.last_fetched_at = Some(at);
        }
        feed.updated_at = Utc::now();
        Ok(feed.clone())
    }

    async fn save_post(&self, post: NewPost) -> Result<Post, StorageError> {
        let delay = *self.save_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.saves.push(post.url.clone());

        if state.posts.contains_key(&post.url) {
            return Err(StorageError::Conflict(format!("posts.url = {}", post.url)));
        }

        state.next_post_id += 1;
        let now = Utc::now();
        let created = Post {
            id: state.next_post_id,
            url: post.url.clone(),
            title: post.title,
            description: post.description,
            published_at: post.published_at,
            feed_id: post.feed_id,
            created_at: now,
            updated_at: now,
        };
        state.posts.insert(post.url, created.clone());
        Ok(created)
    }
}
