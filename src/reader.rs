//! RSS 2.0 decoding.
//!
//! Only documents rooted at `<rss>` are accepted. RSS 1.0 (`<rdf:RDF>`),
//! Atom, JSON Feed and anything else are decode errors.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use rss::Channel;

use crate::error::{DecodeError, PubDateError};

/// `02 Jan 2006 15:04:05 -0700`, the layout once the weekday is stripped.
pub const PUB_DATE_FORMAT: &str = "%d %b %Y %H:%M:%S %z";

/// `Mon, 02 Jan 2006 15:04:05 -0700`. The weekday must be well formed but
/// is not checked against the date.
static PUB_DATE_LAYOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i:Mon|Tue|Wed|Thu|Fri|Sat|Sun), (\d{2} [A-Za-z]{3} \d{4} \d{1,2}:\d{2}:\d{2} [+-]\d{4})$",
    )
    .unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RssChannel {
    pub title: String,
    pub description: String,
    pub link: String,
    pub items: Vec<RawFeedItem>,
}

/// An `<item>` exactly as it appeared in the payload. Missing elements are
/// empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
}

/// Name of the first element in the document, if it is well-formed that far.
fn root_element(bytes: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(bytes);
    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) | Ok(Event::Empty(tag)) => {
                return Some(String::from_utf8_lossy(tag.name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<RssChannel, DecodeError> {
    if let Some(root) = root_element(bytes) {
        if root != "rss" {
            return Err(DecodeError::Root(root));
        }
    }
    let channel = Channel::read_from(bytes)?;

    let items = channel
        .items()
        .iter()
        .map(|item| RawFeedItem {
            title: item.title().unwrap_or_default().to_string(),
            description: item.description().unwrap_or_default().to_string(),
            link: item.link().unwrap_or_default().trim().to_string(),
            pub_date: item.pub_date().unwrap_or_default().to_string(),
        })
        .collect();

    Ok(RssChannel {
        title: channel.title().to_string(),
        description: channel.description().to_string(),
        link: channel.link().to_string(),
        items,
    })
}

/// Parse an item's `<pubDate>`. Only RFC 1123 with a two-digit day and a
/// `+hhmm` offset is accepted; named zones such as `GMT` are rejected.
pub fn parse_pub_date(value: &str) -> Result<DateTime<Utc>, PubDateError> {
    let value = value.trim();
    let captures = PUB_DATE_LAYOUT
        .captures(value)
        .ok_or_else(|| PubDateError::Layout(value.to_string()))?;
    let dated = DateTime::parse_from_str(&captures[1], PUB_DATE_FORMAT)?;
    Ok(dated.with_timezone(&Utc))
}
