//! RSS and Atom feed fetching
//!
//! Feeds in the wild are frequently non-conformant, so the parser only looks
//! for the handful of elements the dashboard shows and ignores everything
//! else.

use crate::error::{IronDashError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

/// Maximum number of items returned for a feed
pub const MAX_FEED_ITEMS: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Flavor {
    Rss,
    Atom,
}

impl Flavor {
    fn entry_tag(self) -> &'static [u8] {
        match self {
            Flavor::Rss => b"item",
            Flavor::Atom => b"entry",
        }
    }
}

/// Fetch `url` and parse it as a feed.
///
/// # Errors
///
/// Returns [`IronDashError::Upstream`] if the request fails or the body is not
/// a parseable feed.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<FeedItem>> {
    let body = crate::content::fetch_text(client, url).await?;
    let items = parse_feed(&body)?;
    tracing::debug!("Parsed {} feed items from {url}", items.len());
    Ok(items)
}

/// Parse an RSS or Atom document into at most [`MAX_FEED_ITEMS`] items.
///
/// The document is Atom when its root element is `feed`. Entries with neither
/// a title nor a link are skipped.
///
/// # Errors
///
/// Returns [`IronDashError::Upstream`] for malformed XML.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut flavor = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut entry_depth = None;
    let mut current = FeedItem::default();
    let mut text = String::new();
    let mut items = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| IronDashError::Upstream(format!("Failed to parse feed: {e}")))?;
        match event {
            Event::Start(ref e) => {
                let name = e.local_name().as_ref().to_vec();
                let kind = *flavor.get_or_insert(if name == b"feed" {
                    Flavor::Atom
                } else {
                    Flavor::Rss
                });
                if entry_depth.is_none() && name == kind.entry_tag() {
                    entry_depth = Some(path.len());
                    current = FeedItem::default();
                } else if is_field(entry_depth, &path) && name == b"link" {
                    take_atom_link(e, &mut current);
                }
                path.push(name);
                text.clear();
            }
            Event::Empty(ref e) => {
                let name = e.local_name();
                if flavor.is_none() {
                    flavor = Some(Flavor::Rss);
                }
                if is_field(entry_depth, &path) && name.as_ref() == b"link" {
                    take_atom_link(e, &mut current);
                }
            }
            Event::Text(e) => {
                let chunk = e
                    .unescape()
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                text.push_str(&chunk);
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(_) => {
                let Some(name) = path.pop() else { continue };
                match entry_depth {
                    Some(depth) if path.len() == depth => {
                        entry_depth = None;
                        let item = std::mem::take(&mut current);
                        if !(item.title.is_empty() && item.link.is_empty()) {
                            items.push(item);
                            if items.len() == MAX_FEED_ITEMS {
                                break;
                            }
                        }
                    }
                    Some(depth) if path.len() == depth + 1 => {
                        assign_field(&name, text.trim(), &mut current);
                    }
                    _ => {}
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if flavor.is_none() {
        return Err(IronDashError::Upstream(
            "Failed to parse feed: document is empty".to_string(),
        ));
    }
    Ok(items)
}

/// Whether the element about to open is a direct child of the current entry
fn is_field(entry_depth: Option<usize>, path: &[Vec<u8>]) -> bool {
    entry_depth.is_some_and(|depth| path.len() == depth + 1)
}

fn assign_field(name: &[u8], value: &str, item: &mut FeedItem) {
    if value.is_empty() {
        return;
    }
    match name {
        b"title" if item.title.is_empty() => item.title = value.to_string(),
        b"link" if item.link.is_empty() => item.link = value.to_string(),
        b"pubDate" | b"date" | b"updated" | b"published" if item.date.is_none() => {
            item.date = Some(value.to_string());
        }
        _ => {}
    }
}

/// Atom links carry their target in `href`; only alternate links count.
fn take_atom_link(element: &BytesStart<'_>, item: &mut FeedItem) {
    if !item.link.is_empty() {
        return;
    }
    let mut href = None;
    let mut alternate = true;
    for attr in element.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_default();
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(value),
            b"rel" => alternate = value == "alternate",
            _ => {}
        }
    }
    if let Some(href) = href.filter(|h| alternate && !h.is_empty()) {
        item.link = href;
    }
}
