//! RSS and Atom feed parsing.
//!
//! Supports RSS 0.9x/2.0, RSS 1.0 (RDF) and Atom 1.0. Every item is mapped
//! to the same 13 fields ([`FEED_COLUMNS`]) whatever the feed flavour, with
//! absent fields left empty. Text is entity-decoded, CDATA is kept verbatim
//! and XHTML content is re-serialized as markup.

use chrono::DateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::SourceError;

/// Column schema produced for every feed item, in order.
pub const FEED_COLUMNS: [&str; 13] = [
    "title",
    "content",
    "permalink",
    "description",
    "categories",
    "authors",
    "contributors",
    "copyright",
    "date",
    "updated_date",
    "latitude",
    "longitude",
    "source",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One feed entry in normalized form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub content: String,
    pub permalink: String,
    pub description: String,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub contributors: Vec<String>,
    pub copyright: String,
    pub date: String,
    pub updated_date: String,
    pub latitude: String,
    pub longitude: String,
    pub source: String,
    guid: String,
}

impl FeedItem {
    /// Field values in [`FEED_COLUMNS`] order, multi-valued fields comma-joined.
    pub fn fields(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.content.clone(),
            self.permalink.clone(),
            self.description.clone(),
            self.categories.join(", "),
            self.authors.join(", "),
            self.contributors.join(", "),
            self.copyright.clone(),
            self.date.clone(),
            self.updated_date.clone(),
            self.latitude.clone(),
            self.longitude.clone(),
            self.source.clone(),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

fn feed_error(msg: impl std::fmt::Display) -> SourceError {
    SourceError::fetch("feed_parse", format!("Failed to parse feed: {}", msg))
}

struct Frame {
    name: String,
    text: String,
}

/// Elements whose nested markup is captured as text rather than parsed.
fn is_markup_container(name: &str) -> bool {
    matches!(
        name,
        "content" | "content:encoded" | "summary" | "description"
    )
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn qname(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Parses feed XML into normalized items.
pub fn parse_feed(xml: &[u8]) -> Result<Feed, SourceError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut feed = Feed::default();
    let mut recognized = false;
    let mut feed_copyright = String::new();

    let mut stack: Vec<Frame> = Vec::new();
    let mut item: Option<FeedItem> = None;
    let mut item_depth = 0usize;
    // Nesting depth inside a markup container; 0 when not capturing.
    let mut capture_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qname(&e);
                if capture_depth > 0 {
                    capture_depth += 1;
                    if let Some(top) = stack.last_mut() {
                        top.text.push('<');
                        top.text.push_str(&String::from_utf8_lossy(&e));
                        top.text.push('>');
                    }
                } else {
                    if stack.is_empty() {
                        recognized = matches!(local(&name), "rss" | "RDF" | "feed");
                        if !recognized {
                            return Err(feed_error(format!(
                                "root element <{}> is not an RSS or Atom feed",
                                name
                            )));
                        }
                    }
                    if matches!(name.as_str(), "item" | "entry") && item.is_none() {
                        item = Some(FeedItem::default());
                        item_depth = stack.len() + 1;
                    } else if let Some(it) = item.as_mut() {
                        if !inside_source(&stack) {
                            on_attributes(it, &name, &e);
                        }
                        if is_markup_container(&name) {
                            capture_depth = 1;
                        }
                    }
                    stack.push(Frame {
                        name,
                        text: String::new(),
                    });
                }
            }
            Ok(Event::Empty(e)) => {
                let name = qname(&e);
                if capture_depth > 0 {
                    if let Some(top) = stack.last_mut() {
                        top.text.push('<');
                        top.text.push_str(&String::from_utf8_lossy(&e));
                        top.text.push_str("/>");
                    }
                } else if let Some(it) = item.as_mut() {
                    if !inside_source(&stack) {
                        on_attributes(it, &name, &e);
                    }
                }
            }
            Ok(Event::Text(te)) => {
                if let Some(top) = stack.last_mut() {
                    let text = te.unescape().map_err(feed_error)?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(cd)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&cd.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if capture_depth > 1 {
                    capture_depth -= 1;
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str("</");
                        top.text.push_str(&name);
                        top.text.push('>');
                    }
                    buf.clear();
                    continue;
                }
                capture_depth = 0;

                let Some(frame) = stack.pop() else {
                    return Err(feed_error(format!("unexpected closing tag </{}>", name)));
                };
                let parent = stack.last().map(|f| f.name.as_str()).unwrap_or("");
                let text = frame.text.trim();

                if item.is_some() && stack.len() + 1 == item_depth {
                    if let Some(mut finished) = item.take() {
                        if finished.permalink.is_empty() && finished.guid.starts_with("http") {
                            finished.permalink = finished.guid.clone();
                        }
                        if finished.content.is_empty() {
                            finished.content = finished.description.clone();
                        }
                        feed.items.push(finished);
                    }
                } else if let Some(it) = item.as_mut() {
                    if inside_source(&stack) {
                        // An Atom <source> describes the originating feed; only its title is kept.
                        if frame.name == "title" {
                            it.source = text.to_string();
                        }
                    } else {
                        on_item_text(it, &frame.name, parent, text);
                    }
                } else {
                    match (frame.name.as_str(), local(parent)) {
                        ("title", "channel" | "feed") => feed.title = text.to_string(),
                        ("copyright" | "rights" | "dc:rights", "channel" | "feed") => {
                            feed_copyright = text.to_string()
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(feed_error(e)),
            _ => {}
        }
        buf.clear();
    }

    if !recognized {
        return Err(feed_error("document is empty"));
    }

    if !feed_copyright.is_empty() {
        for it in feed.items.iter_mut().filter(|i| i.copyright.is_empty()) {
            it.copyright = feed_copyright.clone();
        }
    }

    Ok(feed)
}

fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

fn inside_source(stack: &[Frame]) -> bool {
    stack.iter().any(|f| local(&f.name) == "source")
}

/// Attribute-carried fields (Atom links and categories).
fn on_attributes(item: &mut FeedItem, name: &str, e: &BytesStart<'_>) {
    match name {
        "link" => {
            let rel = attr(e, b"rel").unwrap_or_else(|| "alternate".to_string());
            if rel == "alternate" && item.permalink.is_empty() {
                if let Some(href) = attr(e, b"href") {
                    item.permalink = href;
                }
            }
        }
        "category" => {
            if let Some(term) = attr(e, b"term").filter(|t| !t.is_empty()) {
                item.categories.push(term);
            }
        }
        _ => {}
    }
}

fn on_item_text(item: &mut FeedItem, name: &str, parent: &str, text: &str) {
    if text.is_empty() {
        return;
    }
    match (name, parent) {
        ("title", _) => item.title = text.to_string(),
        ("name", "author") => item.authors.push(text.to_string()),
        ("name", "contributor") => item.contributors.push(text.to_string()),
        ("link", _) if item.permalink.is_empty() => item.permalink = text.to_string(),
        ("guid" | "id", _) => item.guid = text.to_string(),
        ("description" | "summary", _) => item.description = text.to_string(),
        ("content:encoded" | "content", _) => item.content = text.to_string(),
        ("category" | "dc:subject", _) => {
            if !item.categories.iter().any(|c| c == text) {
                item.categories.push(text.to_string());
            }
        }
        ("author" | "dc:creator", _) => item.authors.push(text.to_string()),
        ("dc:contributor", _) => item.contributors.push(text.to_string()),
        ("copyright" | "rights" | "dc:rights", _) => item.copyright = text.to_string(),
        ("pubDate" | "published" | "dc:date" | "issued", _) if item.date.is_empty() => {
            item.date = normalize_date(text)
        }
        ("updated" | "modified" | "dcterms:modified", _) => item.updated_date = normalize_date(text),
        ("georss:point", _) => {
            let mut parts = text.split_whitespace();
            if let (Some(lat), Some(lon)) = (parts.next(), parts.next()) {
                item.latitude = lat.to_string();
                item.longitude = lon.to_string();
            }
        }
        ("geo:lat", _) => item.latitude = text.to_string(),
        ("geo:long" | "geo:lon", _) => item.longitude = text.to_string(),
        ("source", _) => item.source = text.to_string(),
        _ => {}
    }
}

/// RFC 2822 / RFC 3339 dates become `YYYY-MM-DD HH:MM:SS`; anything else is kept.
pub fn normalize_date(raw: &str) -> String {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|_| raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/"
     xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:georss="http://www.georss.org/georss">
  <channel>
    <title>Town News</title>
    <copyright>(c) Town Gazette</copyright>
    <item>
      <title>Parade
on Main Street</title>
      <link>https://news.example.com/parade</link>
      <description>The &lt;b&gt;annual&lt;/b&gt; parade.</description>
      <content:encoded><![CDATA[<p>Floats and	bands.</p>
<p>Fun for all.</p>]]></content:encoded>
      <category>Events</category>
      <category>Local</category>
      <dc:creator>Jane Reporter</dc:creator>
      <pubDate>Mon, 06 Sep 2021 16:45:00 +0000</pubDate>
      <georss:point>45.256 -71.92</georss:point>
      <source url="https://wire.example.com">Wire Service</source>
    </item>
    <item>
      <title>Bare item</title>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Atom</title>
  <rights>CC-BY</rights>
  <entry>
    <title>Atom entry</title>
    <link rel="self" href="https://example.com/self"/>
    <link href="https://example.com/entry"/>
    <id>urn:uuid:1225c695</id>
    <published>2003-12-13T18:30:02Z</published>
    <updated>2003-12-14T10:20:00Z</updated>
    <author><name>John Doe</name></author>
    <contributor><name>Ann Helper</name></contributor>
    <category term="tech"/>
    <summary>Short summary</summary>
    <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Hello</p></div></content>
    <source><title>Origin Feed</title></source>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_item_mapping() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(feed.title, "Town News");
        assert_eq!(feed.items.len(), 2);

        let item = &feed.items[0];
        assert_eq!(item.title, "Parade\non Main Street");
        assert_eq!(item.permalink, "https://news.example.com/parade");
        assert_eq!(item.description, "The <b>annual</b> parade.");
        assert!(item.content.starts_with("<p>Floats"));
        assert_eq!(item.categories, vec!["Events", "Local"]);
        assert_eq!(item.authors, vec!["Jane Reporter"]);
        assert_eq!(item.date, "2021-09-06 16:45:00");
        assert_eq!(item.latitude, "45.256");
        assert_eq!(item.longitude, "-71.92");
        assert_eq!(item.source, "Wire Service");
        assert_eq!(item.copyright, "(c) Town Gazette");
    }

    #[test]
    fn test_sparse_item_has_all_columns() {
        let feed = parse_feed(RSS.as_bytes()).unwrap();
        let fields = feed.items[1].fields();
        assert_eq!(fields.len(), FEED_COLUMNS.len());
        assert_eq!(fields[0], "Bare item");
        assert!(fields[2].is_empty());
        assert!(fields[8].is_empty());
    }

    #[test]
    fn test_atom_entry_mapping() {
        let feed = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(feed.items.len(), 1);
        let item = &feed.items[0];
        assert_eq!(item.title, "Atom entry");
        assert_eq!(item.permalink, "https://example.com/entry");
        assert_eq!(item.authors, vec!["John Doe"]);
        assert_eq!(item.contributors, vec!["Ann Helper"]);
        assert_eq!(item.categories, vec!["tech"]);
        assert_eq!(item.description, "Short summary");
        assert!(item.content.contains("<p>Hello</p>"));
        assert_eq!(item.date, "2003-12-13 18:30:02");
        assert_eq!(item.updated_date, "2003-12-14 10:20:00");
        assert_eq!(item.copyright, "CC-BY");
        assert_eq!(item.source, "Origin Feed");
    }

    #[test]
    fn test_atom_source_metadata_stays_out_of_entry() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title>Reposted</title>
    <id>urn:uuid:entry</id>
    <updated>2003-12-14T10:20:00Z</updated>
    <author><name>Real</name></author>
    <source>
      <id>urn:uuid:origin</id>
      <title>Origin Feed</title>
      <updated>1999-01-01T00:00:00Z</updated>
      <author><name>SourceAuthor</name></author>
      <link href="https://origin.example.com/"/>
      <category term="origin"/>
      <rights>All rights reserved</rights>
    </source>
  </entry>
</feed>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        let item = &feed.items[0];
        assert_eq!(item.title, "Reposted");
        assert_eq!(item.guid, "urn:uuid:entry");
        assert_eq!(item.updated_date, "2003-12-14 10:20:00");
        assert_eq!(item.authors, vec!["Real"]);
        assert!(item.permalink.is_empty());
        assert!(item.categories.is_empty());
        assert!(item.copyright.is_empty());
        assert_eq!(item.source, "Origin Feed");
    }

    #[test]
    fn test_rss_1_0_rdf() {
        let xml = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel><title>RDF</title></channel>
  <item><title>First</title><link>https://example.com/1</link></item>
</rdf:RDF>"#;
        let feed = parse_feed(xml.as_bytes()).unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].permalink, "https://example.com/1");
    }

    #[test]
    fn test_non_feed_rejected() {
        let err = parse_feed(b"<html><body>nope</body></html>").unwrap_err();
        assert_eq!(err.code, "feed_parse");
        let err = parse_feed(b"").unwrap_err();
        assert_eq!(err.code, "feed_parse");
    }

    #[test]
    fn test_normalize_date_passthrough() {
        assert_eq!(normalize_date("yesterday"), "yesterday");
    }
}
