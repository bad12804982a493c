use quick_xml::events::Event;
use quick_xml::Reader;
use regia_core::{RegiaError, RegiaResult};

/// One RSS `<item>` or Atom `<entry>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub published: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum FeedField {
    Title,
    Description,
    Link,
    Published,
}

/// Iterates RSS `<item>` and Atom `<entry>` elements. Atom `<link href>`
/// attributes and CDATA bodies are both handled.
pub fn parse_feed_items(xml: &str) -> RegiaResult<Vec<FeedItem>> {
    let mut reader = Reader::from_str(xml);

    let mut items = Vec::new();
    let mut current: Option<FeedItem> = None;
    let mut current_field: Option<FeedField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).to_lowercase();
                match name.as_str() {
                    "item" | "entry" => {
                        current = Some(FeedItem::default());
                        current_field = None;
                    }
                    "title" if current.is_some() => current_field = Some(FeedField::Title),
                    "description" | "summary" if current.is_some() => {
                        current_field = Some(FeedField::Description)
                    }
                    "link" if current.is_some() => current_field = Some(FeedField::Link),
                    "pubdate" | "published" | "updated" if current.is_some() => {
                        current_field = Some(FeedField::Published)
                    }
                    _ => current_field = None,
                }
            }
            Ok(Event::Empty(element)) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).to_lowercase();
                if name == "link" {
                    if let Some(item) = current.as_mut() {
                        for attribute in element.attributes().flatten() {
                            if attribute.key.local_name().as_ref() == b"href" {
                                item.link = String::from_utf8_lossy(&attribute.value).to_string();
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), current_field) {
                    let value = text
                        .unescape()
                        .map_err(|e| RegiaError::ParseError {
                            content_type: "xml".to_string(),
                            reason: e.to_string(),
                        })?
                        .to_string();
                    append_field(item, field, &value);
                }
            }
            Ok(Event::CData(data)) => {
                if let (Some(item), Some(field)) = (current.as_mut(), current_field) {
                    let value = String::from_utf8_lossy(&data).to_string();
                    append_field(item, field, &value);
                }
            }
            Ok(Event::End(element)) => {
                let name = String::from_utf8_lossy(element.local_name().as_ref()).to_lowercase();
                match name.as_str() {
                    "item" | "entry" => {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                    }
                    _ => current_field = None,
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(RegiaError::ParseError {
                    content_type: "xml".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    Ok(items)
}

fn append_field(item: &mut FeedItem, field: FeedField, value: &str) {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return;
    }
    match field {
        FeedField::Title => {
            if !item.title.is_empty() {
                item.title.push(' ');
            }
            item.title.push_str(trimmed);
        }
        FeedField::Description => {
            if !item.description.is_empty() {
                item.description.push(' ');
            }
            item.description.push_str(trimmed);
        }
        FeedField::Link => item.link = trimmed.to_string(),
        FeedField::Published => item.published = Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
        <rss version="2.0"><channel>
        <title>ECB Press</title>
        <item>
            <title>ECB raises capital buffer guidance</title>
            <description><![CDATA[Banks must raise buffers &amp; report.]]></description>
            <link>https://www.ecb.europa.eu/press/1</link>
            <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
        </item>
        <item>
            <title>Second announcement</title>
            <description>Minor update</description>
            <link>https://www.ecb.europa.eu/press/2</link>
        </item>
        </channel></rss>"#;

    const ATOM: &str = r#"<?xml version="1.0"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
        <title>FCA Updates</title>
        <entry>
            <title>New conduct rules</title>
            <summary>Conduct requirements for firms</summary>
            <link href="https://www.fca.org.uk/news/1"/>
            <updated>2025-01-06T10:00:00Z</updated>
        </entry>
        </feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let items = parse_feed_items(RSS).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "ECB raises capital buffer guidance");
        assert_eq!(items[0].link, "https://www.ecb.europa.eu/press/1");
        assert!(items[0].description.contains("raise buffers"));
        assert_eq!(
            items[0].published.as_deref(),
            Some("Mon, 06 Jan 2025 10:00:00 GMT")
        );
        assert!(items[1].published.is_none());
    }

    #[test]
    fn test_parse_atom_entries() {
        let items = parse_feed_items(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "New conduct rules");
        assert_eq!(items[0].description, "Conduct requirements for firms");
        assert_eq!(items[0].link, "https://www.fca.org.uk/news/1");
        assert_eq!(items[0].published.as_deref(), Some("2025-01-06T10:00:00Z"));
    }

    #[test]
    fn test_feed_title_outside_items_ignored() {
        let items = parse_feed_items(RSS).unwrap();
        assert!(items.iter().all(|i| i.title != "ECB Press"));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let result = parse_feed_items("<rss><item><title>busted</rss>");
        assert!(matches!(result, Err(RegiaError::ParseError { .. })));
    }

    #[test]
    fn test_empty_feed() {
        let items = parse_feed_items("<rss><channel></channel></rss>").unwrap();
        assert!(items.is_empty());
    }
}
