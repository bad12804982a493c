use crate::extract::{
    extract_affected_entities, extract_document_number, extract_document_type,
    extract_keywords_from_text, extract_regulatory_body,
};
use crate::html::{extract_html_title, strip_html};
use crate::json_feed::parse_json_items;
use crate::xml::parse_feed_items;
use chrono::{DateTime, Utc};
use regia_core::{truncate_string, RegiaResult, RegulatoryChangeMetadata};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Xml,
    Json,
    Text,
}

impl ContentKind {
    pub fn from_content_type(content_type: &str) -> Self {
        let normalized = content_type.to_lowercase();
        if normalized.contains("html") {
            ContentKind::Html
        } else if normalized.contains("xml") || normalized.contains("rss") {
            ContentKind::Xml
        } else if normalized.contains("json") {
            ContentKind::Json
        } else {
            ContentKind::Text
        }
    }
}

/// Extracts regulatory metadata from raw source documents. Malformed input is
/// never fatal: the parser logs, bumps `parsing_errors` and hands back empty
/// metadata so the monitor loop keeps going.
#[derive(Default)]
pub struct DocumentParser {
    documents_parsed: AtomicUsize,
    html_documents: AtomicUsize,
    xml_documents: AtomicUsize,
    json_documents: AtomicUsize,
    text_documents: AtomicUsize,
    parsing_errors: AtomicUsize,
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, content: &str, content_type: &str) -> RegulatoryChangeMetadata {
        self.documents_parsed.fetch_add(1, Ordering::Relaxed);

        let result = match ContentKind::from_content_type(content_type) {
            ContentKind::Html => {
                self.html_documents.fetch_add(1, Ordering::Relaxed);
                self.parse_html(content)
            }
            ContentKind::Xml => {
                self.xml_documents.fetch_add(1, Ordering::Relaxed);
                self.parse_xml(content)
            }
            ContentKind::Json => {
                self.json_documents.fetch_add(1, Ordering::Relaxed);
                self.parse_json(content)
            }
            ContentKind::Text => {
                self.text_documents.fetch_add(1, Ordering::Relaxed);
                Ok(self.parse_text(content))
            }
        };

        match result {
            Ok(metadata) => metadata,
            Err(e) => {
                self.parsing_errors.fetch_add(1, Ordering::Relaxed);
                warn!(content_type = content_type, error = %e, "document parse failed");
                RegulatoryChangeMetadata::default()
            }
        }
    }

    pub fn extract_title(&self, content: &str, content_type: &str) -> String {
        match ContentKind::from_content_type(content_type) {
            ContentKind::Html => extract_html_title(content).unwrap_or_default(),
            ContentKind::Xml => parse_feed_items(content)
                .ok()
                .and_then(|items| items.into_iter().next())
                .map(|item| item.title)
                .unwrap_or_default(),
            ContentKind::Json => serde_json::from_str::<serde_json::Value>(content)
                .ok()
                .and_then(|value| {
                    value
                        .get("title")
                        .and_then(|t| t.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_default(),
            ContentKind::Text => content
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(|line| truncate_string(line, 200))
                .unwrap_or_default(),
        }
    }

    pub fn extract_effective_date(&self, content: &str) -> Option<DateTime<Utc>> {
        crate::extract::extract_effective_date(content)
    }

    pub fn parsing_stats(&self) -> serde_json::Value {
        json!({
            "documents_parsed": self.documents_parsed.load(Ordering::Relaxed),
            "html_documents": self.html_documents.load(Ordering::Relaxed),
            "xml_documents": self.xml_documents.load(Ordering::Relaxed),
            "json_documents": self.json_documents.load(Ordering::Relaxed),
            "text_documents": self.text_documents.load(Ordering::Relaxed),
            "parsing_errors": self.parsing_errors.load(Ordering::Relaxed),
        })
    }

    fn parse_html(&self, html: &str) -> RegiaResult<RegulatoryChangeMetadata> {
        let text = strip_html(html);
        Ok(self.metadata_from_text(&text))
    }

    fn parse_xml(&self, xml: &str) -> RegiaResult<RegulatoryChangeMetadata> {
        let items = parse_feed_items(xml)?;
        let combined = items
            .iter()
            .map(|item| format!("{} {}", item.title, item.description))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.metadata_from_text(&combined))
    }

    fn parse_json(&self, body: &str) -> RegiaResult<RegulatoryChangeMetadata> {
        let items = parse_json_items(body, "items")?;
        let combined = items
            .iter()
            .map(|item| format!("{} {}", item.title, item.description))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(self.metadata_from_text(&combined))
    }

    fn parse_text(&self, text: &str) -> RegulatoryChangeMetadata {
        self.metadata_from_text(text)
    }

    fn metadata_from_text(&self, text: &str) -> RegulatoryChangeMetadata {
        RegulatoryChangeMetadata {
            regulatory_body: extract_regulatory_body(text),
            document_type: extract_document_type(text),
            document_number: extract_document_number(text),
            keywords: extract_keywords_from_text(text),
            affected_entities: extract_affected_entities(text),
            custom_fields: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"<html><head><title>SEC Adopts Capital Rule</title>
        <script>ignored()</script></head>
        <body><h1>SEC Adopts Capital Rule</h1>
        <article>The Securities and Exchange Commission adopts a final rule.
        Release No. 34-98765. Effective January 2, 2025. Applies to: broker-dealers.
        Capital ratio set at 8%.</article></body></html>"#;

    #[test]
    fn test_content_kind_routing() {
        assert_eq!(ContentKind::from_content_type("text/html"), ContentKind::Html);
        assert_eq!(ContentKind::from_content_type("text/xml"), ContentKind::Xml);
        assert_eq!(
            ContentKind::from_content_type("application/xml"),
            ContentKind::Xml
        );
        assert_eq!(
            ContentKind::from_content_type("application/rss+xml"),
            ContentKind::Xml
        );
        assert_eq!(ContentKind::from_content_type("rss"), ContentKind::Xml);
        assert_eq!(
            ContentKind::from_content_type("application/json"),
            ContentKind::Json
        );
        assert_eq!(ContentKind::from_content_type("text/plain"), ContentKind::Text);
        assert_eq!(ContentKind::from_content_type("unknown"), ContentKind::Text);
    }

    #[test]
    fn test_parse_html_document() {
        let parser = DocumentParser::new();
        let metadata = parser.parse(HTML, "text/html");
        assert_eq!(metadata.regulatory_body, "SEC");
        assert_eq!(metadata.document_type, "rule");
        assert_eq!(metadata.document_number, "34-98765");
        assert!(metadata.keywords.contains(&"capital".to_string()));
        assert!(metadata
            .affected_entities
            .iter()
            .any(|e| e.contains("broker-dealers")));
        assert_eq!(parser.parsing_stats()["html_documents"], 1);
    }

    #[test]
    fn test_parse_malformed_json_returns_empty_metadata() {
        let parser = DocumentParser::new();
        let metadata = parser.parse("{{{ not json", "application/json");
        assert_eq!(metadata, RegulatoryChangeMetadata::default());
        assert_eq!(parser.parsing_stats()["parsing_errors"], 1);
        assert_eq!(parser.parsing_stats()["documents_parsed"], 1);
    }

    #[test]
    fn test_extract_title_html_and_text() {
        let parser = DocumentParser::new();
        assert_eq!(
            parser.extract_title(HTML, "text/html"),
            "SEC Adopts Capital Rule"
        );
        assert_eq!(
            parser.extract_title("\n\nFirst line here\nsecond", "text/plain"),
            "First line here"
        );
    }

    #[test]
    fn test_extract_title_json() {
        let parser = DocumentParser::new();
        assert_eq!(
            parser.extract_title(r#"{"title": "Feed Title"}"#, "application/json"),
            "Feed Title"
        );
    }

    #[test]
    fn test_effective_date_passthrough() {
        let parser = DocumentParser::new();
        assert!(parser
            .extract_effective_date("Effective date: 2025-06-30")
            .is_some());
        assert!(parser.extract_effective_date("never").is_none());
    }

    #[test]
    fn test_stats_accumulate() {
        let parser = DocumentParser::new();
        parser.parse("plain words", "text/plain");
        parser.parse("<p>html</p>", "text/html");
        parser.parse("<rss><channel></channel></rss>", "application/xml");
        let stats = parser.parsing_stats();
        assert_eq!(stats["documents_parsed"], 3);
        assert_eq!(stats["text_documents"], 1);
        assert_eq!(stats["html_documents"], 1);
        assert_eq!(stats["xml_documents"], 1);
        assert_eq!(stats["parsing_errors"], 0);
    }
}
