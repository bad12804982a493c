use crate::source::{status_reachable, RegulatorySource, RegulatorySourceKind, SourceCommon};
use crate::state::SourceStateStore;
use async_trait::async_trait;
use regia_core::{
    sha256_hex, RegiaError, RegiaResult, RegulatoryChange, RegulatoryChangeMetadata,
};
use regia_http::HttpClient;
use regia_parser::{extract_keywords_from_text, select_text, strip_html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const CONTENT_HASH_KEY: &str = "last_content_hash";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebScrapingSettings {
    pub source_id: String,
    pub source_name: String,
    pub target_url: String,
    pub title_selector: String,
    pub content_selector: String,
}

impl Default for WebScrapingSettings {
    fn default() -> Self {
        Self {
            source_id: "web_scraping".to_string(),
            source_name: "Regulatory Web Page".to_string(),
            target_url: String::new(),
            title_selector: "//h1".to_string(),
            content_selector: "//article".to_string(),
        }
    }
}

/// Watches one regulatory web page. Emits a change when the extracted content
/// hash moves; the raw text rides along so the change detector can produce
/// the structural diff downstream.
pub struct WebScrapingSource {
    common: SourceCommon,
    http: Arc<HttpClient>,
    settings: WebScrapingSettings,
    last_content_hash: Option<String>,
}

impl WebScrapingSource {
    pub fn new(
        settings: WebScrapingSettings,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            common: SourceCommon::new(
                settings.source_id.clone(),
                settings.source_name.clone(),
                RegulatorySourceKind::WebScraping,
                state_store,
            ),
            http,
            settings,
            last_content_hash: None,
        }
    }

    fn robots_url(&self) -> Option<String> {
        let url = &self.settings.target_url;
        let scheme_end = url.find("://")?;
        let host_end = url[scheme_end + 3..]
            .find('/')
            .map(|i| scheme_end + 3 + i)
            .unwrap_or(url.len());
        Some(format!("{}/robots.txt", &url[..host_end]))
    }

    pub fn extract_page(&self, html: &str) -> (String, String) {
        let title = select_text(html, &self.settings.title_selector)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.settings.source_name.clone());
        let content = select_text(html, &self.settings.content_selector)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| strip_html(html));
        (title, content)
    }

    /// Hash-gated change construction; separated from the fetch for tests.
    pub async fn ingest_page(&mut self, html: &str) -> Vec<RegulatoryChange> {
        let (title, content) = self.extract_page(html);
        let content_hash = sha256_hex(&content);

        if self.last_content_hash.as_deref() == Some(content_hash.as_str()) {
            return Vec::new();
        }

        let mut custom_fields = HashMap::new();
        custom_fields.insert("raw_content".to_string(), content.clone());
        custom_fields.insert("content_hash".to_string(), content_hash.clone());
        custom_fields.insert(
            "content_url".to_string(),
            self.settings.target_url.clone(),
        );

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: regia_parser::extract_regulatory_body(&content),
            document_type: regia_parser::extract_document_type(&content),
            document_number: regia_parser::extract_document_number(&content),
            keywords: extract_keywords_from_text(&content),
            affected_entities: Vec::new(),
            custom_fields,
        };

        let change = RegulatoryChange::new(
            self.common.source_id.clone(),
            title,
            self.settings.target_url.clone(),
            metadata,
        );

        self.common
            .persist_state(CONTENT_HASH_KEY, &content_hash)
            .await;
        self.last_content_hash = Some(content_hash);

        vec![change]
    }
}

#[async_trait]
impl RegulatorySource for WebScrapingSource {
    fn common(&self) -> &SourceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut SourceCommon {
        &mut self.common
    }

    async fn initialize(&mut self) -> RegiaResult<bool> {
        if self.settings.target_url.is_empty() {
            return Err(RegiaError::ConfigurationError {
                parameter: "target_url".to_string(),
                reason: "web scraping source requires a target_url".to_string(),
            });
        }

        let hash = self.common.load_state(CONTENT_HASH_KEY, "").await;
        if !hash.is_empty() {
            self.last_content_hash = Some(hash);
        }

        // robots.txt probe is informational only.
        if let Some(robots_url) = self.robots_url() {
            match self.http.get(&robots_url, &HashMap::new()).await {
                Ok(response) if response.is_success() => {
                    if response.body.lines().any(|line| {
                        line.trim().eq_ignore_ascii_case("disallow: /")
                    }) {
                        warn!(
                            source_id = self.common.source_id.as_str(),
                            robots_url = robots_url.as_str(),
                            "robots.txt disallows scraping this host"
                        );
                    }
                }
                _ => {}
            }
        }

        let reachable = self.test_connectivity().await;
        info!(
            source_id = self.common.source_id.as_str(),
            target_url = self.settings.target_url.as_str(),
            reachable,
            "web scraping source initialized"
        );
        Ok(reachable)
    }

    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
        self.common.mark_checked();

        let response = match self
            .http
            .get(&self.settings.target_url, &HashMap::new())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        if !response.is_success() {
            self.common.record_failure();
            return Err(RegiaError::SourceError {
                source_id: self.common.source_id.clone(),
                reason: format!("target page returned {}", response.status_code),
            });
        }

        let changes = self.ingest_page(&response.body).await;
        self.common.record_success();
        Ok(changes)
    }

    fn configuration(&self) -> serde_json::Value {
        let mut config = self
            .common
            .configuration_base(&self.settings.target_url, self.check_interval());
        config["title_selector"] = serde_json::json!(self.settings.title_selector);
        config["content_selector"] = serde_json::json!(self.settings.content_selector);
        config
    }

    async fn test_connectivity(&self) -> bool {
        match self
            .http
            .get(&self.settings.target_url, &HashMap::new())
            .await
        {
            Ok(response) => status_reachable(response.status_code),
            Err(_) => false,
        }
    }
}
