use crate::dedup::ItemDedup;
use crate::source::{status_reachable, RegulatorySource, RegulatorySourceKind, SourceCommon};
use crate::state::SourceStateStore;
use async_trait::async_trait;
use regia_core::{
    RegiaError, RegiaResult, RegulatoryChange, RegulatoryChangeMetadata, RegulatoryImpact,
};
use regia_http::HttpClient;
use regia_parser::{
    extract_keywords_from_text, extract_regulatory_body, parse_feed_items, parse_json_items,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SEEN_ITEMS_KEY: &str = "seen_item_hashes";
const SEEN_ITEMS_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomFeedSettings {
    pub source_id: String,
    pub source_name: String,
    pub feed_type: String,
    pub feed_url: String,
    pub items_json_path: String,
    pub default_change_type: String,
    pub default_severity: String,
}

impl Default for CustomFeedSettings {
    fn default() -> Self {
        Self {
            source_id: "custom_feed".to_string(),
            source_name: "Custom Regulatory Feed".to_string(),
            feed_type: "rss".to_string(),
            feed_url: String::new(),
            items_json_path: "items".to_string(),
            default_change_type: "update".to_string(),
            default_severity: "LOW".to_string(),
        }
    }
}

/// Configuration-driven feed source for RSS, Atom or JSON endpoints.
pub struct CustomFeedSource {
    common: SourceCommon,
    http: Arc<HttpClient>,
    settings: CustomFeedSettings,
    seen: ItemDedup,
}

/// Normalized view of one feed entry, independent of the feed format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFeedEntry {
    pub title: String,
    pub description: String,
    pub url: String,
    pub change_type: String,
    pub severity: String,
}

impl CustomFeedSource {
    pub fn new(
        settings: CustomFeedSettings,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            common: SourceCommon::new(
                settings.source_id.clone(),
                settings.source_name.clone(),
                RegulatorySourceKind::CustomFeed,
                state_store,
            ),
            http,
            settings,
            seen: ItemDedup::new(SEEN_ITEMS_CAPACITY),
        }
    }

    pub fn parse_entries(&self, body: &str) -> RegiaResult<Vec<CustomFeedEntry>> {
        match self.settings.feed_type.to_lowercase().as_str() {
            "rss" | "atom" => Ok(parse_feed_items(body)?
                .into_iter()
                .map(|item| CustomFeedEntry {
                    title: item.title,
                    description: item.description,
                    url: item.link,
                    change_type: String::new(),
                    severity: String::new(),
                })
                .collect()),
            "json" => Ok(parse_json_items(body, &self.settings.items_json_path)?
                .into_iter()
                .map(|item| CustomFeedEntry {
                    title: item.title,
                    description: item.description,
                    url: item.url,
                    change_type: item.change_type,
                    severity: item.severity,
                })
                .collect()),
            other => Err(RegiaError::ConfigurationError {
                parameter: "feed_type".to_string(),
                reason: format!("unsupported feed type: {}", other),
            }),
        }
    }

    fn build_change(&self, entry: &CustomFeedEntry) -> RegulatoryChange {
        let change_type = if entry.change_type.is_empty() {
            self.settings.default_change_type.clone()
        } else {
            entry.change_type.clone()
        };
        let severity_raw = if entry.severity.is_empty() {
            self.settings.default_severity.clone()
        } else {
            entry.severity.clone()
        };
        let severity =
            RegulatoryImpact::parse(&severity_raw).unwrap_or(RegulatoryImpact::Low);

        let combined = format!("{} {}", entry.title, entry.description);
        let mut custom_fields = HashMap::new();
        custom_fields.insert("severity".to_string(), severity.as_str().to_string());

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: extract_regulatory_body(&combined),
            document_type: change_type,
            document_number: String::new(),
            keywords: extract_keywords_from_text(&combined),
            affected_entities: Vec::new(),
            custom_fields,
        };

        RegulatoryChange::new(
            self.common.source_id.clone(),
            entry.title.clone(),
            entry.url.clone(),
            metadata,
        )
    }

    pub async fn ingest_entries(&mut self, entries: &[CustomFeedEntry]) -> Vec<RegulatoryChange> {
        let mut changes = Vec::new();
        let mut seen_changed = false;

        for entry in entries {
            if entry.title.is_empty() {
                continue;
            }
            let key = ItemDedup::item_key(&entry.title, &entry.url);
            if self.seen.check_and_insert(&key) {
                changes.push(self.build_change(entry));
                seen_changed = true;
            }
        }

        if seen_changed {
            let state = self.seen.to_state();
            self.common.persist_state(SEEN_ITEMS_KEY, &state).await;
        }

        changes
    }
}

#[async_trait]
impl RegulatorySource for CustomFeedSource {
    fn common(&self) -> &SourceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut SourceCommon {
        &mut self.common
    }

    async fn initialize(&mut self) -> RegiaResult<bool> {
        if self.settings.feed_url.is_empty() {
            return Err(RegiaError::ConfigurationError {
                parameter: "feed_url".to_string(),
                reason: "custom feed requires a feed_url".to_string(),
            });
        }
        let raw = self.common.load_state(SEEN_ITEMS_KEY, "[]").await;
        self.seen = ItemDedup::from_state(&raw, SEEN_ITEMS_CAPACITY);
        let reachable = self.test_connectivity().await;
        info!(
            source_id = self.common.source_id.as_str(),
            feed_type = self.settings.feed_type.as_str(),
            reachable,
            "custom feed source initialized"
        );
        Ok(reachable)
    }

    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
        self.common.mark_checked();

        let response = match self.http.get(&self.settings.feed_url, &HashMap::new()).await {
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
                reason: format!("feed endpoint returned {}", response.status_code),
            });
        }

        let entries = match self.parse_entries(&response.body) {
            Ok(entries) => entries,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        let changes = self.ingest_entries(&entries).await;
        self.common.record_success();
        Ok(changes)
    }

    fn configuration(&self) -> serde_json::Value {
        let mut config = self
            .common
            .configuration_base(&self.settings.feed_url, self.check_interval());
        config["feed_type"] = serde_json::json!(self.settings.feed_type);
        config["items_json_path"] = serde_json::json!(self.settings.items_json_path);
        config["default_change_type"] = serde_json::json!(self.settings.default_change_type);
        config["default_severity"] = serde_json::json!(self.settings.default_severity);
        config
    }

    async fn test_connectivity(&self) -> bool {
        match self.http.get(&self.settings.feed_url, &HashMap::new()).await {
            Ok(response) => status_reachable(response.status_code),
            Err(_) => false,
        }
    }
}
