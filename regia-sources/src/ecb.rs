use crate::dedup::ItemDedup;
use crate::source::{status_reachable, RegulatorySource, RegulatorySourceKind, SourceCommon};
use crate::state::SourceStateStore;
use async_trait::async_trait;
use regia_core::{RegiaResult, RegulatoryChange, RegulatoryChangeMetadata, RegulatoryImpact};
use regia_http::HttpClient;
use regia_parser::{extract_keywords_from_text, parse_feed_items, FeedItem};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SEEN_ITEMS_KEY: &str = "seen_item_hashes";
const SEEN_ITEMS_CAPACITY: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EcbSettings {
    pub rss_url: String,
}

impl Default for EcbSettings {
    fn default() -> Self {
        Self {
            rss_url: "https://www.ecb.europa.eu/rss/press.xml".to_string(),
        }
    }
}

/// ECB press RSS feed. RSS items have no monotonic cursor, so dedup keys are
/// `hash(title + link)` kept in a bounded seen-set persisted between runs.
pub struct EcbAnnouncementsSource {
    common: SourceCommon,
    http: Arc<HttpClient>,
    settings: EcbSettings,
    seen: ItemDedup,
}

impl EcbAnnouncementsSource {
    pub fn new(
        settings: EcbSettings,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            common: SourceCommon::new(
                "ecb_announcements",
                "ECB Announcements RSS",
                RegulatorySourceKind::EcbAnnouncements,
                state_store,
            ),
            http,
            settings,
            seen: ItemDedup::new(SEEN_ITEMS_CAPACITY),
        }
    }

    fn build_change(&self, item: &FeedItem) -> RegulatoryChange {
        let combined = format!("{} {}", item.title, item.description);
        let mut custom_fields = HashMap::new();
        custom_fields.insert(
            "severity".to_string(),
            RegulatoryImpact::Medium.as_str().to_string(),
        );
        if let Some(published) = &item.published {
            custom_fields.insert("published_at".to_string(), published.clone());
        }

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: "ECB".to_string(),
            document_type: "announcement".to_string(),
            document_number: String::new(),
            keywords: extract_keywords_from_text(&combined),
            affected_entities: Vec::new(),
            custom_fields,
        };

        RegulatoryChange::new(
            self.common.source_id.clone(),
            item.title.clone(),
            item.link.clone(),
            metadata,
        )
    }

    pub async fn ingest_items(&mut self, items: &[FeedItem]) -> Vec<RegulatoryChange> {
        let mut changes = Vec::new();
        let mut seen_changed = false;

        for item in items {
            if item.title.is_empty() {
                continue;
            }
            let key = ItemDedup::item_key(&item.title, &item.link);
            if self.seen.check_and_insert(&key) {
                changes.push(self.build_change(item));
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
impl RegulatorySource for EcbAnnouncementsSource {
    fn common(&self) -> &SourceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut SourceCommon {
        &mut self.common
    }

    async fn initialize(&mut self) -> RegiaResult<bool> {
        let raw = self.common.load_state(SEEN_ITEMS_KEY, "[]").await;
        self.seen = ItemDedup::from_state(&raw, SEEN_ITEMS_CAPACITY);
        let reachable = self.test_connectivity().await;
        info!(
            source_id = self.common.source_id.as_str(),
            reachable,
            seen_items = self.seen.len(),
            "ECB source initialized"
        );
        Ok(reachable)
    }

    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
        self.common.mark_checked();

        let response = match self.http.get(&self.settings.rss_url, &HashMap::new()).await {
            Ok(response) => response,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        if !response.is_success() {
            self.common.record_failure();
            return Err(regia_core::RegiaError::SourceError {
                source_id: self.common.source_id.clone(),
                reason: format!("rss endpoint returned {}", response.status_code),
            });
        }

        let items = match parse_feed_items(&response.body) {
            Ok(items) => items,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        let changes = self.ingest_items(&items).await;
        self.common.record_success();
        if !changes.is_empty() {
            info!(
                source_id = self.common.source_id.as_str(),
                changes = changes.len(),
                "new ECB announcements detected"
            );
        }
        Ok(changes)
    }

    fn configuration(&self) -> serde_json::Value {
        self.common
            .configuration_base(&self.settings.rss_url, self.check_interval())
    }

    async fn test_connectivity(&self) -> bool {
        match self.http.get(&self.settings.rss_url, &HashMap::new()).await {
            Ok(response) => status_reachable(response.status_code),
            Err(_) => false,
        }
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(900)
    }
}
