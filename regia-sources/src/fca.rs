use crate::source::{status_reachable, RegulatorySource, RegulatorySourceKind, SourceCommon};
use crate::state::SourceStateStore;
use async_trait::async_trait;
use regia_core::{
    RegiaError, RegiaResult, RegulatoryChange, RegulatoryChangeMetadata, RegulatoryImpact,
};
use regia_http::HttpClient;
use regia_parser::extract_keywords_from_text;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const CURSOR_KEY: &str = "last_update_timestamp";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FcaSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for FcaSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.fca.org.uk".to_string(),
            api_key: None,
        }
    }
}

/// FCA regulatory updates feed. The cursor is the newest ISO-8601 timestamp
/// already processed; lexicographic comparison is valid for the Z-suffixed
/// form the API emits.
pub struct FcaRegulatorySource {
    common: SourceCommon,
    http: Arc<HttpClient>,
    settings: FcaSettings,
    last_update_timestamp: Option<String>,
}

impl FcaRegulatorySource {
    pub fn new(
        settings: FcaSettings,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            common: SourceCommon::new(
                "fca_regulatory",
                "FCA Regulatory API",
                RegulatorySourceKind::FcaRegulatory,
                state_store,
            ),
            http,
            settings,
            last_update_timestamp: None,
        }
    }

    fn updates_url(&self) -> String {
        format!("{}/api/regulatory-updates", self.settings.base_url)
    }

    pub fn determine_severity(update_type: &str) -> RegulatoryImpact {
        match update_type.to_lowercase().as_str() {
            "emergency" | "rule_change" => RegulatoryImpact::High,
            "policy" | "guidance" => RegulatoryImpact::Medium,
            _ => RegulatoryImpact::Low,
        }
    }

    fn is_new_update(&self, timestamp: &str) -> bool {
        match &self.last_update_timestamp {
            Some(cursor) => timestamp > cursor.as_str(),
            None => true,
        }
    }

    fn process_update(&self, update: &Value) -> Option<RegulatoryChange> {
        let title = update.get("title").and_then(|v| v.as_str())?;
        let update_type = update
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("announcement");
        let description = update
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let url = update.get("url").and_then(|v| v.as_str()).unwrap_or_default();

        let mut custom_fields = HashMap::new();
        custom_fields.insert(
            "severity".to_string(),
            Self::determine_severity(update_type).as_str().to_string(),
        );
        custom_fields.insert("update_type".to_string(), update_type.to_string());
        if let Some(timestamp) = update.get("timestamp").and_then(|v| v.as_str()) {
            custom_fields.insert("published_at".to_string(), timestamp.to_string());
        }

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: "FCA".to_string(),
            document_type: update_type.to_string(),
            document_number: String::new(),
            keywords: extract_keywords_from_text(&format!("{} {}", title, description)),
            affected_entities: Vec::new(),
            custom_fields,
        };

        Some(RegulatoryChange::new(
            self.common.source_id.clone(),
            title,
            url,
            metadata,
        ))
    }

    /// Reloads the persisted timestamp cursor.
    pub async fn load_cursor(&mut self) {
        let cursor = self.common.load_state(CURSOR_KEY, "").await;
        if !cursor.is_empty() {
            self.last_update_timestamp = Some(cursor);
        }
    }

    pub async fn ingest_updates(&mut self, updates: &[Value]) -> Vec<RegulatoryChange> {
        let mut changes = Vec::new();
        let mut max_timestamp = self.last_update_timestamp.clone();

        for update in updates {
            let Some(timestamp) = update.get("timestamp").and_then(|v| v.as_str()) else {
                continue;
            };
            if !self.is_new_update(timestamp) {
                debug!(timestamp, "update already processed");
                continue;
            }
            if max_timestamp
                .as_deref()
                .map(|m| timestamp > m)
                .unwrap_or(true)
            {
                max_timestamp = Some(timestamp.to_string());
            }
            if let Some(change) = self.process_update(update) {
                changes.push(change);
            }
        }

        if max_timestamp != self.last_update_timestamp {
            if let Some(cursor) = &max_timestamp {
                self.common.persist_state(CURSOR_KEY, cursor).await;
            }
            self.last_update_timestamp = max_timestamp;
        }

        changes
    }

    fn parse_updates(body: &str) -> RegiaResult<Vec<Value>> {
        let value: Value = serde_json::from_str(body).map_err(|e| RegiaError::ParseError {
            content_type: "json".to_string(),
            reason: e.to_string(),
        })?;
        let updates = if let Some(array) = value.as_array() {
            array.clone()
        } else {
            value
                .get("updates")
                .and_then(|u| u.as_array())
                .cloned()
                .unwrap_or_default()
        };
        Ok(updates)
    }
}

#[async_trait]
impl RegulatorySource for FcaRegulatorySource {
    fn common(&self) -> &SourceCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut SourceCommon {
        &mut self.common
    }

    async fn initialize(&mut self) -> RegiaResult<bool> {
        self.load_cursor().await;
        let reachable = self.test_connectivity().await;
        info!(
            source_id = self.common.source_id.as_str(),
            reachable,
            cursor = self.last_update_timestamp.as_deref().unwrap_or("none"),
            "FCA source initialized"
        );
        Ok(reachable)
    }

    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
        self.common.mark_checked();

        let mut headers = HashMap::new();
        if let Some(api_key) = &self.settings.api_key {
            headers.insert("Authorization".to_string(), format!("Bearer {}", api_key));
        }

        let response = match self.http.get(&self.updates_url(), &headers).await {
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
                reason: format!("updates endpoint returned {}", response.status_code),
            });
        }

        let updates = match Self::parse_updates(&response.body) {
            Ok(updates) => updates,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        let changes = self.ingest_updates(&updates).await;
        self.common.record_success();
        if !changes.is_empty() {
            info!(
                source_id = self.common.source_id.as_str(),
                changes = changes.len(),
                "new FCA updates detected"
            );
        }
        Ok(changes)
    }

    fn configuration(&self) -> serde_json::Value {
        let mut config = self
            .common
            .configuration_base(&self.settings.base_url, self.check_interval());
        config["has_api_key"] = serde_json::json!(self.settings.api_key.is_some());
        config
    }

    async fn test_connectivity(&self) -> bool {
        match self.http.get(&self.settings.base_url, &HashMap::new()).await {
            Ok(response) => status_reachable(response.status_code),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemorySourceStateStore;
    use regia_core::HttpSettings;
    use serde_json::json;

    fn source() -> FcaRegulatorySource {
        let http = Arc::new(HttpClient::new(&HttpSettings::default()).unwrap());
        FcaRegulatorySource::new(
            FcaSettings::default(),
            http,
            Arc::new(InMemorySourceStateStore::new()),
        )
    }

    fn update(timestamp: &str, update_type: &str, title: &str) -> Value {
        json!({
            "timestamp": timestamp,
            "type": update_type,
            "title": title,
            "description": "Firms must update compliance procedures",
            "url": "https://www.fca.org.uk/news/1"
        })
    }

    #[tokio::test]
    async fn test_timestamp_cursor_dedup() {
        let mut source = source();

        let first = source
            .ingest_updates(&[
                update("2025-01-06T09:00:00Z", "guidance", "Conduct guidance"),
                update("2025-01-06T10:00:00Z", "rule_change", "New conduct rule"),
            ])
            .await;
        assert_eq!(first.len(), 2);
        assert_eq!(
            source.last_update_timestamp.as_deref(),
            Some("2025-01-06T10:00:00Z")
        );

        // Re-delivery of the same batch yields nothing.
        let replay = source
            .ingest_updates(&[update("2025-01-06T10:00:00Z", "rule_change", "New conduct rule")])
            .await;
        assert!(replay.is_empty());

        let newer = source
            .ingest_updates(&[update("2025-01-06T11:00:00Z", "policy", "Policy statement")])
            .await;
        assert_eq!(newer.len(), 1);
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let mut source = source();
        let changes = source
            .ingest_updates(&[update("2025-01-06T09:00:00Z", "rule_change", "New rule")])
            .await;
        let change = &changes[0];
        assert_eq!(change.metadata().regulatory_body, "FCA");
        assert_eq!(change.metadata().document_type, "rule_change");
        assert_eq!(
            change.metadata().custom_fields.get("severity"),
            Some(&"HIGH".to_string())
        );
        assert_eq!(change.source_id(), "fca_regulatory");
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(
            FcaRegulatorySource::determine_severity("emergency"),
            RegulatoryImpact::High
        );
        assert_eq!(
            FcaRegulatorySource::determine_severity("rule_change"),
            RegulatoryImpact::High
        );
        assert_eq!(
            FcaRegulatorySource::determine_severity("policy"),
            RegulatoryImpact::Medium
        );
        assert_eq!(
            FcaRegulatorySource::determine_severity("GUIDANCE"),
            RegulatoryImpact::Medium
        );
        assert_eq!(
            FcaRegulatorySource::determine_severity("announcement"),
            RegulatoryImpact::Low
        );
    }

    #[test]
    fn test_parse_updates_shapes() {
        let wrapped = json!({"updates": [{"timestamp": "t"}]}).to_string();
        assert_eq!(FcaRegulatorySource::parse_updates(&wrapped).unwrap().len(), 1);
        let bare = json!([{"timestamp": "t"}]).to_string();
        assert_eq!(FcaRegulatorySource::parse_updates(&bare).unwrap().len(), 1);
        assert!(FcaRegulatorySource::parse_updates("bad").is_err());
    }

    #[tokio::test]
    async fn test_updates_without_timestamp_skipped() {
        let mut source = source();
        let changes = source
            .ingest_updates(&[json!({"title": "No timestamp"})])
            .await;
        assert!(changes.is_empty());
        assert!(source.last_update_timestamp.is_none());
    }
}
