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

const CURSOR_KEY: &str = "last_processed_accession";

/// Form types that carry regulatory significance; everything else in the
/// filing stream is ignored.
const REGULATORY_FORM_TYPES: &[&str] = &["8-K", "10-K", "10-Q", "20-F", "6-K", "S-1", "S-3", "8-A12B"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecEdgarSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for SecEdgarSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.sec-api.io".to_string(),
            api_key: None,
        }
    }
}

/// SEC EDGAR filing stream. Dedup relies on accession numbers increasing in
/// issuance order; the cursor is the highest accession already processed.
pub struct SecEdgarSource {
    common: SourceCommon,
    http: Arc<HttpClient>,
    settings: SecEdgarSettings,
    last_processed_accession: Option<String>,
}

impl SecEdgarSource {
    pub fn new(
        settings: SecEdgarSettings,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            common: SourceCommon::new(
                "sec_edgar",
                "SEC EDGAR API",
                RegulatorySourceKind::SecEdgar,
                state_store,
            ),
            http,
            settings,
            last_processed_accession: None,
        }
    }

    fn filings_url(&self) -> String {
        match &self.settings.api_key {
            Some(api_key) => format!(
                "{}/filings/current?api_key={}",
                self.settings.base_url, api_key
            ),
            None => format!("{}/filings/current", self.settings.base_url),
        }
    }

    pub fn determine_severity(form_type: &str) -> RegulatoryImpact {
        match form_type {
            "8-K" => RegulatoryImpact::High,
            "10-K" | "10-Q" => RegulatoryImpact::Medium,
            _ => RegulatoryImpact::Low,
        }
    }

    fn is_regulatory_filing(form_type: &str) -> bool {
        REGULATORY_FORM_TYPES.contains(&form_type)
    }

    fn is_new_filing(&self, accession: &str) -> bool {
        match &self.last_processed_accession {
            Some(cursor) => accession > cursor.as_str(),
            None => true,
        }
    }

    fn process_filing(&self, filing: &Value) -> Option<RegulatoryChange> {
        let form_type = filing.get("formType").and_then(|v| v.as_str())?;
        if !Self::is_regulatory_filing(form_type) {
            return None;
        }

        let company = filing
            .get("companyName")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Entity");
        let description = filing
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let url = filing
            .get("linkToFilingDetails")
            .or_else(|| filing.get("url"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let accession = filing.get("accessionNumber").and_then(|v| v.as_str())?;

        let combined = format!("{} {} {}", company, form_type, description);
        let mut custom_fields = HashMap::new();
        custom_fields.insert(
            "severity".to_string(),
            Self::determine_severity(form_type).as_str().to_string(),
        );
        custom_fields.insert("accession_number".to_string(), accession.to_string());
        if let Some(filed_at) = filing.get("filedAt").and_then(|v| v.as_str()) {
            custom_fields.insert("filed_at".to_string(), filed_at.to_string());
        }

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: "SEC".to_string(),
            document_type: form_type.to_string(),
            document_number: accession.to_string(),
            keywords: extract_keywords_from_text(&combined),
            affected_entities: vec![company.to_string()],
            custom_fields,
        };

        Some(RegulatoryChange::new(
            self.common.source_id.clone(),
            format!("{}: {}", form_type, company),
            url,
            metadata,
        ))
    }

    /// Reloads the persisted accession cursor.
    pub async fn load_cursor(&mut self) {
        let cursor = self.common.load_state(CURSOR_KEY, "").await;
        if !cursor.is_empty() {
            self.last_processed_accession = Some(cursor);
        }
    }

    /// Cursor comparison and change construction, separated from the fetch so
    /// the dedup logic is testable without a network.
    pub async fn ingest_filings(&mut self, filings: &[Value]) -> Vec<RegulatoryChange> {
        let mut changes = Vec::new();
        let mut max_accession = self.last_processed_accession.clone();

        for filing in filings {
            let Some(accession) = filing.get("accessionNumber").and_then(|v| v.as_str()) else {
                continue;
            };
            if !self.is_new_filing(accession) {
                debug!(accession, "filing already processed");
                continue;
            }
            if max_accession.as_deref().map(|m| accession > m).unwrap_or(true) {
                max_accession = Some(accession.to_string());
            }
            if let Some(change) = self.process_filing(filing) {
                changes.push(change);
            }
        }

        if max_accession != self.last_processed_accession {
            if let Some(cursor) = &max_accession {
                self.common.persist_state(CURSOR_KEY, cursor).await;
            }
            self.last_processed_accession = max_accession;
        }

        changes
    }

    fn parse_filings(body: &str) -> RegiaResult<Vec<Value>> {
        let value: Value = serde_json::from_str(body).map_err(|e| RegiaError::ParseError {
            content_type: "json".to_string(),
            reason: e.to_string(),
        })?;
        let filings = if let Some(array) = value.as_array() {
            array.clone()
        } else {
            value
                .get("filings")
                .and_then(|f| f.as_array())
                .cloned()
                .unwrap_or_default()
        };
        Ok(filings)
    }
}

#[async_trait]
impl RegulatorySource for SecEdgarSource {
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
            cursor = self.last_processed_accession.as_deref().unwrap_or("none"),
            "SEC EDGAR source initialized"
        );
        Ok(reachable)
    }

    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
        self.common.mark_checked();

        let response = match self.http.get(&self.filings_url(), &HashMap::new()).await {
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
                reason: format!("filings endpoint returned {}", response.status_code),
            });
        }

        let filings = match Self::parse_filings(&response.body) {
            Ok(filings) => filings,
            Err(e) => {
                self.common.record_failure();
                return Err(e);
            }
        };

        let changes = self.ingest_filings(&filings).await;
        self.common.record_success();
        if !changes.is_empty() {
            info!(
                source_id = self.common.source_id.as_str(),
                changes = changes.len(),
                "new SEC filings detected"
            );
        }
        Ok(changes)
    }

    fn configuration(&self) -> serde_json::Value {
        let mut config = self
            .common
            .configuration_base(&self.settings.base_url, self.check_interval());
        config["has_api_key"] = serde_json::json!(self.settings.api_key.is_some());
        config["form_types"] = serde_json::json!(REGULATORY_FORM_TYPES);
        config
    }

    async fn test_connectivity(&self) -> bool {
        match self.http.get(&self.settings.base_url, &HashMap::new()).await {
            Ok(response) => status_reachable(response.status_code),
            Err(_) => false,
        }
    }

    fn check_interval(&self) -> Duration {
        Duration::from_secs(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemorySourceStateStore;
    use regia_core::HttpSettings;
    use serde_json::json;

    fn source_with_store(store: Arc<InMemorySourceStateStore>) -> SecEdgarSource {
        let http = Arc::new(HttpClient::new(&HttpSettings::default()).unwrap());
        SecEdgarSource::new(SecEdgarSettings::default(), http, store)
    }

    fn filing(accession: &str, form_type: &str, company: &str) -> Value {
        json!({
            "accessionNumber": accession,
            "formType": form_type,
            "companyName": company,
            "description": "Material definitive agreement on capital requirements",
            "linkToFilingDetails": format!("https://www.sec.gov/{}", accession),
            "filedAt": "2025-01-06"
        })
    }

    #[tokio::test]
    async fn test_ingest_filters_form_types() {
        let store = Arc::new(InMemorySourceStateStore::new());
        let mut source = source_with_store(store);
        let filings = vec![
            filing("0001-25-000001", "8-K", "Alpha Corp"),
            filing("0001-25-000002", "13F", "Beta Fund"),
            filing("0001-25-000003", "10-Q", "Gamma Bank"),
        ];
        let changes = source.ingest_filings(&filings).await;
        assert_eq!(changes.len(), 2);
        assert!(changes[0].title().contains("8-K"));
        assert!(changes[1].title().contains("10-Q"));
        assert_eq!(changes[0].metadata().regulatory_body, "SEC");
        assert_eq!(
            changes[0].metadata().custom_fields.get("severity"),
            Some(&"HIGH".to_string())
        );
        assert_eq!(
            changes[1].metadata().custom_fields.get("severity"),
            Some(&"MEDIUM".to_string())
        );
    }

    #[tokio::test]
    async fn test_cursor_dedup_within_instance() {
        let store = Arc::new(InMemorySourceStateStore::new());
        let mut source = source_with_store(store);

        let first = source
            .ingest_filings(&[filing("0001-25-000001", "8-K", "Alpha Corp")])
            .await;
        assert_eq!(first.len(), 1);

        // Same accession again: already processed.
        let repeat = source
            .ingest_filings(&[filing("0001-25-000001", "8-K", "Alpha Corp")])
            .await;
        assert!(repeat.is_empty());

        let newer = source
            .ingest_filings(&[filing("0001-25-000002", "8-K", "Alpha Corp")])
            .await;
        assert_eq!(newer.len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_survives_restart() {
        let store = Arc::new(InMemorySourceStateStore::new());

        let mut source = source_with_store(store.clone());
        source
            .ingest_filings(&[filing("0001-25-000001", "8-K", "Alpha Corp")])
            .await;
        let second = source
            .ingest_filings(&[filing("0001-25-000002", "10-K", "Beta Corp")])
            .await;
        assert_eq!(second.len(), 1);

        // Simulate a restart: fresh source instance, same state store.
        let mut restarted = source_with_store(store.clone());
        restarted.load_cursor().await;
        assert_eq!(
            restarted.last_processed_accession.as_deref(),
            Some("0001-25-000002")
        );

        let replayed = restarted
            .ingest_filings(&[filing("0001-25-000002", "10-K", "Beta Corp")])
            .await;
        assert!(replayed.is_empty(), "cursor must suppress replayed filings");
    }

    #[tokio::test]
    async fn test_non_regulatory_filing_advances_cursor() {
        let store = Arc::new(InMemorySourceStateStore::new());
        let mut source = source_with_store(store);
        let changes = source
            .ingest_filings(&[filing("0001-25-000009", "13F", "Beta Fund")])
            .await;
        assert!(changes.is_empty());
        assert_eq!(
            source.last_processed_accession.as_deref(),
            Some("0001-25-000009")
        );
    }

    #[test]
    fn test_severity_table() {
        assert_eq!(
            SecEdgarSource::determine_severity("8-K"),
            RegulatoryImpact::High
        );
        assert_eq!(
            SecEdgarSource::determine_severity("10-K"),
            RegulatoryImpact::Medium
        );
        assert_eq!(
            SecEdgarSource::determine_severity("10-Q"),
            RegulatoryImpact::Medium
        );
        assert_eq!(
            SecEdgarSource::determine_severity("S-1"),
            RegulatoryImpact::Low
        );
    }

    #[test]
    fn test_parse_filings_shapes() {
        let wrapped = json!({"filings": [{"accessionNumber": "1"}]}).to_string();
        assert_eq!(SecEdgarSource::parse_filings(&wrapped).unwrap().len(), 1);

        let bare = json!([{"accessionNumber": "1"}]).to_string();
        assert_eq!(SecEdgarSource::parse_filings(&bare).unwrap().len(), 1);

        let empty = json!({"other": 1}).to_string();
        assert!(SecEdgarSource::parse_filings(&empty).unwrap().is_empty());

        assert!(SecEdgarSource::parse_filings("nope").is_err());
    }

    #[test]
    fn test_filings_url_with_api_key() {
        let store = Arc::new(InMemorySourceStateStore::new());
        let http = Arc::new(HttpClient::new(&HttpSettings::default()).unwrap());
        let with_key = SecEdgarSource::new(
            SecEdgarSettings {
                base_url: "https://api.example.com".to_string(),
                api_key: Some("secret".to_string()),
            },
            http.clone(),
            store.clone(),
        );
        assert_eq!(
            with_key.filings_url(),
            "https://api.example.com/filings/current?api_key=secret"
        );

        let without_key = SecEdgarSource::new(
            SecEdgarSettings {
                base_url: "https://api.example.com".to_string(),
                api_key: None,
            },
            http,
            store,
        );
        assert_eq!(
            without_key.filings_url(),
            "https://api.example.com/filings/current"
        );
    }
}
