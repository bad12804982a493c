use crate::custom_feed::{CustomFeedSettings, CustomFeedSource};
use crate::ecb::{EcbSettings, EcbAnnouncementsSource};
use crate::fca::{FcaRegulatorySource, FcaSettings};
use crate::sec_edgar::{SecEdgarSettings, SecEdgarSource};
use crate::source::{RegulatorySource, RegulatorySourceKind};
use crate::state::SourceStateStore;
use crate::web_scraping::{WebScrapingSettings, WebScrapingSource};
use regia_core::{RegiaError, RegiaResult};
use regia_http::HttpClient;
use std::sync::Arc;

fn settings_from<T: serde::de::DeserializeOwned>(
    kind: RegulatorySourceKind,
    config: &serde_json::Value,
) -> RegiaResult<T> {
    serde_json::from_value(config.clone()).map_err(|e| RegiaError::ConfigurationError {
        parameter: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

/// Constructor dispatch over the closed source kinds; nothing downstream ever
/// needs to downcast.
pub fn build_source(
    kind: RegulatorySourceKind,
    config: &serde_json::Value,
    http: Arc<HttpClient>,
    state_store: Arc<dyn SourceStateStore>,
) -> RegiaResult<Box<dyn RegulatorySource>> {
    match kind {
        RegulatorySourceKind::SecEdgar => {
            let settings: SecEdgarSettings = settings_from(kind, config)?;
            Ok(Box::new(SecEdgarSource::new(settings, http, state_store)))
        }
        RegulatorySourceKind::FcaRegulatory => {
            let settings: FcaSettings = settings_from(kind, config)?;
            Ok(Box::new(FcaRegulatorySource::new(settings, http, state_store)))
        }
        RegulatorySourceKind::EcbAnnouncements => {
            let settings: EcbSettings = settings_from(kind, config)?;
            Ok(Box::new(EcbAnnouncementsSource::new(settings, http, state_store)))
        }
        RegulatorySourceKind::CustomFeed => {
            let settings: CustomFeedSettings = settings_from(kind, config)?;
            Ok(Box::new(CustomFeedSource::new(settings, http, state_store)))
        }
        RegulatorySourceKind::WebScraping => {
            let settings: WebScrapingSettings = settings_from(kind, config)?;
            Ok(Box::new(WebScrapingSource::new(settings, http, state_store)))
        }
    }
}

/// Builds a source from a configuration value carrying its own `kind` field.
pub fn build_source_from_config(
    config: &serde_json::Value,
    http: Arc<HttpClient>,
    state_store: Arc<dyn SourceStateStore>,
) -> RegiaResult<Box<dyn RegulatorySource>> {
    let kind_raw = config
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RegiaError::ConfigurationError {
            parameter: "kind".to_string(),
            reason: "source configuration missing kind".to_string(),
        })?;
    let kind = RegulatorySourceKind::parse(kind_raw).ok_or_else(|| {
        RegiaError::ConfigurationError {
            parameter: "kind".to_string(),
            reason: format!("unknown source kind: {}", kind_raw),
        }
    })?;
    build_source(kind, config, http, state_store)
}
