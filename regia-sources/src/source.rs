use crate::state::SourceStateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regia_core::{RegiaResult, RegulatoryChange};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegulatorySourceKind {
    SecEdgar,
    FcaRegulatory,
    EcbAnnouncements,
    CustomFeed,
    WebScraping,
}

impl RegulatorySourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RegulatorySourceKind::SecEdgar => "sec_edgar",
            RegulatorySourceKind::FcaRegulatory => "fca_regulatory",
            RegulatorySourceKind::EcbAnnouncements => "ecb_announcements",
            RegulatorySourceKind::CustomFeed => "custom_feed",
            RegulatorySourceKind::WebScraping => "web_scraping",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "sec_edgar" => Some(RegulatorySourceKind::SecEdgar),
            "fca_regulatory" => Some(RegulatorySourceKind::FcaRegulatory),
            "ecb_announcements" => Some(RegulatorySourceKind::EcbAnnouncements),
            "custom_feed" => Some(RegulatorySourceKind::CustomFeed),
            "web_scraping" => Some(RegulatorySourceKind::WebScraping),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegulatorySourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State shared by every concrete source: identity, scheduling, failure
/// tracking and the cursor store handle.
pub struct SourceCommon {
    pub source_id: String,
    pub name: String,
    pub kind: RegulatorySourceKind,
    pub active: bool,
    pub last_check_time: Option<DateTime<Utc>>,
    pub consecutive_failures: usize,
    pub state_store: Arc<dyn SourceStateStore>,
}

impl SourceCommon {
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        kind: RegulatorySourceKind,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            kind,
            active: true,
            last_check_time: None,
            consecutive_failures: 0,
            state_store,
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn mark_checked(&mut self) {
        self.last_check_time = Some(Utc::now());
    }

    /// Cursor writes that fail only cost durability; the polling cycle still
    /// succeeds.
    pub async fn persist_state(&self, key: &str, value: &str) {
        if let Err(e) = self
            .state_store
            .persist_state(&self.source_id, key, value)
            .await
        {
            warn!(source_id = self.source_id.as_str(), key, error = %e, "source state write failed");
        }
    }

    pub async fn load_state(&self, key: &str, default: &str) -> String {
        match self.state_store.load_state(&self.source_id, key).await {
            Ok(Some(value)) => value,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(source_id = self.source_id.as_str(), key, error = %e, "source state read failed");
                default.to_string()
            }
        }
    }

    pub fn configuration_base(&self, endpoint: &str, interval: Duration) -> serde_json::Value {
        json!({
            "source_id": self.source_id,
            "name": self.name,
            "kind": self.kind.as_str(),
            "endpoint": endpoint,
            "check_interval_secs": interval.as_secs(),
            "active": self.active,
            "consecutive_failures": self.consecutive_failures,
            "last_check_time": self.last_check_time.map(|t| t.timestamp_millis()),
        })
    }
}

/// One pluggable regulatory poller. Implementations fetch their endpoint,
/// compare against the persisted cursor and emit only strictly-new changes.
#[async_trait]
pub trait RegulatorySource: Send + Sync {
    fn common(&self) -> &SourceCommon;
    fn common_mut(&mut self) -> &mut SourceCommon;

    /// Tests connectivity and loads the persisted cursor.
    async fn initialize(&mut self) -> RegiaResult<bool>;

    /// One polling cycle. Implementations record success/failure on their
    /// common state; an error yields zero changes and never kills the source.
    async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>>;

    fn configuration(&self) -> serde_json::Value;

    async fn test_connectivity(&self) -> bool;

    fn check_interval(&self) -> Duration {
        Duration::from_secs(300)
    }

    fn source_id(&self) -> &str {
        &self.common().source_id
    }

    fn name(&self) -> &str {
        &self.common().name
    }

    fn kind(&self) -> RegulatorySourceKind {
        self.common().kind
    }

    fn is_active(&self) -> bool {
        self.common().active
    }

    fn set_active(&mut self, active: bool) {
        self.common_mut().active = active;
    }

    fn consecutive_failures(&self) -> usize {
        self.common().consecutive_failures
    }

    fn last_check_time(&self) -> Option<DateTime<Utc>> {
        self.common().last_check_time
    }

    fn should_check(&self) -> bool {
        if !self.common().active {
            return false;
        }
        match self.common().last_check_time {
            Some(last) => {
                let elapsed = Utc::now().signed_duration_since(last);
                elapsed.num_seconds() >= self.check_interval().as_secs() as i64
            }
            None => true,
        }
    }
}

/// Connectivity probes treat 200 and 401 as reachable; an auth wall still
/// proves the host is up.
pub fn status_reachable(status_code: u16) -> bool {
    status_code == 200 || status_code == 401
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemorySourceStateStore;

    struct DummySource {
        common: SourceCommon,
    }

    #[async_trait]
    impl RegulatorySource for DummySource {
        fn common(&self) -> &SourceCommon {
            &self.common
        }

        fn common_mut(&mut self) -> &mut SourceCommon {
            &mut self.common
        }

        async fn initialize(&mut self) -> RegiaResult<bool> {
            Ok(true)
        }

        async fn check_for_changes(&mut self) -> RegiaResult<Vec<RegulatoryChange>> {
            self.common.mark_checked();
            Ok(Vec::new())
        }

        fn configuration(&self) -> serde_json::Value {
            self.common.configuration_base("https://example.org", self.check_interval())
        }

        async fn test_connectivity(&self) -> bool {
            true
        }
    }

    fn dummy() -> DummySource {
        DummySource {
            common: SourceCommon::new(
                "dummy",
                "Dummy Source",
                RegulatorySourceKind::CustomFeed,
                Arc::new(InMemorySourceStateStore::new()),
            ),
        }
    }

    #[tokio::test]
    async fn test_should_check_gating() {
        let mut source = dummy();
        assert!(source.should_check());

        source.check_for_changes().await.unwrap();
        // Interval is 300 s, so a just-checked source must wait.
        assert!(!source.should_check());

        source.set_active(false);
        assert!(!source.should_check());
        source.set_active(true);

        source.common_mut().last_check_time =
            Some(Utc::now() - chrono::Duration::seconds(301));
        assert!(source.should_check());
    }

    #[tokio::test]
    async fn test_failure_tracking() {
        let mut source = dummy();
        assert_eq!(source.consecutive_failures(), 0);
        source.common_mut().record_failure();
        source.common_mut().record_failure();
        assert_eq!(source.consecutive_failures(), 2);
        source.common_mut().record_success();
        assert_eq!(source.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_state_round_trip_through_common() {
        let source = dummy();
        assert_eq!(source.common().load_state("cursor", "none").await, "none");
        source.common().persist_state("cursor", "abc").await;
        assert_eq!(source.common().load_state("cursor", "none").await, "abc");
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(
            RegulatorySourceKind::parse("sec_edgar"),
            Some(RegulatorySourceKind::SecEdgar)
        );
        assert_eq!(
            RegulatorySourceKind::parse("WEB_SCRAPING"),
            Some(RegulatorySourceKind::WebScraping)
        );
        assert_eq!(RegulatorySourceKind::parse("bogus"), None);
        assert_eq!(RegulatorySourceKind::SecEdgar.as_str(), "sec_edgar");
    }

    #[test]
    fn test_status_reachable() {
        assert!(status_reachable(200));
        assert!(status_reachable(401));
        assert!(!status_reachable(404));
        assert!(!status_reachable(500));
    }

    #[tokio::test]
    async fn test_configuration_base() {
        let source = dummy();
        let config = source.configuration();
        assert_eq!(config["source_id"], "dummy");
        assert_eq!(config["kind"], "custom_feed");
        assert_eq!(config["check_interval_secs"], 300);
        assert_eq!(config["active"], true);
    }
}
