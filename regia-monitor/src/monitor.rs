use chrono::{DateTime, Utc};
use regia_core::{MonitorSettings, RegiaResult, RegulatoryChange};
use regia_detector::ChangeDetector;
use regia_events::{Event, EventBus, EventCategory, EventPriority};
use regia_http::HttpClient;
use regia_kb::RegulatoryKnowledgeBase;
use regia_sources::{build_source_from_config, RegulatorySource, SourceStateStore};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringStatus {
    Initializing,
    Active,
    Paused,
    Error,
    Shutdown,
}

impl MonitoringStatus {
    fn as_u8(self) -> u8 {
        match self {
            MonitoringStatus::Initializing => 0,
            MonitoringStatus::Active => 1,
            MonitoringStatus::Paused => 2,
            MonitoringStatus::Error => 3,
            MonitoringStatus::Shutdown => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => MonitoringStatus::Active,
            2 => MonitoringStatus::Paused,
            3 => MonitoringStatus::Error,
            4 => MonitoringStatus::Shutdown,
            _ => MonitoringStatus::Initializing,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonitoringStatus::Initializing => "INITIALIZING",
            MonitoringStatus::Active => "ACTIVE",
            MonitoringStatus::Paused => "PAUSED",
            MonitoringStatus::Error => "ERROR",
            MonitoringStatus::Shutdown => "SHUTDOWN",
        }
    }
}

#[derive(Default)]
struct MonitorStats {
    sources_checked: HashMap<String, u64>,
    changes_detected: HashMap<String, u64>,
    errors_encountered: HashMap<String, u64>,
    last_successful_check: Option<DateTime<Utc>>,
}

struct MonitorInner {
    settings: MonitorSettings,
    sources: AsyncMutex<HashMap<String, Box<dyn RegulatorySource>>>,
    knowledge_base: Arc<RegulatoryKnowledgeBase>,
    detector: Arc<ChangeDetector>,
    bus: Arc<EventBus>,
    status: AtomicU8,
    should_stop: AtomicBool,
    stop: Notify,
    stats: Mutex<MonitorStats>,
}

impl MonitorInner {
    fn set_status(&self, status: MonitoringStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    fn status(&self) -> MonitoringStatus {
        MonitoringStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    async fn run_cycle(&self, force: bool) {
        let mut sources = self.sources.lock().await;
        for (source_id, source) in sources.iter_mut() {
            if self.should_stop.load(Ordering::SeqCst) {
                break;
            }
            if !force && !source.should_check() {
                continue;
            }
            self.check_source(source_id, source).await;
        }
    }

    async fn check_source(&self, source_id: &str, source: &mut Box<dyn RegulatorySource>) {
        {
            let mut stats = self.stats.lock().expect("stats lock");
            *stats
                .sources_checked
                .entry(source_id.to_string())
                .or_insert(0) += 1;
        }

        match source.check_for_changes().await {
            Ok(changes) => {
                let emitted = self.process_changes(source_id, changes).await;
                let mut stats = self.stats.lock().expect("stats lock");
                *stats
                    .changes_detected
                    .entry(source_id.to_string())
                    .or_insert(0) += emitted;
                stats.last_successful_check = Some(Utc::now());
            }
            Err(e) => {
                warn!(source_id, error = %e, "source check failed");
                {
                    let mut stats = self.stats.lock().expect("stats lock");
                    *stats
                        .errors_encountered
                        .entry(source_id.to_string())
                        .or_insert(0) += 1;
                }
                if source.consecutive_failures() >= self.settings.failure_alert_threshold {
                    warn!(
                        source_id,
                        consecutive_failures = source.consecutive_failures(),
                        "source past failure threshold, continuing to poll"
                    );
                }
            }
        }
    }

    /// Content-bearing changes run through the detector against the stored
    /// baseline; everything else passes straight through.
    async fn process_changes(&self, source_id: &str, changes: Vec<RegulatoryChange>) -> u64 {
        let mut emitted = 0u64;

        for change in changes {
            let outgoing = self.expand_change(source_id, change);
            for mut change in outgoing {
                change.metadata_mut().custom_fields.remove("raw_content");
                let change_id = change.change_id().to_string();

                match self
                    .knowledge_base
                    .store_regulatory_change(change.clone())
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(source_id, change_id = change_id.as_str(), "change rejected by knowledge base");
                        continue;
                    }
                    Err(e) => {
                        error!(source_id, change_id = change_id.as_str(), error = %e, "change store failed");
                        continue;
                    }
                }

                self.knowledge_base.pin_change(&change_id);
                let event = Event::new(
                    EventCategory::RegulatoryChangeDetected,
                    source_id,
                    "regulatory_change",
                    change.to_json(),
                    Self::priority_for(&change),
                );
                if !self.bus.publish(event) {
                    warn!(source_id, change_id = change_id.as_str(), "change event publish failed");
                }
                self.knowledge_base.unpin_change(&change_id);

                emitted += 1;
            }
        }

        emitted
    }

    fn expand_change(&self, source_id: &str, change: RegulatoryChange) -> Vec<RegulatoryChange> {
        let Some(raw_content) = change.metadata().custom_fields.get("raw_content").cloned() else {
            return vec![change];
        };

        let baseline = self.detector.get_baseline_content(source_id);
        self.detector
            .update_baseline_content(source_id, &raw_content, change.metadata());

        match baseline {
            None => vec![change],
            Some(baseline) => {
                let result = self.detector.detect_changes(
                    source_id,
                    &baseline,
                    &raw_content,
                    change.metadata(),
                );
                debug!(
                    source_id,
                    method = result.method.as_str(),
                    confidence = result.confidence,
                    detected = result.detected_changes.len(),
                    "detector pass complete"
                );
                if result.has_changes {
                    result.detected_changes
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn priority_for(change: &RegulatoryChange) -> EventPriority {
        match change
            .metadata()
            .custom_fields
            .get("severity")
            .map(String::as_str)
        {
            Some("CRITICAL") => EventPriority::Urgent,
            Some("HIGH") => EventPriority::High,
            _ => EventPriority::Normal,
        }
    }
}

async fn monitoring_loop(inner: Arc<MonitorInner>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "monitoring loop started");
    loop {
        if inner.should_stop.load(Ordering::SeqCst) {
            break;
        }
        if inner.status() != MonitoringStatus::Paused {
            inner.run_cycle(false).await;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = inner.stop.notified() => break,
        }
    }
    info!("monitoring loop stopped");
}

/// Drives all registered sources on their schedules, feeds detected changes
/// into the knowledge base and publishes them on the event bus. Sources are
/// owned here; the bus and knowledge base are collaborators.
pub struct RegulatoryMonitor {
    inner: Arc<MonitorInner>,
    http: Arc<HttpClient>,
    state_store: Arc<dyn SourceStateStore>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RegulatoryMonitor {
    pub fn new(
        settings: MonitorSettings,
        knowledge_base: Arc<RegulatoryKnowledgeBase>,
        detector: Arc<ChangeDetector>,
        bus: Arc<EventBus>,
        http: Arc<HttpClient>,
        state_store: Arc<dyn SourceStateStore>,
    ) -> Self {
        let inner = MonitorInner {
            settings,
            sources: AsyncMutex::new(HashMap::new()),
            knowledge_base,
            detector,
            bus,
            status: AtomicU8::new(MonitoringStatus::Initializing.as_u8()),
            should_stop: AtomicBool::new(false),
            stop: Notify::new(),
            stats: Mutex::new(MonitorStats::default()),
        };
        Self {
            inner: Arc::new(inner),
            http,
            state_store,
            task: Mutex::new(None),
        }
    }

    /// Registers an already-constructed source. Its `initialize` is invoked;
    /// an unreachable source is still registered and retried on schedule.
    pub async fn add_source(&self, mut source: Box<dyn RegulatorySource>) -> RegiaResult<bool> {
        let reachable = source.initialize().await?;
        let source_id = source.source_id().to_string();
        let mut sources = self.inner.sources.lock().await;
        if sources.contains_key(&source_id) {
            return Err(regia_core::RegiaError::ValidationError {
                field: "source_id".to_string(),
                message: format!("source {} already registered", source_id),
            });
        }
        sources.insert(source_id.clone(), source);
        info!(source_id = source_id.as_str(), reachable, "source registered");
        Ok(reachable)
    }

    pub async fn add_custom_source(&self, config: &serde_json::Value) -> RegiaResult<bool> {
        let source = build_source_from_config(config, self.http.clone(), self.state_store.clone())?;
        self.add_source(source).await
    }

    pub async fn remove_source(&self, source_id: &str) -> bool {
        let removed = self.inner.sources.lock().await.remove(source_id).is_some();
        if removed {
            info!(source_id, "source removed");
        }
        removed
    }

    pub async fn active_sources(&self) -> Vec<String> {
        let sources = self.inner.sources.lock().await;
        sources
            .iter()
            .filter(|(_, source)| source.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn start_monitoring(&self) -> bool {
        let mut task = self.task.lock().expect("task lock");
        if task.is_some() {
            return false;
        }
        self.inner.should_stop.store(false, Ordering::SeqCst);
        self.inner.set_status(MonitoringStatus::Active);
        let interval = Duration::from_secs(self.inner.settings.check_interval_secs.max(1));
        *task = Some(tokio::spawn(monitoring_loop(self.inner.clone(), interval)));
        true
    }

    pub async fn stop_monitoring(&self) {
        self.inner.should_stop.store(true, Ordering::SeqCst);
        self.inner.stop.notify_waiters();
        let task = {
            let mut task = self.task.lock().expect("task lock");
            task.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
        self.inner.set_status(MonitoringStatus::Shutdown);
    }

    pub fn pause_monitoring(&self) {
        self.inner.set_status(MonitoringStatus::Paused);
    }

    pub fn resume_monitoring(&self) {
        self.inner.set_status(MonitoringStatus::Active);
    }

    pub fn status(&self) -> MonitoringStatus {
        self.inner.status()
    }

    /// Runs one cycle over every source immediately, ignoring schedules.
    pub async fn force_check_all_sources(&self) {
        self.inner.run_cycle(true).await;
    }

    pub async fn source_configurations(&self) -> Vec<serde_json::Value> {
        let sources = self.inner.sources.lock().await;
        sources.values().map(|source| source.configuration()).collect()
    }

    pub fn monitoring_stats(&self) -> serde_json::Value {
        let stats = self.inner.stats.lock().expect("stats lock");
        json!({
            "status": self.inner.status().as_str(),
            "sources_checked": stats.sources_checked,
            "changes_detected": stats.changes_detected,
            "errors_encountered": stats.errors_encountered,
            "last_successful_check": stats
                .last_successful_check
                .map(|t| t.timestamp_millis()),
        })
    }
}
