use crate::errors::{RegiaError, RegiaResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "REGIA-RI/1.0 (regulatory-intelligence; contact@regia.dev)".to_string(),
            timeout_secs: 30,
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub semantic_threshold: f64,
    pub min_content_length: usize,
    pub max_baselines: usize,
    pub ignored_patterns: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            semantic_threshold: 0.3,
            min_content_length: 50,
            max_baselines: 10_000,
            ignored_patterns: vec![
                r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?".to_string(),
                r"(?i)page \d+ of \d+".to_string(),
                r"(?i)copyright\s+(\(c\)\s*)?\d{4}[^\n]*".to_string(),
                r"(?i)\b(version|revision|rev\.)\s*[:#]?\s*[\w.-]+".to_string(),
                r"(?is)<script[^>]*>.*?</script>".to_string(),
                r"(?is)<style[^>]*>.*?</style>".to_string(),
                r"(?s)<!--.*?-->".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusSettings {
    pub max_queue_size: usize,
    pub worker_threads: usize,
    pub event_ttl_secs: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    pub dead_letter_interval_secs: u64,
    pub cleanup_interval_secs: u64,
}

impl Default for EventBusSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            worker_threads: 4,
            event_ttl_secs: 3600,
            batch_size: 100,
            max_retries: 3,
            dead_letter_interval_secs: 30,
            cleanup_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseSettings {
    pub max_changes_in_memory: usize,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for KnowledgeBaseSettings {
    fn default() -> Self {
        Self {
            max_changes_in_memory: 10_000,
            snapshot_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub check_interval_secs: u64,
    pub failure_alert_threshold: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            failure_alert_threshold: 5,
        }
    }
}

/// Top-level settings for an embedded REGIA deployment. Plain values; callers
/// thread these through constructors instead of consulting globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegiaSettings {
    pub http: HttpSettings,
    pub detector: DetectorSettings,
    pub event_bus: EventBusSettings,
    pub knowledge_base: KnowledgeBaseSettings,
    pub monitor: MonitorSettings,
    pub database_url: Option<String>,
}

impl RegiaSettings {
    /// Layers `regia.toml` (optional) under `REGIA__*` environment overrides,
    /// e.g. `REGIA__EVENT_BUS__WORKER_THREADS=8`.
    pub fn load() -> RegiaResult<Self> {
        Self::load_from("regia")
    }

    pub fn load_from(basename: &str) -> RegiaResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(basename).required(false))
            .add_source(config::Environment::with_prefix("REGIA").separator("__"))
            .build()
            .map_err(|e| RegiaError::ConfigurationError {
                parameter: basename.to_string(),
                reason: e.to_string(),
            })?;

        settings
            .try_deserialize()
            .map_err(|e| RegiaError::ConfigurationError {
                parameter: basename.to_string(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let settings = RegiaSettings::default();
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.detector.min_content_length, 50);
        assert_eq!(settings.detector.max_baselines, 10_000);
        assert_eq!(settings.event_bus.max_queue_size, 10_000);
        assert_eq!(settings.event_bus.worker_threads, 4);
        assert_eq!(settings.event_bus.max_retries, 3);
        assert_eq!(settings.event_bus.dead_letter_interval_secs, 30);
        assert_eq!(settings.event_bus.cleanup_interval_secs, 300);
        assert_eq!(settings.knowledge_base.max_changes_in_memory, 10_000);
        assert_eq!(settings.monitor.check_interval_secs, 30);
        assert!(settings.database_url.is_none());
    }

    #[test]
    fn test_ignored_patterns_compile() {
        for pattern in DetectorSettings::default().ignored_patterns {
            assert!(regex::Regex::new(&pattern).is_ok(), "bad pattern: {}", pattern);
        }
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let parsed: RegiaSettings =
            serde_json::from_str(r#"{"http": {"timeout_secs": 5}}"#).unwrap();
        assert_eq!(parsed.http.timeout_secs, 5);
        assert_eq!(parsed.http.requests_per_minute, 60);
        assert_eq!(parsed.event_bus.worker_threads, 4);
    }
}
