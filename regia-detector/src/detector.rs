use crate::categorize::analyze_chunks;
use crate::diff::{compute_diff, group_chunks, split_lines, DiffChunk};
use crate::normalize::Normalizer;
use crate::semantic::semantic_change_score;
use chrono::{DateTime, Utc};
use lru::LruCache;
use regia_core::{
    extract_regulatory_terms, sha256_hex, DetectorSettings, RegulatoryChange,
    RegulatoryChangeMetadata,
};
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Regulators whose documents pass the significance gate on relaxed
/// thresholds.
const HIGH_PRIORITY_BODIES: &[&str] = &["SEC", "FCA", "ECB", "FINRA", "CFTC", "FDIC", "FRB"];

#[derive(Debug, Clone)]
pub struct ChangeDetectionResult {
    pub has_changes: bool,
    pub detected_changes: Vec<RegulatoryChange>,
    pub method: String,
    pub confidence: f64,
    pub processing_time: Duration,
}

impl ChangeDetectionResult {
    fn no_change(method: &str, confidence: f64, started: Instant) -> Self {
        Self {
            has_changes: false,
            detected_changes: Vec::new(),
            method: method.to_string(),
            confidence,
            processing_time: started.elapsed(),
        }
    }
}

#[derive(Debug, Clone)]
struct Baseline {
    content_hash: String,
    content: String,
    metadata: RegulatoryChangeMetadata,
}

/// Multi-phase change detector: normalization, hash comparison, structural
/// (Myers) diff, semantic scoring and category roll-up. Baselines are held in
/// an LRU-bounded store keyed by source id.
pub struct ChangeDetector {
    settings: DetectorSettings,
    normalizer: Normalizer,
    baselines: Mutex<LruCache<String, Baseline>>,
    total_detections: AtomicUsize,
    hash_based_detections: AtomicUsize,
    structural_detections: AtomicUsize,
    semantic_detections: AtomicUsize,
    false_positives: AtomicUsize,
    last_detection_time: Mutex<Option<DateTime<Utc>>>,
}

impl ChangeDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        let normalizer = Normalizer::new(&settings.ignored_patterns);
        let capacity = NonZeroUsize::new(settings.max_baselines.max(1))
            .unwrap_or(NonZeroUsize::new(10_000).unwrap());
        Self {
            settings,
            normalizer,
            baselines: Mutex::new(LruCache::new(capacity)),
            total_detections: AtomicUsize::new(0),
            hash_based_detections: AtomicUsize::new(0),
            structural_detections: AtomicUsize::new(0),
            semantic_detections: AtomicUsize::new(0),
            false_positives: AtomicUsize::new(0),
            last_detection_time: Mutex::new(None),
        }
    }

    pub fn detect_changes(
        &self,
        source_id: &str,
        baseline_content: &str,
        new_content: &str,
        metadata: &RegulatoryChangeMetadata,
    ) -> ChangeDetectionResult {
        let started = Instant::now();
        self.total_detections.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_detection_time.lock() {
            *last = Some(Utc::now());
        }

        let baseline_norm = self.normalizer.normalize(baseline_content);
        let new_norm = self.normalizer.normalize(new_content);

        if new_norm.len() < self.settings.min_content_length {
            debug!(source_id, "content below minimum length, skipping");
            return ChangeDetectionResult::no_change("skipped_short_content", 1.0, started);
        }

        if sha256_hex(&baseline_norm) == sha256_hex(&new_norm) {
            self.hash_based_detections.fetch_add(1, Ordering::Relaxed);
            return ChangeDetectionResult::no_change("hash_based", 1.0, started);
        }

        let baseline_lines = split_lines(&baseline_norm);
        let new_lines = split_lines(&new_norm);
        let edits = compute_diff(&baseline_lines, &new_lines);
        let chunks: Vec<DiffChunk> = group_chunks(&edits)
            .into_iter()
            .filter(|chunk| chunk.significance_score > 0.1)
            .collect();

        if chunks.is_empty() {
            self.false_positives.fetch_add(1, Ordering::Relaxed);
            return ChangeDetectionResult::no_change("structural_analysis", 0.5, started);
        }

        let semantic_score = semantic_change_score(&baseline_norm, &new_norm);

        if !self.changes_significant(&chunks, metadata) {
            self.false_positives.fetch_add(1, Ordering::Relaxed);
            debug!(
                source_id,
                chunks = chunks.len(),
                "changes below significance gate"
            );
            return ChangeDetectionResult::no_change("structural_analysis", 0.5, started);
        }

        let structural_confidence = Self::structural_confidence(&chunks);
        let confidence = (0.6 * structural_confidence + 0.4 * semantic_score)
            .clamp(0.0, 1.0)
            .max(0.5);

        let method = if semantic_score >= self.settings.semantic_threshold {
            self.semantic_detections.fetch_add(1, Ordering::Relaxed);
            "semantic_analysis"
        } else {
            self.structural_detections.fetch_add(1, Ordering::Relaxed);
            "structural_analysis"
        };

        let detected_changes = self.build_changes(source_id, &chunks, metadata);

        info!(
            source_id,
            chunks = chunks.len(),
            changes = detected_changes.len(),
            method,
            confidence,
            "regulatory changes detected"
        );

        ChangeDetectionResult {
            has_changes: true,
            detected_changes,
            method: method.to_string(),
            confidence,
            processing_time: started.elapsed(),
        }
    }

    pub fn update_baseline_content(
        &self,
        source_id: &str,
        content: &str,
        metadata: &RegulatoryChangeMetadata,
    ) {
        let normalized = self.normalizer.normalize(content);
        let baseline = Baseline {
            content_hash: sha256_hex(&normalized),
            content: content.to_string(),
            metadata: metadata.clone(),
        };
        if let Ok(mut baselines) = self.baselines.lock() {
            baselines.put(source_id.to_string(), baseline);
        }
    }

    pub fn get_baseline_content(&self, source_id: &str) -> Option<String> {
        self.baselines
            .lock()
            .ok()
            .and_then(|mut baselines| baselines.get(source_id).map(|b| b.content.clone()))
    }

    pub fn get_baseline_metadata(&self, source_id: &str) -> Option<RegulatoryChangeMetadata> {
        self.baselines
            .lock()
            .ok()
            .and_then(|mut baselines| baselines.get(source_id).map(|b| b.metadata.clone()))
    }

    pub fn get_baseline_hash(&self, source_id: &str) -> Option<String> {
        self.baselines
            .lock()
            .ok()
            .and_then(|mut baselines| baselines.get(source_id).map(|b| b.content_hash.clone()))
    }

    pub fn clear_baselines(&self) {
        if let Ok(mut baselines) = self.baselines.lock() {
            baselines.clear();
        }
    }

    pub fn detection_stats(&self) -> serde_json::Value {
        let baseline_count = self
            .baselines
            .lock()
            .map(|baselines| baselines.len())
            .unwrap_or(0);
        let last_detection = self
            .last_detection_time
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.timestamp_millis()));
        json!({
            "total_detections": self.total_detections.load(Ordering::Relaxed),
            "hash_based_detections": self.hash_based_detections.load(Ordering::Relaxed),
            "structural_detections": self.structural_detections.load(Ordering::Relaxed),
            "semantic_detections": self.semantic_detections.load(Ordering::Relaxed),
            "false_positives": self.false_positives.load(Ordering::Relaxed),
            "baseline_count": baseline_count,
            "last_detection_time": last_detection,
        })
    }

    /// Multi-factor significance gate; high-priority regulators get relaxed
    /// thresholds.
    fn changes_significant(&self, chunks: &[DiffChunk], metadata: &RegulatoryChangeMetadata) -> bool {
        let change_count = chunks.len();
        let max_change_chars = chunks
            .iter()
            .map(DiffChunk::max_line_chars)
            .max()
            .unwrap_or(0);
        let total_chars: usize = chunks.iter().map(DiffChunk::changed_chars).sum();

        let combined_text = chunks
            .iter()
            .map(DiffChunk::changed_text)
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();
        let keyword_occurrences: usize = extract_regulatory_terms(&combined_text)
            .iter()
            .map(|term| combined_text.matches(term.as_str()).count())
            .sum();

        let high_priority = HIGH_PRIORITY_BODIES
            .iter()
            .any(|body| metadata.regulatory_body.eq_ignore_ascii_case(body));

        if high_priority {
            change_count >= 2
                || max_change_chars > 50
                || total_chars > 200
                || keyword_occurrences >= 2
        } else {
            change_count >= 5
                || max_change_chars > 100
                || total_chars > 500
                || keyword_occurrences >= 3
        }
    }

    fn structural_confidence(chunks: &[DiffChunk]) -> f64 {
        if chunks.is_empty() {
            return 0.0;
        }
        let avg_significance =
            chunks.iter().map(|c| c.significance_score).sum::<f64>() / chunks.len() as f64;
        let volume_factor = 0.7 + 0.3 * (chunks.len() as f64 / 5.0).min(1.0);
        (avg_significance * volume_factor).clamp(0.0, 1.0)
    }

    fn build_changes(
        &self,
        source_id: &str,
        chunks: &[DiffChunk],
        metadata: &RegulatoryChangeMetadata,
    ) -> Vec<RegulatoryChange> {
        let content_url = metadata
            .custom_fields
            .get("content_url")
            .cloned()
            .unwrap_or_default();

        analyze_chunks(chunks)
            .into_iter()
            .map(|summary| {
                let mut change_metadata = metadata.clone();
                for keyword in ["structural_change", summary.category.as_str()] {
                    if !change_metadata.keywords.iter().any(|k| k == keyword) {
                        change_metadata.keywords.push(keyword.to_string());
                    }
                }
                if summary.impact_score > 0.7
                    && !change_metadata.keywords.iter().any(|k| k == "high_impact")
                {
                    change_metadata.keywords.push("high_impact".to_string());
                }
                change_metadata
                    .custom_fields
                    .insert("change_details".to_string(), summary.details.join(" || "));
                change_metadata.custom_fields.insert(
                    "impact_score".to_string(),
                    format!("{:.3}", summary.impact_score),
                );

                RegulatoryChange::new(source_id, summary.title, content_url.clone(), change_metadata)
            })
            .collect()
    }
}
