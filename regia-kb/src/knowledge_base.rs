use crate::postgres::PostgresChangeStore;
use crate::store::BoundedChangeStore;
use chrono::{Duration, Utc};
use regia_core::{
    tokenize, BusinessDomain, ChangeStatus, KnowledgeBaseSettings, RegiaResult, RegulatoryChange,
    RegulatoryImpact,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub regulatory_body: Option<String>,
    pub impact_level: Option<RegulatoryImpact>,
}

#[derive(Default)]
struct KnowledgeIndexes {
    word_index: HashMap<String, HashSet<String>>,
    impact_index: HashMap<i32, HashSet<String>>,
    domain_index: HashMap<i32, HashSet<String>>,
    body_index: HashMap<String, HashSet<String>>,
}

impl KnowledgeIndexes {
    fn add(&mut self, change: &RegulatoryChange) {
        let change_id = change.change_id().to_string();

        let mut words: Vec<String> = tokenize(change.title());
        if let Some(analysis) = change.analysis() {
            words.extend(tokenize(&analysis.executive_summary));
            self.impact_index
                .entry(analysis.impact_level.as_i32())
                .or_default()
                .insert(change_id.clone());
            for domain in &analysis.affected_domains {
                self.domain_index
                    .entry(domain.as_i32())
                    .or_default()
                    .insert(change_id.clone());
            }
        }
        for word in words {
            self.word_index
                .entry(word)
                .or_default()
                .insert(change_id.clone());
        }

        let body = change.metadata().regulatory_body.to_lowercase();
        if !body.is_empty() {
            self.body_index.entry(body).or_default().insert(change_id);
        }
    }

    fn remove(&mut self, change_id: &str) {
        for index in [&mut self.word_index, &mut self.body_index] {
            for ids in index.values_mut() {
                ids.remove(change_id);
            }
            index.retain(|_, ids| !ids.is_empty());
        }
        for index in [&mut self.impact_index, &mut self.domain_index] {
            for ids in index.values_mut() {
                ids.remove(change_id);
            }
            index.retain(|_, ids| !ids.is_empty());
        }
    }

    fn clear(&mut self) {
        self.word_index.clear();
        self.impact_index.clear();
        self.domain_index.clear();
        self.body_index.clear();
    }
}

#[derive(Default)]
struct KnowledgeCounters {
    changes_stored: u64,
    changes_updated: u64,
    searches_performed: u64,
    imports: u64,
    exports: u64,
}

/// Persistent, indexed store of all known regulatory changes. The in-process
/// map is authoritative; the optional Postgres mirror provides durability.
///
/// Lock order: storage, then indexes, then counters. Locks are never held
/// across database awaits.
pub struct RegulatoryKnowledgeBase {
    settings: KnowledgeBaseSettings,
    storage: Mutex<BoundedChangeStore>,
    indexes: Mutex<KnowledgeIndexes>,
    counters: Mutex<KnowledgeCounters>,
    database: Option<PostgresChangeStore>,
}

impl RegulatoryKnowledgeBase {
    pub fn in_memory(settings: KnowledgeBaseSettings) -> Self {
        let capacity = settings.max_changes_in_memory;
        Self {
            settings,
            storage: Mutex::new(BoundedChangeStore::new(capacity)),
            indexes: Mutex::new(KnowledgeIndexes::default()),
            counters: Mutex::new(KnowledgeCounters::default()),
            database: None,
        }
    }

    pub fn with_database(settings: KnowledgeBaseSettings, database: PostgresChangeStore) -> Self {
        let mut kb = Self::in_memory(settings);
        kb.database = Some(database);
        kb
    }

    pub fn settings(&self) -> &KnowledgeBaseSettings {
        &self.settings
    }

    pub async fn store_regulatory_change(&self, change: RegulatoryChange) -> RegiaResult<bool> {
        let change_id = change.change_id().to_string();

        {
            let mut storage = self.storage.lock().expect("storage lock");
            if let Some(existing) = storage.peek(&change_id) {
                if existing.source_id() != change.source_id() {
                    warn!(
                        change_id = change_id.as_str(),
                        existing_source = existing.source_id(),
                        incoming_source = change.source_id(),
                        "rejected change with duplicate id from different source"
                    );
                    return Ok(false);
                }
            }

            let is_update = storage.contains(&change_id);
            let evicted = storage.insert(change.clone());

            let mut indexes = self.indexes.lock().expect("index lock");
            if is_update {
                indexes.remove(&change_id);
            }
            for evicted_id in &evicted {
                indexes.remove(evicted_id);
            }
            indexes.add(&change);
            drop(indexes);

            let mut counters = self.counters.lock().expect("counters lock");
            if is_update {
                counters.changes_updated += 1;
            } else {
                counters.changes_stored += 1;
            }
        }

        if let Some(database) = &self.database {
            if let Err(e) = database.upsert_change(&change).await {
                warn!(change_id = change_id.as_str(), error = %e, "change mirror write failed");
            }
        }

        Ok(true)
    }

    pub async fn get_regulatory_change(&self, change_id: &str) -> Option<RegulatoryChange> {
        {
            let mut storage = self.storage.lock().expect("storage lock");
            if let Some(change) = storage.get(change_id) {
                return Some(change);
            }
        }

        if let Some(database) = &self.database {
            match database.fetch_change(change_id).await {
                Ok(Some(change)) => {
                    let mut storage = self.storage.lock().expect("storage lock");
                    let evicted = storage.insert(change.clone());
                    let mut indexes = self.indexes.lock().expect("index lock");
                    for evicted_id in &evicted {
                        indexes.remove(evicted_id);
                    }
                    indexes.add(&change);
                    return Some(change);
                }
                Ok(None) => {}
                Err(e) => warn!(change_id, error = %e, "change fetch failed"),
            }
        }

        None
    }

    /// Tokenized AND search over title and executive summary, newest first.
    pub fn search_changes(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Vec<RegulatoryChange> {
        if let Ok(mut counters) = self.counters.lock() {
            counters.searches_performed += 1;
        }

        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }

        let storage = self.storage.lock().expect("storage lock");
        let indexes = self.indexes.lock().expect("index lock");

        let mut candidate_ids: Option<HashSet<String>> = None;
        for token in &tokens {
            let ids = indexes.word_index.get(token).cloned().unwrap_or_default();
            candidate_ids = Some(match candidate_ids {
                Some(existing) => existing.intersection(&ids).cloned().collect(),
                None => ids,
            });
        }

        let mut results: Vec<RegulatoryChange> = candidate_ids
            .unwrap_or_default()
            .iter()
            .filter_map(|id| storage.peek(id).cloned())
            .filter(|change| Self::matches_filters(change, filters))
            .collect();

        results.sort_by(|a, b| b.detected_at().cmp(&a.detected_at()));
        results.truncate(limit);
        results
    }

    pub fn get_changes_by_impact(
        &self,
        impact: RegulatoryImpact,
        limit: usize,
    ) -> Vec<RegulatoryChange> {
        self.collect_indexed(limit, |indexes| {
            indexes.impact_index.get(&impact.as_i32()).cloned()
        })
    }

    pub fn get_changes_by_domain(
        &self,
        domain: BusinessDomain,
        limit: usize,
    ) -> Vec<RegulatoryChange> {
        self.collect_indexed(limit, |indexes| {
            indexes.domain_index.get(&domain.as_i32()).cloned()
        })
    }

    pub fn get_changes_by_body(&self, body: &str, limit: usize) -> Vec<RegulatoryChange> {
        let key = body.to_lowercase();
        self.collect_indexed(limit, |indexes| indexes.body_index.get(&key).cloned())
    }

    pub fn get_recent_changes(&self, days: i64, limit: usize) -> Vec<RegulatoryChange> {
        let cutoff = Utc::now() - Duration::days(days.max(0));
        let storage = self.storage.lock().expect("storage lock");
        let mut results: Vec<RegulatoryChange> = storage
            .values()
            .filter(|change| change.detected_at() >= cutoff)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.detected_at().cmp(&a.detected_at()));
        results.truncate(limit);
        results
    }

    pub async fn update_change_status(
        &self,
        change_id: &str,
        new_status: ChangeStatus,
    ) -> RegiaResult<bool> {
        let updated = {
            let mut storage = self.storage.lock().expect("storage lock");
            match storage.get(change_id) {
                Some(mut change) => {
                    change.advance_status(new_status)?;
                    storage.insert(change.clone());
                    Some(change)
                }
                None => None,
            }
        };

        let Some(change) = updated else {
            return Ok(false);
        };

        {
            let mut indexes = self.indexes.lock().expect("index lock");
            indexes.remove(change_id);
            indexes.add(&change);
        }

        if let Some(database) = &self.database {
            if let Err(e) = database.upsert_change(&change).await {
                warn!(change_id, error = %e, "status mirror write failed");
            }
        }

        Ok(true)
    }

    pub fn pin_change(&self, change_id: &str) {
        self.storage.lock().expect("storage lock").pin(change_id);
    }

    pub fn unpin_change(&self, change_id: &str) {
        self.storage.lock().expect("storage lock").unpin(change_id);
    }

    pub fn total_changes(&self) -> usize {
        self.storage.lock().expect("storage lock").len()
    }

    pub fn export_to_json(&self) -> serde_json::Value {
        if let Ok(mut counters) = self.counters.lock() {
            counters.exports += 1;
        }

        let storage = self.storage.lock().expect("storage lock");
        let mut changes: Vec<&RegulatoryChange> = storage.values().collect();
        changes.sort_by(|a, b| a.change_id().cmp(b.change_id()));
        let serialized: Vec<serde_json::Value> = changes.iter().map(|c| c.to_json()).collect();

        json!({
            "version": "1.0",
            "export_timestamp": Utc::now().timestamp_millis(),
            "total_changes": serialized.len(),
            "changes": serialized,
        })
    }

    pub async fn import_from_json(&self, snapshot: &serde_json::Value) -> RegiaResult<usize> {
        let changes = snapshot
            .get("changes")
            .and_then(|c| c.as_array())
            .ok_or_else(|| regia_core::RegiaError::ValidationError {
                field: "changes".to_string(),
                message: "snapshot has no changes array".to_string(),
            })?;

        let mut imported = 0usize;
        for value in changes {
            match RegulatoryChange::from_json(value) {
                Ok(change) => {
                    if self.store_regulatory_change(change).await? {
                        imported += 1;
                    }
                }
                Err(e) => warn!(error = %e, "skipping malformed change in snapshot"),
            }
        }

        if let Ok(mut counters) = self.counters.lock() {
            counters.imports += 1;
        }
        info!(imported, "knowledge base snapshot imported");
        Ok(imported)
    }

    pub async fn clear(&self) -> RegiaResult<()> {
        {
            let mut storage = self.storage.lock().expect("storage lock");
            storage.clear();
            let mut indexes = self.indexes.lock().expect("index lock");
            indexes.clear();
        }

        if let Some(database) = &self.database {
            database.delete_all().await?;
        }
        Ok(())
    }

    pub fn statistics(&self) -> serde_json::Value {
        let storage = self.storage.lock().expect("storage lock");
        let indexes = self.indexes.lock().expect("index lock");
        let counters = self.counters.lock().expect("counters lock");

        let by_impact: HashMap<String, usize> = indexes
            .impact_index
            .iter()
            .filter_map(|(impact, ids)| {
                RegulatoryImpact::from_i32(*impact).map(|i| (i.as_str().to_string(), ids.len()))
            })
            .collect();
        let by_body: HashMap<String, usize> = indexes
            .body_index
            .iter()
            .map(|(body, ids)| (body.clone(), ids.len()))
            .collect();

        json!({
            "total_changes": storage.len(),
            "by_impact": by_impact,
            "by_regulatory_body": by_body,
            "word_index_terms": indexes.word_index.len(),
            "domain_index_terms": indexes.domain_index.len(),
            "changes_stored": counters.changes_stored,
            "changes_updated": counters.changes_updated,
            "searches_performed": counters.searches_performed,
            "imports": counters.imports,
            "exports": counters.exports,
            "durable": self.database.is_some(),
        })
    }

    fn matches_filters(change: &RegulatoryChange, filters: &SearchFilters) -> bool {
        if let Some(body) = &filters.regulatory_body {
            if !change
                .metadata()
                .regulatory_body
                .eq_ignore_ascii_case(body)
            {
                return false;
            }
        }
        if let Some(impact) = filters.impact_level {
            match change.analysis() {
                Some(analysis) if analysis.impact_level == impact => {}
                _ => return false,
            }
        }
        true
    }

    fn collect_indexed<F>(&self, limit: usize, lookup: F) -> Vec<RegulatoryChange>
    where
        F: FnOnce(&KnowledgeIndexes) -> Option<HashSet<String>>,
    {
        let storage = self.storage.lock().expect("storage lock");
        let indexes = self.indexes.lock().expect("index lock");
        let mut results: Vec<RegulatoryChange> = lookup(&indexes)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| storage.peek(id).cloned())
            .collect();
        results.sort_by(|a, b| b.detected_at().cmp(&a.detected_at()));
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regia_core::{RegulatoryChangeAnalysis, RegulatoryChangeMetadata};
    use std::collections::HashMap as StdHashMap;

    fn kb() -> RegulatoryKnowledgeBase {
        RegulatoryKnowledgeBase::in_memory(KnowledgeBaseSettings::default())
    }

    fn change_with_title(source: &str, title: &str, body: &str) -> RegulatoryChange {
        let metadata = RegulatoryChangeMetadata {
            regulatory_body: body.to_string(),
            ..RegulatoryChangeMetadata::default()
        };
        RegulatoryChange::new(source, title, "https://example.org/doc", metadata)
    }

    fn analysis(impact: RegulatoryImpact, domain: BusinessDomain) -> RegulatoryChangeAnalysis {
        RegulatoryChangeAnalysis {
            impact_level: impact,
            executive_summary: "Liquidity requirements tightened".to_string(),
            affected_domains: vec![domain],
            required_actions: vec![],
            compliance_deadlines: vec![],
            risk_scores: StdHashMap::new(),
            analysis_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let kb = kb();
        let change = change_with_title("sec_edgar", "Capital Adequacy Rule", "SEC");
        let id = change.change_id().to_string();
        assert!(kb.store_regulatory_change(change).await.unwrap());
        assert_eq!(kb.total_changes(), 1);
        let fetched = kb.get_regulatory_change(&id).await.unwrap();
        assert_eq!(fetched.title(), "Capital Adequacy Rule");
        assert!(kb.get_regulatory_change("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_search_by_title_token() {
        let kb = kb();
        let change = change_with_title("sec_edgar", "Capital Adequacy Rule", "SEC");
        let id = change.change_id().to_string();
        kb.store_regulatory_change(change).await.unwrap();

        for token in ["capital", "adequacy", "rule", "CAPITAL"] {
            let results = kb.search_changes(token, &SearchFilters::default(), 10);
            assert_eq!(results.len(), 1, "token {} should match", token);
            assert_eq!(results[0].change_id(), id);
        }
        assert!(kb
            .search_changes("liquidity", &SearchFilters::default(), 10)
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_intersection() {
        let kb = kb();
        kb.store_regulatory_change(change_with_title("a", "Capital Adequacy Rule", "SEC"))
            .await
            .unwrap();
        kb.store_regulatory_change(change_with_title("b", "Capital Liquidity Guidance", "FCA"))
            .await
            .unwrap();

        let both = kb.search_changes("capital", &SearchFilters::default(), 10);
        assert_eq!(both.len(), 2);

        let narrowed = kb.search_changes("capital liquidity", &SearchFilters::default(), 10);
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].title(), "Capital Liquidity Guidance");
    }

    #[tokio::test]
    async fn test_search_filters() {
        let kb = kb();
        kb.store_regulatory_change(change_with_title("a", "Capital Rule", "SEC"))
            .await
            .unwrap();
        let mut analyzed = change_with_title("b", "Capital Guidance", "FCA");
        analyzed.set_analysis(analysis(
            RegulatoryImpact::High,
            BusinessDomain::CapitalRequirements,
        ));
        kb.store_regulatory_change(analyzed).await.unwrap();

        let sec_only = kb.search_changes(
            "capital",
            &SearchFilters {
                regulatory_body: Some("SEC".to_string()),
                impact_level: None,
            },
            10,
        );
        assert_eq!(sec_only.len(), 1);
        assert_eq!(sec_only[0].metadata().regulatory_body, "SEC");

        let high_only = kb.search_changes(
            "capital",
            &SearchFilters {
                regulatory_body: None,
                impact_level: Some(RegulatoryImpact::High),
            },
            10,
        );
        assert_eq!(high_only.len(), 1);
        assert_eq!(high_only[0].metadata().regulatory_body, "FCA");
    }

    #[tokio::test]
    async fn test_indexed_lookups() {
        let kb = kb();
        let mut change = change_with_title("a", "Liquidity Standard", "ECB");
        change.set_analysis(analysis(
            RegulatoryImpact::Critical,
            BusinessDomain::RiskManagement,
        ));
        kb.store_regulatory_change(change).await.unwrap();

        assert_eq!(
            kb.get_changes_by_impact(RegulatoryImpact::Critical, 10).len(),
            1
        );
        assert!(kb
            .get_changes_by_impact(RegulatoryImpact::Low, 10)
            .is_empty());
        assert_eq!(
            kb.get_changes_by_domain(BusinessDomain::RiskManagement, 10)
                .len(),
            1
        );
        assert_eq!(kb.get_changes_by_body("ecb", 10).len(), 1);
        assert_eq!(kb.get_changes_by_body("ECB", 10).len(), 1);
        assert_eq!(kb.get_recent_changes(1, 10).len(), 1);
        assert!(kb.get_recent_changes(0, 10).len() <= 1);
    }

    #[tokio::test]
    async fn test_status_update_monotonic() {
        let kb = kb();
        let mut change = change_with_title("a", "Rule", "SEC");
        change.set_analysis(analysis(
            RegulatoryImpact::Low,
            BusinessDomain::ComplianceMonitoring,
        ));
        let id = change.change_id().to_string();
        kb.store_regulatory_change(change).await.unwrap();

        assert!(kb
            .update_change_status(&id, ChangeStatus::Distributed)
            .await
            .unwrap());
        let result = kb.update_change_status(&id, ChangeStatus::Detected).await;
        assert!(result.is_err());
        assert_eq!(
            kb.get_regulatory_change(&id).await.unwrap().status(),
            ChangeStatus::Distributed
        );
        assert!(!kb
            .update_change_status("missing", ChangeStatus::Archived)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_id_other_source_rejected() {
        let kb = kb();
        let change = change_with_title("a", "Rule", "SEC");
        let clone = RegulatoryChange::from_parts(
            change.change_id().to_string(),
            "other_source".to_string(),
            "Rule".to_string(),
            "https://x".to_string(),
            RegulatoryChangeMetadata::default(),
            ChangeStatus::Detected,
            Utc::now(),
            None,
            None,
            None,
        );
        assert!(kb.store_regulatory_change(change).await.unwrap());
        assert!(!kb.store_regulatory_change(clone).await.unwrap());
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let kb = kb();
        let mut change = change_with_title("a", "Capital Adequacy Rule", "SEC");
        change.set_analysis(analysis(
            RegulatoryImpact::High,
            BusinessDomain::CapitalRequirements,
        ));
        let id = change.change_id().to_string();
        kb.store_regulatory_change(change.clone()).await.unwrap();
        kb.store_regulatory_change(change_with_title("b", "Liquidity Guidance", "FCA"))
            .await
            .unwrap();

        let snapshot = kb.export_to_json();
        assert_eq!(snapshot["version"], "1.0");
        assert_eq!(snapshot["total_changes"], 2);

        let restored = RegulatoryKnowledgeBase::in_memory(KnowledgeBaseSettings::default());
        let imported = restored.import_from_json(&snapshot).await.unwrap();
        assert_eq!(imported, 2);
        let fetched = restored.get_regulatory_change(&id).await.unwrap();
        assert_eq!(fetched.title(), change.title());
        assert_eq!(fetched.status(), change.status());
        assert_eq!(
            fetched.analysis().unwrap().impact_level,
            RegulatoryImpact::High
        );
        assert_eq!(
            restored
                .search_changes("capital", &SearchFilters::default(), 10)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_import_rejects_missing_changes() {
        let kb = kb();
        let result = kb.import_from_json(&json!({"version": "1.0"})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_clear() {
        let kb = kb();
        kb.store_regulatory_change(change_with_title("a", "Rule", "SEC"))
            .await
            .unwrap();
        kb.clear().await.unwrap();
        assert_eq!(kb.total_changes(), 0);
        assert!(kb
            .search_changes("rule", &SearchFilters::default(), 10)
            .is_empty());
    }

    #[tokio::test]
    async fn test_statistics() {
        let kb = kb();
        kb.store_regulatory_change(change_with_title("a", "Capital Rule", "SEC"))
            .await
            .unwrap();
        kb.search_changes("capital", &SearchFilters::default(), 10);
        let stats = kb.statistics();
        assert_eq!(stats["total_changes"], 1);
        assert_eq!(stats["changes_stored"], 1);
        assert_eq!(stats["searches_performed"], 1);
        assert_eq!(stats["durable"], false);
        assert_eq!(stats["by_regulatory_body"]["sec"], 1);
    }

    #[tokio::test]
    async fn test_update_reindexes() {
        let kb = kb();
        let change = change_with_title("a", "Original Wording", "SEC");
        let id = change.change_id().to_string();
        kb.store_regulatory_change(change).await.unwrap();

        let updated = RegulatoryChange::from_parts(
            id.clone(),
            "a".to_string(),
            "Replacement Title".to_string(),
            "https://x".to_string(),
            RegulatoryChangeMetadata::default(),
            ChangeStatus::Detected,
            Utc::now(),
            None,
            None,
            None,
        );
        kb.store_regulatory_change(updated).await.unwrap();

        assert!(kb
            .search_changes("original", &SearchFilters::default(), 10)
            .is_empty());
        assert_eq!(
            kb.search_changes("replacement", &SearchFilters::default(), 10)
                .len(),
            1
        );
        let stats = kb.statistics();
        assert_eq!(stats["changes_updated"], 1);
    }
}
