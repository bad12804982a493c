use crate::errors::{RegiaError, RegiaResult};
use crate::utils::{generate_change_id, now_millis};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegulatoryImpact {
    Low,
    Medium,
    High,
    Critical,
}

impl RegulatoryImpact {
    pub fn as_i32(self) -> i32 {
        match self {
            RegulatoryImpact::Low => 0,
            RegulatoryImpact::Medium => 1,
            RegulatoryImpact::High => 2,
            RegulatoryImpact::Critical => 3,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(RegulatoryImpact::Low),
            1 => Some(RegulatoryImpact::Medium),
            2 => Some(RegulatoryImpact::High),
            3 => Some(RegulatoryImpact::Critical),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RegulatoryImpact::Low => "LOW",
            RegulatoryImpact::Medium => "MEDIUM",
            RegulatoryImpact::High => "HIGH",
            RegulatoryImpact::Critical => "CRITICAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "LOW" => Some(RegulatoryImpact::Low),
            "MEDIUM" => Some(RegulatoryImpact::Medium),
            "HIGH" => Some(RegulatoryImpact::High),
            "CRITICAL" => Some(RegulatoryImpact::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegulatoryImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChangeStatus {
    Detected,
    Analyzing,
    Analyzed,
    Distributed,
    Archived,
}

impl ChangeStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            ChangeStatus::Detected => 0,
            ChangeStatus::Analyzing => 1,
            ChangeStatus::Analyzed => 2,
            ChangeStatus::Distributed => 3,
            ChangeStatus::Archived => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(ChangeStatus::Detected),
            1 => Some(ChangeStatus::Analyzing),
            2 => Some(ChangeStatus::Analyzed),
            3 => Some(ChangeStatus::Distributed),
            4 => Some(ChangeStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Detected => "DETECTED",
            ChangeStatus::Analyzing => "ANALYZING",
            ChangeStatus::Analyzed => "ANALYZED",
            ChangeStatus::Distributed => "DISTRIBUTED",
            ChangeStatus::Archived => "ARCHIVED",
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusinessDomain {
    FinancialReporting,
    RiskManagement,
    ComplianceMonitoring,
    DataPrivacy,
    ConsumerProtection,
    MarketConduct,
    CapitalRequirements,
    AntiMoneyLaundering,
    CyberSecurity,
    OperationalResilience,
}

impl BusinessDomain {
    pub fn as_i32(self) -> i32 {
        match self {
            BusinessDomain::FinancialReporting => 0,
            BusinessDomain::RiskManagement => 1,
            BusinessDomain::ComplianceMonitoring => 2,
            BusinessDomain::DataPrivacy => 3,
            BusinessDomain::ConsumerProtection => 4,
            BusinessDomain::MarketConduct => 5,
            BusinessDomain::CapitalRequirements => 6,
            BusinessDomain::AntiMoneyLaundering => 7,
            BusinessDomain::CyberSecurity => 8,
            BusinessDomain::OperationalResilience => 9,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(BusinessDomain::FinancialReporting),
            1 => Some(BusinessDomain::RiskManagement),
            2 => Some(BusinessDomain::ComplianceMonitoring),
            3 => Some(BusinessDomain::DataPrivacy),
            4 => Some(BusinessDomain::ConsumerProtection),
            5 => Some(BusinessDomain::MarketConduct),
            6 => Some(BusinessDomain::CapitalRequirements),
            7 => Some(BusinessDomain::AntiMoneyLaundering),
            8 => Some(BusinessDomain::CyberSecurity),
            9 => Some(BusinessDomain::OperationalResilience),
            _ => None,
        }
    }
}

impl std::fmt::Display for BusinessDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BusinessDomain::FinancialReporting => "Financial Reporting",
            BusinessDomain::RiskManagement => "Risk Management",
            BusinessDomain::ComplianceMonitoring => "Compliance Monitoring",
            BusinessDomain::DataPrivacy => "Data Privacy",
            BusinessDomain::ConsumerProtection => "Consumer Protection",
            BusinessDomain::MarketConduct => "Market Conduct",
            BusinessDomain::CapitalRequirements => "Capital Requirements",
            BusinessDomain::AntiMoneyLaundering => "Anti-Money Laundering",
            BusinessDomain::CyberSecurity => "Cyber Security",
            BusinessDomain::OperationalResilience => "Operational Resilience",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryChangeMetadata {
    pub regulatory_body: String,
    pub document_type: String,
    pub document_number: String,
    pub keywords: Vec<String>,
    pub affected_entities: Vec<String>,
    pub custom_fields: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegulatoryChangeAnalysis {
    pub impact_level: RegulatoryImpact,
    pub executive_summary: String,
    pub affected_domains: Vec<BusinessDomain>,
    pub required_actions: Vec<String>,
    pub compliance_deadlines: Vec<String>,
    pub risk_scores: HashMap<String, f64>,
    pub analysis_timestamp: DateTime<Utc>,
}

impl RegulatoryChangeAnalysis {
    pub fn to_json(&self) -> serde_json::Value {
        let domains: Vec<i32> = self.affected_domains.iter().map(|d| d.as_i32()).collect();
        json!({
            "impact_level": self.impact_level.as_i32(),
            "executive_summary": self.executive_summary,
            "affected_domains": domains,
            "required_actions": self.required_actions,
            "compliance_deadlines": self.compliance_deadlines,
            "risk_scores": self.risk_scores,
            "analysis_timestamp": self.analysis_timestamp.timestamp_millis(),
        })
    }

    pub fn from_json(value: &serde_json::Value) -> RegiaResult<Self> {
        let impact_raw = value
            .get("impact_level")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RegiaError::ValidationError {
                field: "impact_level".to_string(),
                message: "missing or non-integer".to_string(),
            })?;
        let impact_level =
            RegulatoryImpact::from_i32(impact_raw as i32).ok_or_else(|| RegiaError::ValidationError {
                field: "impact_level".to_string(),
                message: format!("unknown impact level: {}", impact_raw),
            })?;

        let mut affected_domains = Vec::new();
        if let Some(domains) = value.get("affected_domains").and_then(|v| v.as_array()) {
            for domain in domains {
                let raw = domain.as_i64().ok_or_else(|| RegiaError::ValidationError {
                    field: "affected_domains".to_string(),
                    message: "non-integer domain".to_string(),
                })?;
                let parsed =
                    BusinessDomain::from_i32(raw as i32).ok_or_else(|| RegiaError::ValidationError {
                        field: "affected_domains".to_string(),
                        message: format!("unknown domain: {}", raw),
                    })?;
                affected_domains.push(parsed);
            }
        }

        let string_list = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut risk_scores = HashMap::new();
        if let Some(scores) = value.get("risk_scores").and_then(|v| v.as_object()) {
            for (domain, score) in scores {
                if let Some(score) = score.as_f64() {
                    risk_scores.insert(domain.clone(), score);
                }
            }
        }

        let analysis_timestamp = value
            .get("analysis_timestamp")
            .and_then(|v| v.as_i64())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .unwrap_or_else(Utc::now);

        Ok(Self {
            impact_level,
            executive_summary: value
                .get("executive_summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            affected_domains,
            required_actions: string_list("required_actions"),
            compliance_deadlines: string_list("compliance_deadlines"),
            risk_scores,
            analysis_timestamp,
        })
    }
}

/// Complete record of a detected regulatory change. The knowledge base owns
/// stored records; everything else works on clones.
#[derive(Debug, Clone, PartialEq)]
pub struct RegulatoryChange {
    change_id: String,
    source_id: String,
    title: String,
    content_url: String,
    metadata: RegulatoryChangeMetadata,
    status: ChangeStatus,
    detected_at: DateTime<Utc>,
    analyzed_at: Option<DateTime<Utc>>,
    distributed_at: Option<DateTime<Utc>>,
    analysis: Option<RegulatoryChangeAnalysis>,
}

impl RegulatoryChange {
    pub fn new(
        source_id: impl Into<String>,
        title: impl Into<String>,
        content_url: impl Into<String>,
        metadata: RegulatoryChangeMetadata,
    ) -> Self {
        Self {
            change_id: generate_change_id(),
            source_id: source_id.into(),
            title: title.into(),
            content_url: content_url.into(),
            metadata,
            status: ChangeStatus::Detected,
            detected_at: now_millis(),
            analyzed_at: None,
            distributed_at: None,
            analysis: None,
        }
    }

    pub fn change_id(&self) -> &str {
        &self.change_id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content_url(&self) -> &str {
        &self.content_url
    }

    pub fn metadata(&self) -> &RegulatoryChangeMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut RegulatoryChangeMetadata {
        &mut self.metadata
    }

    pub fn status(&self) -> ChangeStatus {
        self.status
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn analyzed_at(&self) -> Option<DateTime<Utc>> {
        self.analyzed_at
    }

    pub fn distributed_at(&self) -> Option<DateTime<Utc>> {
        self.distributed_at
    }

    pub fn analysis(&self) -> Option<&RegulatoryChangeAnalysis> {
        self.analysis.as_ref()
    }

    /// Attaches analysis results and moves the record to ANALYZED (records
    /// already past ANALYZED keep their status).
    pub fn set_analysis(&mut self, analysis: RegulatoryChangeAnalysis) {
        self.analysis = Some(analysis);
        self.analyzed_at = Some(now_millis());
        if self.status < ChangeStatus::Analyzed {
            self.status = ChangeStatus::Analyzed;
        }
    }

    /// Status only ever advances. Regressions and jumps past ANALYZED
    /// without analysis attached are rejected.
    pub fn advance_status(&mut self, new_status: ChangeStatus) -> RegiaResult<()> {
        if new_status < self.status {
            return Err(RegiaError::InvariantViolation {
                reason: format!(
                    "status regression for {}: {} -> {}",
                    self.change_id, self.status, new_status
                ),
            });
        }
        if new_status >= ChangeStatus::Analyzed && self.analysis.is_none() {
            return Err(RegiaError::InvariantViolation {
                reason: format!(
                    "change {} cannot reach {} without analysis",
                    self.change_id, new_status
                ),
            });
        }
        if new_status >= ChangeStatus::Distributed && self.distributed_at.is_none() {
            self.distributed_at = Some(now_millis());
        }
        self.status = new_status;
        Ok(())
    }

    pub fn requires_immediate_action(&self) -> bool {
        self.analysis
            .as_ref()
            .map(|a| a.impact_level == RegulatoryImpact::Critical)
            .unwrap_or(false)
    }

    pub fn is_high_priority(&self) -> bool {
        self.analysis
            .as_ref()
            .map(|a| a.impact_level >= RegulatoryImpact::High)
            .unwrap_or(false)
    }

    pub fn impact_description(&self) -> &'static str {
        match self.analysis.as_ref().map(|a| a.impact_level) {
            Some(RegulatoryImpact::Low) => "Low Impact",
            Some(RegulatoryImpact::Medium) => "Medium Impact",
            Some(RegulatoryImpact::High) => "High Impact",
            Some(RegulatoryImpact::Critical) => "Critical Impact",
            None => "Not analyzed",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "change_id": self.change_id,
            "source_id": self.source_id,
            "title": self.title,
            "content_url": self.content_url,
            "metadata": serde_json::to_value(&self.metadata).unwrap_or_default(),
            "status": self.status.as_i32(),
            "detected_at": self.detected_at.timestamp_millis(),
        });

        if let Some(analysis) = &self.analysis {
            value["analysis"] = analysis.to_json();
        }
        if let Some(analyzed_at) = self.analyzed_at {
            value["analyzed_at"] = json!(analyzed_at.timestamp_millis());
        }
        if let Some(distributed_at) = self.distributed_at {
            value["distributed_at"] = json!(distributed_at.timestamp_millis());
        }

        value
    }

    pub fn from_json(value: &serde_json::Value) -> RegiaResult<Self> {
        let field = |key: &str| -> RegiaResult<String> {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| RegiaError::ValidationError {
                    field: key.to_string(),
                    message: "missing or non-string".to_string(),
                })
        };

        let metadata = match value.get("metadata") {
            Some(meta) => serde_json::from_value(meta.clone())?,
            None => RegulatoryChangeMetadata::default(),
        };

        let status_raw = value
            .get("status")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| RegiaError::ValidationError {
                field: "status".to_string(),
                message: "missing or non-integer".to_string(),
            })?;
        let status =
            ChangeStatus::from_i32(status_raw as i32).ok_or_else(|| RegiaError::ValidationError {
                field: "status".to_string(),
                message: format!("unknown status: {}", status_raw),
            })?;

        let millis = |key: &str| -> Option<DateTime<Utc>> {
            value
                .get(key)
                .and_then(|v| v.as_i64())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        };

        let detected_at = millis("detected_at").ok_or_else(|| RegiaError::ValidationError {
            field: "detected_at".to_string(),
            message: "missing or invalid timestamp".to_string(),
        })?;

        let analysis = match value.get("analysis") {
            Some(a) => Some(RegulatoryChangeAnalysis::from_json(a)?),
            None => None,
        };

        Ok(Self {
            change_id: field("change_id")?,
            source_id: field("source_id")?,
            title: field("title")?,
            content_url: field("content_url")?,
            metadata,
            status,
            detected_at,
            analyzed_at: millis("analyzed_at"),
            distributed_at: millis("distributed_at"),
            analysis,
        })
    }

    /// Rebuilds a record from persisted columns, bypassing id generation.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        change_id: String,
        source_id: String,
        title: String,
        content_url: String,
        metadata: RegulatoryChangeMetadata,
        status: ChangeStatus,
        detected_at: DateTime<Utc>,
        analyzed_at: Option<DateTime<Utc>>,
        distributed_at: Option<DateTime<Utc>>,
        analysis: Option<RegulatoryChangeAnalysis>,
    ) -> Self {
        Self {
            change_id,
            source_id,
            title,
            content_url,
            metadata,
            status,
            detected_at,
            analyzed_at,
            distributed_at,
            analysis,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> RegulatoryChangeMetadata {
        RegulatoryChangeMetadata {
            regulatory_body: "SEC".to_string(),
            document_type: "rule".to_string(),
            document_number: "34-12345".to_string(),
            keywords: vec!["capital".to_string(), "reporting".to_string()],
            affected_entities: vec!["banks".to_string()],
            custom_fields: HashMap::new(),
        }
    }

    fn sample_analysis() -> RegulatoryChangeAnalysis {
        let mut risk_scores = HashMap::new();
        risk_scores.insert("Capital Requirements".to_string(), 0.8);
        RegulatoryChangeAnalysis {
            impact_level: RegulatoryImpact::High,
            executive_summary: "Capital ratios increase".to_string(),
            affected_domains: vec![BusinessDomain::CapitalRequirements],
            required_actions: vec!["Update capital models".to_string()],
            compliance_deadlines: vec!["2025-01-01".to_string()],
            risk_scores,
            analysis_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_change_id_format() {
        let change = RegulatoryChange::new("sec_edgar", "Title", "https://x", sample_metadata());
        assert!(change.change_id().starts_with("reg_change_"));

        let other = RegulatoryChange::new("sec_edgar", "Title", "https://x", sample_metadata());
        assert_ne!(change.change_id(), other.change_id());
    }

    #[test]
    fn test_new_change_is_detected() {
        let change = RegulatoryChange::new("fca", "Title", "https://x", sample_metadata());
        assert_eq!(change.status(), ChangeStatus::Detected);
        assert!(change.analysis().is_none());
        assert!(change.analyzed_at().is_none());
        assert!(change.distributed_at().is_none());
        assert_eq!(change.impact_description(), "Not analyzed");
    }

    #[test]
    fn test_set_analysis_advances_status() {
        let mut change = RegulatoryChange::new("fca", "Title", "https://x", sample_metadata());
        change.set_analysis(sample_analysis());
        assert_eq!(change.status(), ChangeStatus::Analyzed);
        assert!(change.analyzed_at().is_some());
        assert!(change.is_high_priority());
        assert!(!change.requires_immediate_action());
        assert_eq!(change.impact_description(), "High Impact");
    }

    #[test]
    fn test_status_cannot_regress() {
        let mut change = RegulatoryChange::new("fca", "Title", "https://x", sample_metadata());
        change.set_analysis(sample_analysis());
        change.advance_status(ChangeStatus::Distributed).unwrap();
        assert!(change.distributed_at().is_some());

        let result = change.advance_status(ChangeStatus::Detected);
        assert!(matches!(result, Err(RegiaError::InvariantViolation { .. })));
        assert_eq!(change.status(), ChangeStatus::Distributed);
    }

    #[test]
    fn test_analyzed_requires_analysis() {
        let mut change = RegulatoryChange::new("fca", "Title", "https://x", sample_metadata());
        let result = change.advance_status(ChangeStatus::Analyzed);
        assert!(matches!(result, Err(RegiaError::InvariantViolation { .. })));

        change.advance_status(ChangeStatus::Analyzing).unwrap();
        assert_eq!(change.status(), ChangeStatus::Analyzing);
    }

    #[test]
    fn test_json_round_trip() {
        let mut change = RegulatoryChange::new("sec_edgar", "Title", "https://x", sample_metadata());
        change.set_analysis(sample_analysis());
        change.advance_status(ChangeStatus::Distributed).unwrap();

        let restored = RegulatoryChange::from_json(&change.to_json()).unwrap();
        assert_eq!(restored.change_id(), change.change_id());
        assert_eq!(restored.source_id(), change.source_id());
        assert_eq!(restored.status(), ChangeStatus::Distributed);
        assert_eq!(restored.metadata(), change.metadata());
        assert_eq!(
            restored.analysis().unwrap().impact_level,
            RegulatoryImpact::High
        );
        assert_eq!(
            restored.detected_at().timestamp_millis(),
            change.detected_at().timestamp_millis()
        );
    }

    #[test]
    fn test_from_json_rejects_unknown_status() {
        let change = RegulatoryChange::new("sec_edgar", "Title", "https://x", sample_metadata());
        let mut value = change.to_json();
        value["status"] = json!(42);
        assert!(matches!(
            RegulatoryChange::from_json(&value),
            Err(RegiaError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_impact_ordering() {
        assert!(RegulatoryImpact::Low < RegulatoryImpact::Medium);
        assert!(RegulatoryImpact::Medium < RegulatoryImpact::High);
        assert!(RegulatoryImpact::High < RegulatoryImpact::Critical);
        assert_eq!(RegulatoryImpact::from_i32(2), Some(RegulatoryImpact::High));
        assert_eq!(RegulatoryImpact::from_i32(7), None);
        assert_eq!(RegulatoryImpact::parse("critical"), Some(RegulatoryImpact::Critical));
        assert_eq!(RegulatoryImpact::parse("bogus"), None);
    }

    #[test]
    fn test_domain_round_trip() {
        for raw in 0..10 {
            let domain = BusinessDomain::from_i32(raw).unwrap();
            assert_eq!(domain.as_i32(), raw);
        }
        assert_eq!(BusinessDomain::from_i32(10), None);
        assert_eq!(
            BusinessDomain::CapitalRequirements.to_string(),
            "Capital Requirements"
        );
    }
}
