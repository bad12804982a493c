use chrono::{DateTime, Duration, TimeZone, Utc};
use regia_core::{now_millis, RegiaError, RegiaResult};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    AgentDecision,
    AgentStatusUpdate,
    AgentError,
    AgentLearningUpdate,
    RegulatoryChangeDetected,
    RegulatoryComplianceViolation,
    RegulatoryRiskAlert,
    TransactionProcessed,
    TransactionFlagged,
    TransactionReviewRequested,
    SystemHealthCheck,
    SystemPerformanceMetric,
    SystemError,
    HumanReviewRequested,
    HumanFeedbackReceived,
    HumanDecisionOverride,
    DataIngestionCompleted,
    DataProcessingStarted,
    DataQualityIssue,
    AuditTrailUpdated,
    ComplianceReportGenerated,
    SecurityIncidentDetected,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::AgentDecision => "AGENT_DECISION",
            EventCategory::AgentStatusUpdate => "AGENT_STATUS_UPDATE",
            EventCategory::AgentError => "AGENT_ERROR",
            EventCategory::AgentLearningUpdate => "AGENT_LEARNING_UPDATE",
            EventCategory::RegulatoryChangeDetected => "REGULATORY_CHANGE_DETECTED",
            EventCategory::RegulatoryComplianceViolation => "REGULATORY_COMPLIANCE_VIOLATION",
            EventCategory::RegulatoryRiskAlert => "REGULATORY_RISK_ALERT",
            EventCategory::TransactionProcessed => "TRANSACTION_PROCESSED",
            EventCategory::TransactionFlagged => "TRANSACTION_FLAGGED",
            EventCategory::TransactionReviewRequested => "TRANSACTION_REVIEW_REQUESTED",
            EventCategory::SystemHealthCheck => "SYSTEM_HEALTH_CHECK",
            EventCategory::SystemPerformanceMetric => "SYSTEM_PERFORMANCE_METRIC",
            EventCategory::SystemError => "SYSTEM_ERROR",
            EventCategory::HumanReviewRequested => "HUMAN_REVIEW_REQUESTED",
            EventCategory::HumanFeedbackReceived => "HUMAN_FEEDBACK_RECEIVED",
            EventCategory::HumanDecisionOverride => "HUMAN_DECISION_OVERRIDE",
            EventCategory::DataIngestionCompleted => "DATA_INGESTION_COMPLETED",
            EventCategory::DataProcessingStarted => "DATA_PROCESSING_STARTED",
            EventCategory::DataQualityIssue => "DATA_QUALITY_ISSUE",
            EventCategory::AuditTrailUpdated => "AUDIT_TRAIL_UPDATED",
            EventCategory::ComplianceReportGenerated => "COMPLIANCE_REPORT_GENERATED",
            EventCategory::SecurityIncidentDetected => "SECURITY_INCIDENT_DETECTED",
        }
    }

    /// Lenient parser: unknown categories map to SYSTEM_ERROR rather than
    /// failing the envelope.
    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "AGENT_DECISION" => EventCategory::AgentDecision,
            "AGENT_STATUS_UPDATE" => EventCategory::AgentStatusUpdate,
            "AGENT_ERROR" => EventCategory::AgentError,
            "AGENT_LEARNING_UPDATE" => EventCategory::AgentLearningUpdate,
            "REGULATORY_CHANGE_DETECTED" => EventCategory::RegulatoryChangeDetected,
            "REGULATORY_COMPLIANCE_VIOLATION" => EventCategory::RegulatoryComplianceViolation,
            "REGULATORY_RISK_ALERT" => EventCategory::RegulatoryRiskAlert,
            "TRANSACTION_PROCESSED" => EventCategory::TransactionProcessed,
            "TRANSACTION_FLAGGED" => EventCategory::TransactionFlagged,
            "TRANSACTION_REVIEW_REQUESTED" => EventCategory::TransactionReviewRequested,
            "SYSTEM_HEALTH_CHECK" => EventCategory::SystemHealthCheck,
            "SYSTEM_PERFORMANCE_METRIC" => EventCategory::SystemPerformanceMetric,
            "SYSTEM_ERROR" => EventCategory::SystemError,
            "HUMAN_REVIEW_REQUESTED" => EventCategory::HumanReviewRequested,
            "HUMAN_FEEDBACK_RECEIVED" => EventCategory::HumanFeedbackReceived,
            "HUMAN_DECISION_OVERRIDE" => EventCategory::HumanDecisionOverride,
            "DATA_INGESTION_COMPLETED" => EventCategory::DataIngestionCompleted,
            "DATA_PROCESSING_STARTED" => EventCategory::DataProcessingStarted,
            "DATA_QUALITY_ISSUE" => EventCategory::DataQualityIssue,
            "AUDIT_TRAIL_UPDATED" => EventCategory::AuditTrailUpdated,
            "COMPLIANCE_REPORT_GENERATED" => EventCategory::ComplianceReportGenerated,
            "SECURITY_INCIDENT_DETECTED" => EventCategory::SecurityIncidentDetected,
            _ => EventCategory::SystemError,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    Low,
    Normal,
    High,
    Critical,
    Urgent,
}

impl EventPriority {
    pub fn as_i32(self) -> i32 {
        match self {
            EventPriority::Low => 0,
            EventPriority::Normal => 1,
            EventPriority::High => 2,
            EventPriority::Critical => 3,
            EventPriority::Urgent => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventPriority::Low => "LOW",
            EventPriority::Normal => "NORMAL",
            EventPriority::High => "HIGH",
            EventPriority::Critical => "CRITICAL",
            EventPriority::Urgent => "URGENT",
        }
    }

    /// Unknown priorities default to NORMAL.
    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "LOW" => EventPriority::Low,
            "NORMAL" => EventPriority::Normal,
            "HIGH" => EventPriority::High,
            "CRITICAL" => EventPriority::Critical,
            "URGENT" => EventPriority::Urgent,
            _ => EventPriority::Normal,
        }
    }
}

impl std::fmt::Display for EventPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventState {
    Created,
    Published,
    Routed,
    Processed,
    Failed,
    Expired,
    Archived,
}

impl EventState {
    pub fn as_str(self) -> &'static str {
        match self {
            EventState::Created => "CREATED",
            EventState::Published => "PUBLISHED",
            EventState::Routed => "ROUTED",
            EventState::Processed => "PROCESSED",
            EventState::Failed => "FAILED",
            EventState::Expired => "EXPIRED",
            EventState::Archived => "ARCHIVED",
        }
    }

    /// Unknown states default to CREATED.
    pub fn parse(value: &str) -> Self {
        match value.to_uppercase().as_str() {
            "CREATED" => EventState::Created,
            "PUBLISHED" => EventState::Published,
            "ROUTED" => EventState::Routed,
            "PROCESSED" => EventState::Processed,
            "FAILED" => EventState::Failed,
            "EXPIRED" => EventState::Expired,
            "ARCHIVED" => EventState::Archived,
            _ => EventState::Created,
        }
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_EVENT_TTL_SECS: i64 = 3600;

/// Transport record routed by the bus. Handlers receive clones; the bus owns
/// the original until routing completes.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub category: EventCategory,
    pub source: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub priority: EventPriority,
    pub state: EventState,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub headers: HashMap<String, String>,
    pub correlation_id: String,
    pub trace_id: String,
}

impl Event {
    pub fn new(
        category: EventCategory,
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        priority: EventPriority,
    ) -> Self {
        let created_at = now_millis();
        Self {
            event_id: format!("evt-{}", Uuid::new_v4()),
            category,
            source: source.into(),
            event_type: event_type.into(),
            payload,
            priority,
            state: EventState::Created,
            retry_count: 0,
            created_at,
            expires_at: created_at + Duration::seconds(DEFAULT_EVENT_TTL_SECS),
            headers: HashMap::new(),
            correlation_id: String::new(),
            trace_id: String::new(),
        }
    }

    pub fn set_expiry(&mut self, ttl: std::time::Duration) {
        self.expires_at = self.created_at + Duration::seconds(ttl.as_secs() as i64);
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "event_id": self.event_id,
            "category": self.category.as_str(),
            "source": self.source,
            "event_type": self.event_type,
            "payload": self.payload,
            "priority": self.priority.as_str(),
            "state": self.state.as_str(),
            "retry_count": self.retry_count,
            "created_at": self.created_at.timestamp_millis(),
            "expires_at": self.expires_at.timestamp_millis(),
            "headers": self.headers,
            "correlation_id": self.correlation_id,
            "trace_id": self.trace_id,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> RegiaResult<Self> {
        let event_id = value
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| RegiaError::ValidationError {
                field: "event_id".to_string(),
                message: "missing or non-string".to_string(),
            })?;

        let text = |key: &str| -> String {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        let millis = |key: &str, fallback: DateTime<Utc>| -> DateTime<Utc> {
            value
                .get(key)
                .and_then(|v| v.as_i64())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or(fallback)
        };

        let created_at = millis("created_at", Utc::now());
        let headers: HashMap<String, String> = value
            .get("headers")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Ok(Self {
            event_id,
            category: EventCategory::parse(&text("category")),
            source: text("source"),
            event_type: text("event_type"),
            payload: value.get("payload").cloned().unwrap_or(json!({})),
            priority: EventPriority::parse(&text("priority")),
            state: EventState::parse(&text("state")),
            retry_count: value
                .get("retry_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            created_at,
            expires_at: millis(
                "expires_at",
                created_at + Duration::seconds(DEFAULT_EVENT_TTL_SECS),
            ),
            headers,
            correlation_id: text("correlation_id"),
            trace_id: text("trace_id"),
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} [{}] {} from {} ({})",
            self.event_id, self.priority, self.category, self.source, self.state
        )
    }
}

/// Standardized constructors for the events the platform emits.
pub struct EventFactory;

impl EventFactory {
    pub fn regulatory_change_event(
        source: &str,
        change_id: &str,
        change_data: serde_json::Value,
    ) -> Event {
        let mut event = Event::new(
            EventCategory::RegulatoryChangeDetected,
            source,
            "regulatory_change",
            change_data,
            EventPriority::High,
        );
        event.add_header("change_id", change_id);
        event
    }

    pub fn compliance_violation_event(
        violation_type: &str,
        severity: &str,
        violation_data: serde_json::Value,
    ) -> Event {
        let mut event = Event::new(
            EventCategory::RegulatoryComplianceViolation,
            "compliance_engine",
            violation_type,
            violation_data,
            EventPriority::Critical,
        );
        event.add_header("severity", severity);
        event
    }

    pub fn agent_decision_event(
        agent_id: &str,
        decision_id: &str,
        decision_data: serde_json::Value,
    ) -> Event {
        let mut event = Event::new(
            EventCategory::AgentDecision,
            agent_id,
            "agent_decision",
            decision_data,
            EventPriority::Normal,
        );
        event.add_header("decision_id", decision_id);
        event
    }

    pub fn agent_status_event(agent_id: &str, status: &str) -> Event {
        Event::new(
            EventCategory::AgentStatusUpdate,
            agent_id,
            "status_update",
            json!({ "status": status }),
            EventPriority::Low,
        )
    }

    pub fn system_health_event(component: &str, status: &str, health_data: serde_json::Value) -> Event {
        Event::new(
            EventCategory::SystemHealthCheck,
            component,
            "health_check",
            json!({ "status": status, "details": health_data }),
            EventPriority::Normal,
        )
    }

    pub fn performance_metric_event(metric_name: &str, value: f64) -> Event {
        Event::new(
            EventCategory::SystemPerformanceMetric,
            "metrics",
            "performance_metric",
            json!({ "metric_name": metric_name, "value": value }),
            EventPriority::Low,
        )
    }

    pub fn human_review_event(decision_id: &str, review_reason: &str) -> Event {
        Event::new(
            EventCategory::HumanReviewRequested,
            "human_collaboration",
            "review_request",
            json!({ "decision_id": decision_id, "reason": review_reason }),
            EventPriority::High,
        )
    }
}
