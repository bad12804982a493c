use crate::schema::KnowledgeBaseSchema;
use chrono::{TimeZone, Utc};
use regia_core::{
    BusinessDomain, ChangeStatus, RegiaError, RegiaResult, RegulatoryChange,
    RegulatoryChangeAnalysis, RegulatoryChangeMetadata, RegulatoryImpact,
};
use sqlx::{Pool, Postgres, Row};
use std::collections::HashMap;

/// Durable mirror of the in-process change store.
pub struct PostgresChangeStore {
    pool: Pool<Postgres>,
}

impl PostgresChangeStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> RegiaResult<()> {
        KnowledgeBaseSchema::create_all_tables(&self.pool).await
    }

    pub async fn upsert_change(&self, change: &RegulatoryChange) -> RegiaResult<()> {
        let metadata = change.metadata();
        let analysis = change.analysis();

        let custom_fields = serde_json::to_value(&metadata.custom_fields)?;
        let risk_scores = match analysis {
            Some(a) => serde_json::to_value(&a.risk_scores)?,
            None => serde_json::json!({}),
        };
        let affected_domains: Vec<i32> = analysis
            .map(|a| a.affected_domains.iter().map(|d| d.as_i32()).collect())
            .unwrap_or_default();
        let required_actions: Vec<String> =
            analysis.map(|a| a.required_actions.clone()).unwrap_or_default();
        let compliance_deadlines: Vec<String> = analysis
            .map(|a| a.compliance_deadlines.clone())
            .unwrap_or_default();

        let query = r#"
            INSERT INTO regulatory_changes (
                change_id, source_id, title, content_url, regulatory_body,
                document_type, document_number, status, detected_at, analyzed_at,
                distributed_at, impact_level, executive_summary, keywords,
                affected_entities, required_actions, compliance_deadlines,
                custom_fields, risk_scores, affected_domains, analysis_timestamp
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                      $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (change_id) DO UPDATE SET
                status = EXCLUDED.status,
                analyzed_at = EXCLUDED.analyzed_at,
                distributed_at = EXCLUDED.distributed_at,
                impact_level = EXCLUDED.impact_level,
                executive_summary = EXCLUDED.executive_summary,
                required_actions = EXCLUDED.required_actions,
                compliance_deadlines = EXCLUDED.compliance_deadlines,
                risk_scores = EXCLUDED.risk_scores,
                affected_domains = EXCLUDED.affected_domains,
                analysis_timestamp = EXCLUDED.analysis_timestamp,
                updated_at = NOW();
        "#;

        sqlx::query(query)
            .bind(change.change_id())
            .bind(change.source_id())
            .bind(change.title())
            .bind(change.content_url())
            .bind(&metadata.regulatory_body)
            .bind(&metadata.document_type)
            .bind(&metadata.document_number)
            .bind(change.status().as_i32())
            .bind(change.detected_at().timestamp_millis())
            .bind(change.analyzed_at().map(|t| t.timestamp_millis()))
            .bind(change.distributed_at().map(|t| t.timestamp_millis()))
            .bind(analysis.map(|a| a.impact_level.as_i32()))
            .bind(analysis.map(|a| a.executive_summary.clone()))
            .bind(&metadata.keywords)
            .bind(&metadata.affected_entities)
            .bind(&required_actions)
            .bind(&compliance_deadlines)
            .bind(custom_fields)
            .bind(risk_scores)
            .bind(&affected_domains)
            .bind(analysis.map(|a| a.analysis_timestamp.timestamp_millis()))
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "upsert_change".to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    pub async fn fetch_change(&self, change_id: &str) -> RegiaResult<Option<RegulatoryChange>> {
        let query = "SELECT * FROM regulatory_changes WHERE change_id = $1";
        let row = sqlx::query(query)
            .bind(change_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "fetch_change".to_string(),
                reason: e.to_string(),
            })?;

        row.map(Self::row_to_change).transpose()
    }

    pub async fn fetch_by_source(
        &self,
        source_id: &str,
        limit: i64,
    ) -> RegiaResult<Vec<RegulatoryChange>> {
        let query = "SELECT * FROM regulatory_changes WHERE source_id = $1 ORDER BY detected_at DESC LIMIT $2";
        let rows = sqlx::query(query)
            .bind(source_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "fetch_by_source".to_string(),
                reason: e.to_string(),
            })?;

        rows.into_iter().map(Self::row_to_change).collect()
    }

    pub async fn delete_all(&self) -> RegiaResult<()> {
        sqlx::query("TRUNCATE regulatory_changes")
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "truncate_changes".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn row_to_change(row: sqlx::postgres::PgRow) -> RegiaResult<RegulatoryChange> {
        let db_err = |operation: &str, reason: String| RegiaError::DatabaseError {
            operation: operation.to_string(),
            reason,
        };

        let change_id: String = row
            .try_get("change_id")
            .map_err(|e| db_err("decode_change_id", e.to_string()))?;
        let status_raw: i32 = row
            .try_get("status")
            .map_err(|e| db_err("decode_status", e.to_string()))?;
        let status = ChangeStatus::from_i32(status_raw).ok_or_else(|| {
            RegiaError::ValidationError {
                field: "status".to_string(),
                message: format!("unknown status {} for {}", status_raw, change_id),
            }
        })?;

        let millis = |column: &str| -> Option<chrono::DateTime<Utc>> {
            row.try_get::<Option<i64>, _>(column)
                .ok()
                .flatten()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        };

        let detected_at_ms: i64 = row
            .try_get("detected_at")
            .map_err(|e| db_err("decode_detected_at", e.to_string()))?;
        let detected_at = Utc
            .timestamp_millis_opt(detected_at_ms)
            .single()
            .ok_or_else(|| RegiaError::ValidationError {
                field: "detected_at".to_string(),
                message: format!("invalid timestamp {}", detected_at_ms),
            })?;

        let custom_fields: HashMap<String, String> = row
            .try_get::<serde_json::Value, _>("custom_fields")
            .ok()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        let metadata = RegulatoryChangeMetadata {
            regulatory_body: row.try_get("regulatory_body").unwrap_or_default(),
            document_type: row.try_get("document_type").unwrap_or_default(),
            document_number: row.try_get("document_number").unwrap_or_default(),
            keywords: row.try_get("keywords").unwrap_or_default(),
            affected_entities: row.try_get("affected_entities").unwrap_or_default(),
            custom_fields,
        };

        let impact_raw: Option<i32> = row.try_get("impact_level").ok().flatten();
        let analysis = match impact_raw.and_then(RegulatoryImpact::from_i32) {
            Some(impact_level) => {
                let risk_scores: HashMap<String, f64> = row
                    .try_get::<serde_json::Value, _>("risk_scores")
                    .ok()
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default();
                let domains_raw: Vec<i32> = row.try_get("affected_domains").unwrap_or_default();
                Some(RegulatoryChangeAnalysis {
                    impact_level,
                    executive_summary: row
                        .try_get::<Option<String>, _>("executive_summary")
                        .ok()
                        .flatten()
                        .unwrap_or_default(),
                    affected_domains: domains_raw
                        .into_iter()
                        .filter_map(BusinessDomain::from_i32)
                        .collect(),
                    required_actions: row.try_get("required_actions").unwrap_or_default(),
                    compliance_deadlines: row.try_get("compliance_deadlines").unwrap_or_default(),
                    risk_scores,
                    analysis_timestamp: millis("analysis_timestamp").unwrap_or(detected_at),
                })
            }
            None => None,
        };

        Ok(RegulatoryChange::from_parts(
            change_id,
            row.try_get("source_id").unwrap_or_default(),
            row.try_get("title").unwrap_or_default(),
            row.try_get("content_url").unwrap_or_default(),
            metadata,
            status,
            detected_at,
            millis("analyzed_at"),
            millis("distributed_at"),
            analysis,
        ))
    }
}
