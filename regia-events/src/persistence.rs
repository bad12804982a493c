use crate::event::{Event, EventCategory, EventState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regia_core::{RegiaError, RegiaResult};
use sqlx::{Pool, Postgres, Row};

/// Durable store for high-priority and failed events.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn initialize(&self) -> RegiaResult<()>;
    async fn persist_event(&self, event: &Event) -> RegiaResult<()>;
    async fn get_events(
        &self,
        category: EventCategory,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>>;
    async fn get_events_by_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> RegiaResult<u64>;
}

/// Keeps persisted events in process; the default backend for embedded and
/// test deployments.
#[derive(Default)]
pub struct InMemoryEventStore {
    events: DashMap<String, Event>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn initialize(&self) -> RegiaResult<()> {
        Ok(())
    }

    async fn persist_event(&self, event: &Event) -> RegiaResult<()> {
        self.events.insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn get_events(
        &self,
        category: EventCategory,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        let mut results: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| entry.category == category && entry.created_at >= since)
            .map(|entry| entry.clone())
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    async fn get_events_by_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        let mut results: Vec<Event> = self
            .events
            .iter()
            .filter(|entry| entry.source == source && entry.created_at >= since)
            .map(|entry| entry.clone())
            .collect();
        results.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(results)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RegiaResult<u64> {
        let before = self.events.len();
        self.events.retain(|_, event| event.expires_at >= now);
        Ok((before - self.events.len()) as u64)
    }
}

pub struct PostgresEventStore {
    pool: Pool<Postgres>,
}

impl PostgresEventStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_event(row: sqlx::postgres::PgRow) -> RegiaResult<Event> {
        let value = serde_json::json!({
            "event_id": row.try_get::<String, _>("event_id").unwrap_or_default(),
            "category": row.try_get::<String, _>("category").unwrap_or_default(),
            "source": row.try_get::<String, _>("source").unwrap_or_default(),
            "event_type": row.try_get::<String, _>("event_type").unwrap_or_default(),
            "payload": row
                .try_get::<serde_json::Value, _>("payload")
                .unwrap_or(serde_json::json!({})),
            "priority": row.try_get::<String, _>("priority").unwrap_or_default(),
            "state": row.try_get::<String, _>("state").unwrap_or_default(),
            "retry_count": row.try_get::<i32, _>("retry_count").unwrap_or(0),
            "created_at": row.try_get::<i64, _>("created_at").unwrap_or(0),
            "expires_at": row.try_get::<i64, _>("expires_at").unwrap_or(0),
            "headers": row
                .try_get::<serde_json::Value, _>("headers")
                .unwrap_or(serde_json::json!({})),
            "correlation_id": row
                .try_get::<Option<String>, _>("correlation_id")
                .unwrap_or_default()
                .unwrap_or_default(),
            "trace_id": row
                .try_get::<Option<String>, _>("trace_id")
                .unwrap_or_default()
                .unwrap_or_default(),
        });
        Event::from_json(&value)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn initialize(&self) -> RegiaResult<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id VARCHAR(64) PRIMARY KEY,
                category VARCHAR(64) NOT NULL,
                source VARCHAR(200) NOT NULL,
                event_type VARCHAR(200) NOT NULL,
                payload JSONB NOT NULL DEFAULT '{}',
                priority VARCHAR(16) NOT NULL,
                state VARCHAR(16) NOT NULL,
                retry_count INT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                expires_at BIGINT NOT NULL,
                headers JSONB NOT NULL DEFAULT '{}',
                correlation_id VARCHAR(200),
                trace_id VARCHAR(200),
                processed_at BIGINT,
                error_message TEXT
            );
        "#;
        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "create_events_table".to_string(),
                reason: e.to_string(),
            })?;

        for query in [
            "CREATE INDEX IF NOT EXISTS idx_events_category ON events (category, created_at);",
            "CREATE INDEX IF NOT EXISTS idx_events_source ON events (source, created_at);",
            "CREATE INDEX IF NOT EXISTS idx_events_expires ON events (expires_at);",
        ] {
            sqlx::query(query)
                .execute(&self.pool)
                .await
                .map_err(|e| RegiaError::DatabaseError {
                    operation: "create_event_indexes".to_string(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    async fn persist_event(&self, event: &Event) -> RegiaResult<()> {
        let query = r#"
            INSERT INTO events (
                event_id, category, source, event_type, payload, priority, state,
                retry_count, created_at, expires_at, headers, correlation_id,
                trace_id, processed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (event_id) DO UPDATE SET
                state = EXCLUDED.state,
                retry_count = EXCLUDED.retry_count,
                processed_at = EXCLUDED.processed_at;
        "#;

        let processed_at = if event.state == EventState::Processed {
            Some(Utc::now().timestamp_millis())
        } else {
            None
        };

        sqlx::query(query)
            .bind(&event.event_id)
            .bind(event.category.as_str())
            .bind(&event.source)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.priority.as_str())
            .bind(event.state.as_str())
            .bind(event.retry_count as i32)
            .bind(event.created_at.timestamp_millis())
            .bind(event.expires_at.timestamp_millis())
            .bind(serde_json::to_value(&event.headers)?)
            .bind(&event.correlation_id)
            .bind(&event.trace_id)
            .bind(processed_at)
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "persist_event".to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn get_events(
        &self,
        category: EventCategory,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE category = $1 AND created_at >= $2 ORDER BY created_at",
        )
        .bind(category.as_str())
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegiaError::DatabaseError {
            operation: "get_events".to_string(),
            reason: e.to_string(),
        })?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_by_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE source = $1 AND created_at >= $2 ORDER BY created_at",
        )
        .bind(source)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RegiaError::DatabaseError {
            operation: "get_events_by_source".to_string(),
            reason: e.to_string(),
        })?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RegiaResult<u64> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at < $1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "delete_expired_events".to_string(),
                reason: e.to_string(),
            })?;
        Ok(result.rows_affected())
    }
}
