use async_trait::async_trait;
use dashmap::DashMap;
use regia_core::{RegiaError, RegiaResult};
use sqlx::{Pool, Postgres, Row};

/// Durable `(source_id, key) -> value` cursor storage. Each write is a single
/// atomic upsert.
#[async_trait]
pub trait SourceStateStore: Send + Sync {
    async fn initialize(&self) -> RegiaResult<()>;
    async fn persist_state(&self, source_id: &str, key: &str, value: &str) -> RegiaResult<()>;
    async fn load_state(&self, source_id: &str, key: &str) -> RegiaResult<Option<String>>;
}

#[derive(Default)]
pub struct InMemorySourceStateStore {
    entries: DashMap<(String, String), String>,
}

impl InMemorySourceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SourceStateStore for InMemorySourceStateStore {
    async fn initialize(&self) -> RegiaResult<()> {
        Ok(())
    }

    async fn persist_state(&self, source_id: &str, key: &str, value: &str) -> RegiaResult<()> {
        self.entries
            .insert((source_id.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    async fn load_state(&self, source_id: &str, key: &str) -> RegiaResult<Option<String>> {
        Ok(self
            .entries
            .get(&(source_id.to_string(), key.to_string()))
            .map(|entry| entry.clone()))
    }
}

pub struct PostgresSourceStateStore {
    pool: Pool<Postgres>,
}

impl PostgresSourceStateStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceStateStore for PostgresSourceStateStore {
    async fn initialize(&self) -> RegiaResult<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS regulatory_source_state (
                source_id VARCHAR(100) NOT NULL,
                state_key VARCHAR(100) NOT NULL,
                state_value TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (source_id, state_key)
            );
        "#;
        sqlx::query(query)
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "create_source_state_table".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn persist_state(&self, source_id: &str, key: &str, value: &str) -> RegiaResult<()> {
        let query = r#"
            INSERT INTO regulatory_source_state (source_id, state_key, state_value)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_id, state_key) DO UPDATE SET
                state_value = EXCLUDED.state_value,
                updated_at = NOW();
        "#;
        sqlx::query(query)
            .bind(source_id)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "persist_source_state".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn load_state(&self, source_id: &str, key: &str) -> RegiaResult<Option<String>> {
        let row = sqlx::query(
            "SELECT state_value FROM regulatory_source_state WHERE source_id = $1 AND state_key = $2",
        )
        .bind(source_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RegiaError::DatabaseError {
            operation: "load_source_state".to_string(),
            reason: e.to_string(),
        })?;

        Ok(row.and_then(|r| r.try_get::<String, _>("state_value").ok()))
    }
}
