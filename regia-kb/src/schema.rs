use regia_core::{RegiaError, RegiaResult};
use sqlx::{Pool, Postgres};

pub struct KnowledgeBaseSchema;

impl KnowledgeBaseSchema {
    pub async fn create_all_tables(pool: &Pool<Postgres>) -> RegiaResult<()> {
        Self::create_regulatory_changes_table(pool).await?;
        Self::create_indexes(pool).await?;
        Ok(())
    }

    async fn create_regulatory_changes_table(pool: &Pool<Postgres>) -> RegiaResult<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS regulatory_changes (
                change_id VARCHAR(100) PRIMARY KEY,
                source_id VARCHAR(100) NOT NULL,
                title TEXT NOT NULL,
                content_url TEXT NOT NULL DEFAULT '',
                regulatory_body VARCHAR(100) NOT NULL DEFAULT '',
                document_type VARCHAR(100) NOT NULL DEFAULT '',
                document_number VARCHAR(200) NOT NULL DEFAULT '',
                status INT NOT NULL DEFAULT 0,
                detected_at BIGINT NOT NULL,
                analyzed_at BIGINT,
                distributed_at BIGINT,
                impact_level INT,
                executive_summary TEXT,
                keywords TEXT[] NOT NULL DEFAULT '{}',
                affected_entities TEXT[] NOT NULL DEFAULT '{}',
                required_actions TEXT[] NOT NULL DEFAULT '{}',
                compliance_deadlines TEXT[] NOT NULL DEFAULT '{}',
                custom_fields JSONB NOT NULL DEFAULT '{}',
                risk_scores JSONB NOT NULL DEFAULT '{}',
                affected_domains INT[] NOT NULL DEFAULT '{}',
                analysis_timestamp BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                CONSTRAINT valid_status CHECK (status >= 0 AND status <= 4),
                CONSTRAINT valid_impact CHECK (impact_level IS NULL OR (impact_level >= 0 AND impact_level <= 3))
            );
        "#;

        sqlx::query(query)
            .execute(pool)
            .await
            .map_err(|e| RegiaError::DatabaseError {
                operation: "create_regulatory_changes_table".to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn create_indexes(pool: &Pool<Postgres>) -> RegiaResult<()> {
        let queries = [
            "CREATE INDEX IF NOT EXISTS idx_changes_body ON regulatory_changes (regulatory_body);",
            "CREATE INDEX IF NOT EXISTS idx_changes_impact ON regulatory_changes (impact_level);",
            "CREATE INDEX IF NOT EXISTS idx_changes_status ON regulatory_changes (status);",
            "CREATE INDEX IF NOT EXISTS idx_changes_detected_at ON regulatory_changes (detected_at);",
            "CREATE INDEX IF NOT EXISTS idx_changes_title_fts ON regulatory_changes USING GIN (to_tsvector('english', title));",
            "CREATE INDEX IF NOT EXISTS idx_changes_summary_fts ON regulatory_changes USING GIN (to_tsvector('english', COALESCE(executive_summary, '')));",
            "CREATE INDEX IF NOT EXISTS idx_changes_keywords ON regulatory_changes USING GIN (keywords);",
            "CREATE INDEX IF NOT EXISTS idx_changes_domains ON regulatory_changes USING GIN (affected_domains);",
        ];

        for query in queries {
            sqlx::query(query)
                .execute(pool)
                .await
                .map_err(|e| RegiaError::DatabaseError {
                    operation: "create_change_indexes".to_string(),
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }
}
