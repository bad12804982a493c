use crate::knowledge_base::RegulatoryKnowledgeBase;
use regia_core::{RegiaError, RegiaResult};
use std::path::Path;
use tracing::info;

pub const SNAPSHOT_FILE_NAME: &str = "regulatory_knowledge_base.json";

impl RegulatoryKnowledgeBase {
    /// Writes the full JSON snapshot; called at shutdown when a snapshot path
    /// is configured.
    pub fn save_snapshot(&self, path: &Path) -> RegiaResult<()> {
        let snapshot = self.export_to_json();
        let serialized = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, serialized).map_err(|e| RegiaError::DatabaseError {
            operation: format!("save_snapshot {}", path.display()),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), "knowledge base snapshot written");
        Ok(())
    }

    /// Loads a snapshot written by [`save_snapshot`]; a missing file is not an
    /// error, the knowledge base just starts empty.
    pub async fn load_snapshot(&self, path: &Path) -> RegiaResult<usize> {
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| RegiaError::DatabaseError {
            operation: format!("load_snapshot {}", path.display()),
            reason: e.to_string(),
        })?;
        let snapshot: serde_json::Value = serde_json::from_str(&raw)?;
        self.import_from_json(&snapshot).await
    }
}
