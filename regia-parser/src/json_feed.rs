use regia_core::{RegiaError, RegiaResult};
use serde_json::Value;

/// One entry of a JSON feed, as configured for custom sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonFeedItem {
    pub title: String,
    pub description: String,
    pub url: String,
    pub change_type: String,
    pub severity: String,
}

/// Resolves a dotted path (`data.updates`) inside a JSON document.
pub fn resolve_items_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Parses a JSON feed body, extracting items at `items_path` (default
/// `items`). A top-level array is accepted as the item list itself.
pub fn parse_json_items(body: &str, items_path: &str) -> RegiaResult<Vec<JsonFeedItem>> {
    let value: Value = serde_json::from_str(body).map_err(|e| RegiaError::ParseError {
        content_type: "json".to_string(),
        reason: e.to_string(),
    })?;

    let items = if value.is_array() {
        Some(&value)
    } else {
        resolve_items_path(&value, items_path)
    };

    let items = match items.and_then(|v| v.as_array()) {
        Some(items) => items,
        None => return Ok(Vec::new()),
    };

    let text = |item: &Value, key: &str| -> String {
        item.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Ok(items
        .iter()
        .map(|item| JsonFeedItem {
            title: text(item, "title"),
            description: text(item, "description"),
            url: text(item, "url"),
            change_type: text(item, "type"),
            severity: text(item, "severity"),
        })
        .collect())
}
