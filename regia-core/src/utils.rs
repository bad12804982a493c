use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static CHANGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Vocabulary used for keyword intersection across the parser and the change
/// detector. Order matters: first occurrence in content wins ordering.
pub const REGULATORY_TERMS: &[&str] = &[
    "compliance",
    "regulation",
    "regulatory",
    "requirement",
    "capital",
    "liquidity",
    "risk",
    "report",
    "disclosure",
    "audit",
    "enforcement",
    "penalty",
    "sanction",
    "deadline",
    "effective",
    "prohibited",
    "mandatory",
    "threshold",
    "ratio",
    "basel",
    "governance",
    "supervision",
    "prudential",
    "solvency",
    "margin",
    "settlement",
    "custody",
    "derivative",
    "securities",
    "banking",
    "insurance",
    "investment",
    "consumer",
    "privacy",
    "cybersecurity",
    "resilience",
    "buffer",
    "filing",
    "guidance",
    "directive",
];

/// Current time truncated to millisecond precision, matching the resolution
/// of every persisted and exported timestamp.
pub fn now_millis() -> chrono::DateTime<chrono::Utc> {
    use chrono::TimeZone;
    let now = chrono::Utc::now();
    chrono::Utc
        .timestamp_millis_opt(now.timestamp_millis())
        .single()
        .unwrap_or(now)
}

pub fn generate_change_id() -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or(0);
    let counter = CHANGE_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
    format!("reg_change_{}_{}", micros, counter)
}

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Search tokenization: split on non-alphanumerics, lowercase, drop tokens
/// shorter than 3 characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}

pub fn is_stop_word(word: &str) -> bool {
    matches!(
        word,
        "the" | "and" | "for" | "are" | "but" | "not" | "you" | "all" | "can" | "had" | "her"
            | "was" | "one" | "our" | "out" | "day" | "get" | "has" | "him" | "his" | "how"
            | "man" | "new" | "now" | "old" | "see" | "two" | "way" | "who" | "did" | "its"
            | "let" | "put" | "say" | "she" | "too" | "use" | "this" | "that" | "with" | "from"
            | "will" | "have" | "been" | "must" | "shall"
    )
}

pub fn extract_keywords(text: &str) -> Vec<String> {
    let word_regex = Regex::new(r"\b[a-zA-Z]{3,}\b").unwrap();
    word_regex
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|word| !is_stop_word(word))
        .collect()
}

/// Intersects lowercased content with [`REGULATORY_TERMS`], deduplicated in
/// first-occurrence order.
pub fn extract_regulatory_terms(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut found: Vec<(usize, String)> = Vec::new();
    for term in REGULATORY_TERMS {
        if let Some(pos) = lower.find(term) {
            found.push((pos, (*term).to_string()));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    let mut result = Vec::new();
    for (_, term) in found {
        if !result.contains(&term) {
            result.push(term);
        }
    }
    result
}

pub fn truncate_string(input: &str, max_length: usize) -> String {
    if input.len() <= max_length {
        input.to_string()
    } else {
        format!("{}...", &input[..max_length.saturating_sub(3)])
    }
}

pub fn title_case(input: &str) -> String {
    input
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
