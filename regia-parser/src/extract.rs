use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use regia_core::extract_regulatory_terms;

/// Alias tables for regulatory body attribution. Scoring counts
/// case-insensitive occurrences of every alias; the highest total wins.
const REGULATORY_BODIES: &[(&str, &[&str])] = &[
    ("SEC", &["sec", "securities and exchange commission", "edgar"]),
    ("FCA", &["fca", "financial conduct authority"]),
    ("ECB", &["ecb", "european central bank"]),
    ("FINRA", &["finra", "financial industry regulatory authority"]),
    ("CFTC", &["cftc", "commodity futures trading commission"]),
    ("OCC", &["occ", "comptroller of the currency"]),
    ("FDIC", &["fdic", "federal deposit insurance"]),
    ("FRB", &["frb", "federal reserve"]),
    ("EBA", &["eba", "european banking authority"]),
    ("ESMA", &["esma", "european securities and markets authority"]),
    ("BCBS", &["bcbs", "basel committee"]),
    ("PRA", &["pra", "prudential regulation authority"]),
];

const DOCUMENT_TYPES: &[(&str, &[&str])] = &[
    ("rule", &["final rule", "proposed rule", "rulemaking", "rule"]),
    ("guidance", &["guidance", "guideline"]),
    ("order", &["order"]),
    ("release", &["release"]),
    ("report", &["report"]),
    ("policy", &["policy"]),
    ("directive", &["directive"]),
    ("standard", &["standard"]),
];

const DOCUMENT_NUMBER_PATTERNS: &[&str] = &[
    r"(?i)release\s+no\.?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)file\s+no\.?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)document\s+no\.?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)\bref[:.]\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)docket\s+no\.?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)case\s+no\.?\s*([A-Za-z0-9][A-Za-z0-9/-]*)",
    r"(?i)\bRIN\s+([0-9][A-Za-z0-9-]*)",
    r"(?i)FR\s+Doc\.?\s*([0-9][0-9-]*)",
];

const DATE_CONTEXT_PATTERNS: &[&str] = &[
    r"(?i)effective\s+(?:date[:\s]*|on\s+|as\s+of\s+)?([A-Za-z]+\s+\d{1,2},?\s+\d{4})",
    r"(?i)effective\s+(?:date[:\s]*|on\s+|as\s+of\s+)?(\d{4}-\d{2}-\d{2})",
    r"(?i)effective\s+(?:date[:\s]*|on\s+|as\s+of\s+)?\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b",
    r"\b(\d{4}-\d{2}-\d{2})\b",
    r"([A-Z][a-z]+\s+\d{1,2},\s+\d{4})",
    r"\b(\d{1,2}/\d{1,2}/\d{4})\b",
];

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%m/%d/%y",
    "%B %d, %Y",
    "%B %d %Y",
];

const ENTITY_CLASSES: &[&str] = &[
    "banks",
    "broker-dealers",
    "investment advisers",
    "credit institutions",
    "insurers",
    "payment institutions",
    "asset managers",
    "issuers",
];

pub fn extract_regulatory_body(content: &str) -> String {
    let lower = content.to_lowercase();
    let mut best = ("Unknown", 0usize);
    for (body, aliases) in REGULATORY_BODIES {
        let score: usize = aliases.iter().map(|a| lower.matches(a).count()).sum();
        if score > best.1 {
            best = (body, score);
        }
    }
    best.0.to_string()
}

pub fn extract_document_type(content: &str) -> String {
    let lower = content.to_lowercase();
    let mut best = ("general", 0usize);
    for (doc_type, aliases) in DOCUMENT_TYPES {
        let score: usize = aliases.iter().map(|a| lower.matches(a).count()).sum();
        if score > best.1 {
            best = (doc_type, score);
        }
    }
    best.0.to_string()
}

pub fn extract_document_number(content: &str) -> String {
    for pattern in DOCUMENT_NUMBER_PATTERNS {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(_) => continue,
        };
        if let Some(captures) = regex.captures(content) {
            if let Some(number) = captures.get(1) {
                return number.as_str().trim_end_matches(['.', ',']).to_string();
            }
        }
    }
    String::new()
}

/// Tries the context patterns in order, parsing each matched substring against
/// the known formats. Returns `None` rather than guessing.
pub fn extract_effective_date(content: &str) -> Option<DateTime<Utc>> {
    for pattern in DATE_CONTEXT_PATTERNS {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(_) => continue,
        };
        for captures in regex.captures_iter(content) {
            let candidate = match captures.get(1) {
                Some(m) => m.as_str().trim(),
                None => continue,
            };
            for format in DATE_FORMATS {
                if let Ok(date) = NaiveDate::parse_from_str(candidate, format) {
                    if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                        return Some(Utc.from_utc_datetime(&midnight));
                    }
                }
            }
        }
    }
    None
}

/// Keyword extraction: regulatory vocabulary intersection first, then
/// capitalized multi-word phrases and numeric patterns. Deduplicated in
/// first-occurrence order.
pub fn extract_keywords_from_text(text: &str) -> Vec<String> {
    let mut keywords = extract_regulatory_terms(text);

    let phrase_regex = Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+)+)\b").unwrap();
    for captures in phrase_regex.captures_iter(text) {
        push_unique(&mut keywords, captures[1].to_string());
    }

    let numeric_patterns = [
        r"\b\d+(?:\.\d+)?\s*(?:%|percent|per cent)",
        r"[$€£]\s?\d[\d,]*(?:\.\d+)?(?:\s*(?:million|billion|trillion))?",
        r"\b\d{4}-\d{2}-\d{2}\b",
        r"\b\d+\s+(?:days?|months?|years?|basis\s+points?)\b",
    ];
    for pattern in numeric_patterns {
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(_) => continue,
        };
        for matched in regex.find_iter(text) {
            push_unique(&mut keywords, matched.as_str().trim().to_string());
        }
    }

    keywords
}

pub fn extract_affected_entities(content: &str) -> Vec<String> {
    let mut entities = Vec::new();
    let lower = content.to_lowercase();

    let scope_regex =
        Regex::new(r"(?i)(?:applies to|applicable to|covered entities(?: include)?)[:\s]+([^.\n]{3,120})")
            .unwrap();
    for captures in scope_regex.captures_iter(content) {
        push_unique(&mut entities, captures[1].trim().to_string());
    }

    for class in ENTITY_CLASSES {
        if lower.contains(class) {
            push_unique(&mut entities, (*class).to_string());
        }
    }

    entities
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !value.is_empty() && !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_extract_regulatory_body() {
        assert_eq!(
            extract_regulatory_body("The Securities and Exchange Commission adopted a rule"),
            "SEC"
        );
        assert_eq!(
            extract_regulatory_body("FCA publishes new FCA handbook guidance"),
            "FCA"
        );
        assert_eq!(
            extract_regulatory_body("European Central Bank announcement"),
            "ECB"
        );
        assert_eq!(extract_regulatory_body("nothing to see"), "Unknown");
    }

    #[test]
    fn test_body_scoring_prefers_higher_count() {
        let content = "SEC SEC SEC mentions FCA once";
        assert_eq!(extract_regulatory_body(content), "SEC");
    }

    #[test]
    fn test_extract_document_type() {
        assert_eq!(extract_document_type("Final rule on capital"), "rule");
        assert_eq!(extract_document_type("Supervisory guidance issued"), "guidance");
        assert_eq!(extract_document_type("Annual report published"), "report");
        assert_eq!(extract_document_type("miscellaneous text"), "general");
    }

    #[test]
    fn test_extract_document_number() {
        assert_eq!(
            extract_document_number("See Release No. 34-12345 for details"),
            "34-12345"
        );
        assert_eq!(extract_document_number("File No. S7-01-24."), "S7-01-24");
        assert_eq!(extract_document_number("RIN 3235-AM85 applies"), "3235-AM85");
        assert_eq!(extract_document_number("no identifiers here"), "");
    }

    #[test]
    fn test_extract_effective_date_formats() {
        let date = extract_effective_date("This rule is effective January 15, 2025.").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2025, 1, 15));

        let date = extract_effective_date("Effective date: 2024-07-01").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 7, 1));

        let date = extract_effective_date("effective 03/15/2024 for all firms").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 15));
    }

    #[test]
    fn test_extract_effective_date_never_guesses() {
        assert!(extract_effective_date("no dates at all").is_none());
        assert!(extract_effective_date("effective soon").is_none());
    }

    #[test]
    fn test_extract_keywords_vocabulary_and_numeric() {
        let keywords =
            extract_keywords_from_text("Capital ratio rises to 10.5% with a 90 days transition");
        assert!(keywords.contains(&"capital".to_string()));
        assert!(keywords.contains(&"ratio".to_string()));
        assert!(keywords.iter().any(|k| k.contains("10.5")));
        assert!(keywords.iter().any(|k| k.contains("90 days")));
    }

    #[test]
    fn test_extract_keywords_capitalized_phrases() {
        let keywords = extract_keywords_from_text("The Basel Committee updated Liquidity Coverage rules");
        assert!(keywords.contains(&"Basel Committee".to_string()));
        assert!(keywords.contains(&"Liquidity Coverage".to_string()));
    }

    #[test]
    fn test_keywords_deduplicated() {
        let keywords = extract_keywords_from_text("capital capital capital");
        assert_eq!(
            keywords.iter().filter(|k| k.as_str() == "capital").count(),
            1
        );
    }

    #[test]
    fn test_extract_affected_entities() {
        let entities =
            extract_affected_entities("This regulation applies to: all registered broker-dealers");
        assert!(!entities.is_empty());
        assert!(entities.iter().any(|e| e.contains("broker-dealers")));
    }
}
