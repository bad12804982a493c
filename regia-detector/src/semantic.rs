use regex::Regex;
use regia_core::extract_regulatory_terms;
use std::collections::{HashMap, HashSet};

pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Term-frequency vector over lowercased word tokens longer than two
/// characters.
pub fn term_frequency(content: &str) -> HashMap<String, f64> {
    let token_regex = Regex::new(r"\b\w{3,}\b").unwrap();
    let mut tf = HashMap::new();
    for token in token_regex.find_iter(content) {
        *tf.entry(token.as_str().to_lowercase()).or_insert(0.0) += 1.0;
    }
    tf
}

pub fn cosine_similarity(tf1: &HashMap<String, f64>, tf2: &HashMap<String, f64>) -> f64 {
    if tf1.is_empty() && tf2.is_empty() {
        return 1.0;
    }
    let dot: f64 = tf1
        .iter()
        .filter_map(|(token, weight)| tf2.get(token).map(|other| weight * other))
        .sum();
    let norm1: f64 = tf1.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm2: f64 = tf2.values().map(|w| w * w).sum::<f64>().sqrt();
    if norm1 == 0.0 || norm2 == 0.0 {
        0.0
    } else {
        (dot / (norm1 * norm2)).clamp(0.0, 1.0)
    }
}

/// Headers and section markers: Markdown headings, `Section N`, Roman-numeral
/// items, `N.` items and ALL-CAPS lines.
pub fn extract_structural_elements(content: &str) -> HashSet<String> {
    let patterns = [
        r"^#{1,6}\s+.+$",
        r"(?i)^section\s+\d+.*$",
        r"^[IVXLCDM]+\.\s+.+$",
        r"^\d+\.\s+.+$",
    ];
    let regexes: Vec<Regex> = patterns.iter().filter_map(|p| Regex::new(p).ok()).collect();

    let mut elements = HashSet::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_marker = regexes.iter().any(|r| r.is_match(trimmed));
        let is_all_caps = trimmed.len() > 3
            && trimmed.chars().any(|c| c.is_alphabetic())
            && trimmed
                .chars()
                .filter(|c| c.is_alphabetic())
                .all(|c| c.is_uppercase());
        if is_marker || is_all_caps {
            elements.insert(trimmed.to_string());
        }
    }
    elements
}

pub fn structural_similarity(baseline: &str, new: &str) -> f64 {
    jaccard_similarity(
        &extract_structural_elements(baseline),
        &extract_structural_elements(new),
    )
}

/// Weighted semantic distance in [0, 1]:
/// `0.35*(1-jaccard) + 0.35*(1-cosine) + 0.20*(1-structural) + 0.10*len_delta`.
pub fn semantic_change_score(baseline: &str, new: &str) -> f64 {
    let baseline_keywords: HashSet<String> =
        extract_regulatory_terms(baseline).into_iter().collect();
    let new_keywords: HashSet<String> = extract_regulatory_terms(new).into_iter().collect();
    let keyword_term = 1.0 - jaccard_similarity(&baseline_keywords, &new_keywords);

    let cosine_term = 1.0 - cosine_similarity(&term_frequency(baseline), &term_frequency(new));

    let structural_term = 1.0 - structural_similarity(baseline, new);

    let len_base = baseline.len().max(1) as f64;
    let len_delta = ((new.len() as f64 - baseline.len() as f64).abs() / len_base).min(1.0);

    (0.35 * keyword_term + 0.35 * cosine_term + 0.20 * structural_term + 0.10 * len_delta)
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity(&set(&["a", "b"]), &set(&["a", "b"])), 1.0);
        assert_eq!(jaccard_similarity(&set(&["a"]), &set(&["b"])), 0.0);
        let half = jaccard_similarity(&set(&["a", "b"]), &set(&["b", "c"]));
        assert!((half - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(jaccard_similarity(&set(&[]), &set(&[])), 1.0);
    }

    #[test]
    fn test_term_frequency_filters_short_tokens() {
        let tf = term_frequency("a an the capital capital ratio");
        assert_eq!(tf.get("capital"), Some(&2.0));
        assert_eq!(tf.get("ratio"), Some(&1.0));
        assert_eq!(tf.get("the"), Some(&1.0));
        assert!(tf.get("a").is_none());
        assert!(tf.get("an").is_none());
    }

    #[test]
    fn test_cosine_identical_and_disjoint() {
        let tf1 = term_frequency("capital ratio requirements");
        let tf2 = term_frequency("capital ratio requirements");
        assert!((cosine_similarity(&tf1, &tf2) - 1.0).abs() < 1e-9);

        let tf3 = term_frequency("completely different words");
        assert_eq!(cosine_similarity(&tf1, &tf3), 0.0);
    }

    #[test]
    fn test_structural_elements() {
        let content = "# Heading\nSection 2 Capital\nIV. Liquidity\n3. Reporting\nREQUIREMENTS\nplain line";
        let elements = extract_structural_elements(content);
        assert!(elements.contains("# Heading"));
        assert!(elements.contains("Section 2 Capital"));
        assert!(elements.contains("IV. Liquidity"));
        assert!(elements.contains("3. Reporting"));
        assert!(elements.contains("REQUIREMENTS"));
        assert!(!elements.contains("plain line"));
    }

    #[test]
    fn test_semantic_score_identical_is_zero() {
        let content = "Section 1 Capital requirements apply to banks.";
        assert!(semantic_change_score(content, content) < 1e-9);
    }

    #[test]
    fn test_semantic_score_disjoint_is_high() {
        let score = semantic_change_score(
            "Section 1 capital liquidity requirements for banks",
            "totally unrelated cooking recipe with garlic and onions",
        );
        assert!(score > 0.5);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_semantic_score_bounded() {
        let score = semantic_change_score("", "some new content entirely");
        assert!((0.0..=1.0).contains(&score));
    }
}
