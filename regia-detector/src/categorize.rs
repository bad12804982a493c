use crate::diff::DiffChunk;
use regia_core::{title_case, truncate_string};

/// Category keyword tables, checked in priority order; the first category
/// with a keyword hit in the chunk text wins.
const CATEGORY_TABLE: &[(&str, &[&str])] = &[
    ("capital_requirements", &["capital", "tier 1", "tier 2", "buffer", "leverage ratio", "capital ratio"]),
    ("reporting_requirements", &["report", "reporting", "disclosure", "filing", "submit"]),
    ("risk_management", &["risk", "exposure", "stress test", "risk appetite"]),
    ("compliance_obligations", &["compliance", "comply", "obligation", "requirement"]),
    ("timeline_changes", &["deadline", "effective date", "extension", "timeline", "phase-in", "transition period"]),
    ("enforcement", &["enforcement", "penalty", "fine", "sanction", "violation"]),
    ("liquidity_requirements", &["liquidity", "lcr", "nsfr", "funding ratio"]),
];

pub const GENERAL_CATEGORY: &str = "general_regulatory";

/// Aggregated view of the chunks that fell into one category.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSummary {
    pub title: String,
    pub category: String,
    pub impact_score: f64,
    pub details: Vec<String>,
}

pub fn categorize_chunk(chunk: &DiffChunk) -> String {
    let text = chunk.changed_text().to_lowercase();
    for (category, keywords) in CATEGORY_TABLE {
        if keywords.iter().any(|keyword| text.contains(keyword)) {
            return (*category).to_string();
        }
    }
    GENERAL_CATEGORY.to_string()
}

pub fn category_title(category: &str, change_count: usize) -> String {
    let base = format!("{} Update", title_case(category));
    if change_count > 1 {
        format!("{} ({} changes)", base, change_count)
    } else {
        base
    }
}

/// Groups chunks by category; each summary's impact score is the mean chunk
/// significance.
pub fn analyze_chunks(chunks: &[DiffChunk]) -> Vec<ChangeSummary> {
    let mut grouped: Vec<(String, Vec<&DiffChunk>)> = Vec::new();
    for chunk in chunks {
        let category = categorize_chunk(chunk);
        match grouped.iter_mut().find(|(c, _)| *c == category) {
            Some((_, members)) => members.push(chunk),
            None => grouped.push((category, vec![chunk])),
        }
    }

    grouped
        .into_iter()
        .map(|(category, members)| {
            let impact_score = members
                .iter()
                .map(|chunk| chunk.significance_score)
                .sum::<f64>()
                / members.len() as f64;
            let details = members
                .iter()
                .map(|chunk| truncate_string(&chunk.changed_text().replace('\n', " | "), 240))
                .collect();
            ChangeSummary {
                title: category_title(&category, members.len()),
                category,
                impact_score,
                details,
            }
        })
        .collect()
}
