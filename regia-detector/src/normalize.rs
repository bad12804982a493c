use regex::Regex;
use tracing::warn;

/// Applies the configured ignored patterns and canonicalizes whitespace so
/// cosmetic churn (timestamps, page numbers, boilerplate) never reaches the
/// diff phases.
pub struct Normalizer {
    patterns: Vec<Regex>,
}

impl Normalizer {
    /// Patterns that fail to compile are logged and skipped, never fatal.
    pub fn new(ignored_patterns: &[String]) -> Self {
        let mut patterns = Vec::new();
        for pattern in ignored_patterns {
            match Regex::new(pattern) {
                Ok(regex) => patterns.push(regex),
                Err(e) => warn!(pattern = pattern.as_str(), error = %e, "ignored pattern failed to compile"),
            }
        }
        Self { patterns }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Strips ignored patterns, trims every line, collapses runs of
    /// horizontal whitespace and drops blank lines.
    pub fn normalize(&self, content: &str) -> String {
        let mut stripped = content.to_string();
        for pattern in &self.patterns {
            stripped = pattern.replace_all(&stripped, " ").into_owned();
        }

        stripped
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regia_core::DetectorSettings;

    fn default_normalizer() -> Normalizer {
        Normalizer::new(&DetectorSettings::default().ignored_patterns)
    }

    #[test]
    fn test_whitespace_collapse() {
        let normalizer = Normalizer::new(&[]);
        assert_eq!(normalizer.normalize("A   \n  B\nC   "), "A\nB\nC");
        assert_eq!(normalizer.normalize("A\n\n\nB"), "A\nB");
        assert_eq!(normalizer.normalize("  a \t b  "), "a b");
    }

    #[test]
    fn test_timestamp_stripped() {
        let normalizer = default_normalizer();
        let normalized = normalizer.normalize("Updated 2024-01-02T10:11:12Z body text");
        assert!(!normalized.contains("2024-01-02T10:11:12Z"));
        assert!(normalized.contains("body text"));
    }

    #[test]
    fn test_page_numbers_and_copyright_stripped() {
        let normalizer = default_normalizer();
        let normalized =
            normalizer.normalize("Rule text\nPage 3 of 17\nCopyright 2024 Some Agency\nMore text");
        assert!(!normalized.to_lowercase().contains("page 3 of 17"));
        assert!(!normalized.to_lowercase().contains("copyright"));
        assert!(normalized.contains("Rule text"));
        assert!(normalized.contains("More text"));
    }

    #[test]
    fn test_script_blocks_stripped() {
        let normalizer = default_normalizer();
        let normalized =
            normalizer.normalize("before <script>var x = 1;</script> after <!-- note -->");
        assert!(!normalized.contains("var x"));
        assert!(!normalized.contains("note"));
        assert!(normalized.contains("before"));
        assert!(normalized.contains("after"));
    }

    #[test]
    fn test_bad_pattern_skipped() {
        let normalizer = Normalizer::new(&["[unclosed".to_string(), r"\d+".to_string()]);
        assert_eq!(normalizer.pattern_count(), 1);
        assert_eq!(normalizer.normalize("abc 123 def"), "abc def");
    }

    #[test]
    fn test_normalization_idempotent() {
        let normalizer = default_normalizer();
        let once = normalizer.normalize("A  \n\n B \n");
        let twice = normalizer.normalize(&once);
        assert_eq!(once, twice);
    }
}
