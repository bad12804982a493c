use regex::Regex;
use scraper::{Html, Selector};

/// Maps the `//article`-style element paths used in source configurations to
/// CSS selectors (`//div//h1` -> `div h1`). Only element paths are supported;
/// anything else falls back to the raw string as a CSS selector.
pub fn selector_from_path(path: &str) -> String {
    if !path.starts_with('/') {
        return path.to_string();
    }
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the concatenated text of the first element matching the given
/// `//tag` path or CSS selector.
pub fn select_text(html: &str, path: &str) -> Option<String> {
    let selector = Selector::parse(&selector_from_path(path)).ok()?;
    let document = Html::parse_document(html);
    document.select(&selector).next().map(|element| {
        element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    })
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
}

/// Strips `<script>`/`<style>` blocks and HTML comments, removes the
/// remaining tags and collapses whitespace.
pub fn strip_html(html: &str) -> String {
    let script = Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let style = Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let comment = Regex::new(r"(?s)<!--.*?-->").unwrap();
    let tag = Regex::new(r"<[^>]*>").unwrap();

    let without_script = script.replace_all(html, " ");
    let without_style = style.replace_all(&without_script, " ");
    let without_comments = comment.replace_all(&without_style, " ");
    let without_tags = tag.replace_all(&without_comments, " ");

    decode_entities(&without_tags)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_html_title(html: &str) -> Option<String> {
    for path in ["title", "//h1"] {
        if let Some(title) = select_text(html, path) {
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}
