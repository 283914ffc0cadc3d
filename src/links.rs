//! Markdown link extraction

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A `[text](target)` occurrence in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOccurrence {
    /// Root-relative path of the document
    pub source_file: String,
    /// 1-based line number
    pub line: usize,
    pub text: String,
    pub raw_target: String,
    /// `![alt](target)` embed
    #[serde(default)]
    pub is_image: bool,
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)]+)\)").unwrap())
}

fn inline_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`[^`]*`").unwrap())
}

/// True for lines that open or close a fenced code block
pub fn is_fence(line: &str) -> bool {
    line.trim().starts_with("```")
}

/// Extract every link outside fenced code blocks and inline code spans
pub fn extract_links(source_file: &str, content: &str) -> Vec<LinkOccurrence> {
    let mut links = Vec::new();
    let mut in_fence = false;

    for (idx, line) in content.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let visible = inline_code_pattern().replace_all(line, "");
        for cap in link_pattern().captures_iter(&visible) {
            let target = clean_target(&cap[3]);
            if target.is_empty() {
                continue;
            }
            links.push(LinkOccurrence {
                source_file: source_file.to_string(),
                line: idx + 1,
                text: cap[2].to_string(),
                raw_target: target,
                is_image: &cap[1] == "!",
            });
        }
    }

    links
}

/// Strip `<...>` wrapping and a trailing `"title"`
fn clean_target(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(inner) = trimmed.strip_prefix('<') {
        if let Some(end) = inner.find('>') {
            return inner[..end].trim().to_string();
        }
    }
    trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}
