//! Corpus-wide label and reference checking
//!
//! Labels come from `\label{...}` and `{#...}` anchors; references from
//! `\ref{...}`, `\eqref{...}` and `(#...)` link targets. Every reference must
//! name a label, and no label may be defined twice.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// Where a symbol appears
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: usize,
}

/// A document handed to the symbol check
#[derive(Debug, Clone)]
pub struct Document {
    /// Root-relative path
    pub path: String,
    pub content: String,
}

impl Document {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Labels and references collected across the corpus
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    /// First definition of each label
    pub labels: BTreeMap<String, Location>,
    /// Every use of each referenced name
    pub references: BTreeMap<String, Vec<Location>>,
}

impl SymbolTable {
    pub fn reference_names(&self) -> BTreeSet<&str> {
        self.references.keys().map(String::as_str).collect()
    }
}

/// A reference to a label that was never defined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingReference {
    pub name: String,
    pub location: Location,
}

/// A label defined more than once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateLabel {
    pub name: String,
    pub first: Location,
    pub duplicate: Location,
}

/// Outcome of the symbol check
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolCheck {
    pub table: SymbolTable,
    pub dangling: Vec<DanglingReference>,
    pub duplicates: Vec<DuplicateLabel>,
}

impl SymbolCheck {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.duplicates.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        self.dangling.len() + self.duplicates.len()
    }
}

struct Patterns {
    labels: Vec<Regex>,
    references: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        labels: vec![
            Regex::new(r"\\label\{([^}]+)\}").unwrap(), // LaTeX label
            Regex::new(r"\{#([^}\s]+)[^}]*\}").unwrap(), // anchor, attributes allowed
        ],
        references: vec![
            Regex::new(r"\\(?:eq)?ref\{([^}]+)\}").unwrap(), // \ref / \eqref
            Regex::new(r"\(#([^)\s]+)\)").unwrap(),          // internal link
        ],
    })
}

/// Check a corpus for dangling references and duplicate labels
pub fn check_symbols(documents: &[Document]) -> SymbolCheck {
    check_symbols_with(documents, &BTreeSet::new())
}

/// Like [`check_symbols`], with labels defined outside the corpus
///
/// External labels satisfy references but never collide with corpus labels.
pub fn check_symbols_with(documents: &[Document], external_labels: &BTreeSet<String>) -> SymbolCheck {
    let mut ordered: Vec<&Document> = documents.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let mut check = SymbolCheck::default();
    let patterns = patterns();

    for document in ordered {
        for (idx, line) in document.content.lines().enumerate() {
            let location = || Location {
                file: document.path.clone(),
                line: idx + 1,
            };

            for pattern in &patterns.labels {
                for cap in pattern.captures_iter(line) {
                    let name = cap[1].trim().to_string();
                    match check.table.labels.get(&name) {
                        Some(first) => check.duplicates.push(DuplicateLabel {
                            name,
                            first: first.clone(),
                            duplicate: location(),
                        }),
                        None => {
                            check.table.labels.insert(name, location());
                        }
                    }
                }
            }

            for pattern in &patterns.references {
                for cap in pattern.captures_iter(line) {
                    // \ref{a,b} cites several labels at once
                    for name in cap[1].split(',').map(str::trim).filter(|n| !n.is_empty()) {
                        check
                            .table
                            .references
                            .entry(name.to_string())
                            .or_default()
                            .push(location());
                    }
                }
            }
        }
    }

    for (name, uses) in &check.table.references {
        if check.table.labels.contains_key(name) || external_labels.contains(name) {
            continue;
        }
        for location in uses {
            check.dangling.push(DanglingReference {
                name: name.clone(),
                location: location.clone(),
            });
        }
    }
    check.dangling.sort_by(|a, b| a.location.cmp(&b.location));

    check
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_referenced_twice_is_clean() {
        let doc = Document::new(
            "paper.md",
            "$$ E = mc^2 \\label{eq:x} $$\nSee \\eqref{eq:x}.\nAgain \\eqref{eq:x}.",
        );
        let check = check_symbols(&[doc]);
        assert!(check.is_clean());
        assert_eq!(check.table.references["eq:x"].len(), 2);
    }

    #[test]
    fn test_duplicate_label_reported_once() {
        let doc = Document::new("paper.md", "\\label{eq:x}\ntext\n\\label{eq:x}\n\\eqref{eq:x}");
        let check = check_symbols(&[doc]);
        assert_eq!(check.duplicates.len(), 1);
        assert!(check.dangling.is_empty());

        let dup = &check.duplicates[0];
        assert_eq!(dup.first.line, 1);
        assert_eq!(dup.duplicate.line, 3);
    }

    #[test]
    fn test_duplicate_across_files() {
        let a = Document::new("a.md", "## Intro {#intro}");
        let b = Document::new("b.md", "## Also intro {#intro}");
        let check = check_symbols(&[b, a]);
        assert_eq!(check.duplicates.len(), 1);
        assert_eq!(check.duplicates[0].first.file, "a.md");
        assert_eq!(check.duplicates[0].duplicate.file, "b.md");
    }

    #[test]
    fn test_dangling_reference() {
        let doc = Document::new("a.md", "## Methods {#methods}\nSee [results](#results) and \\ref{sec:none}.");
        let check = check_symbols(&[doc]);
        let names: Vec<_> = check.dangling.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["results", "sec:none"]);
        assert!(check.dangling.iter().all(|d| d.location.line == 2));
    }

    #[test]
    fn test_anchor_link_resolves_to_markdown_anchor() {
        let doc = Document::new("a.md", "# Setup {#setup}\nJump to [setup](#setup).");
        assert!(check_symbols(&[doc]).is_clean());
    }

    #[test]
    fn test_anchor_with_attributes_defines_label() {
        let doc = Document::new(
            "paper.md",
            "![Overview](fig.png){#fig:overview width=80%}\n## Methods {#sec:methods .unnumbered}\nSee \\ref{fig:overview} and \\ref{sec:methods}.",
        );
        let check = check_symbols(&[doc]);
        assert!(check.is_clean());
        assert_eq!(check.table.labels["fig:overview"].line, 1);
        assert_eq!(check.table.labels["sec:methods"].line, 2);
    }

    #[test]
    fn test_external_labels_satisfy_references() {
        let doc = Document::new("a.md", "As shown in Figure \\ref{fig:intro}.");
        let external: BTreeSet<String> = ["fig:intro".to_string()].into_iter().collect();
        assert!(!check_symbols(&[doc.clone()]).is_clean());
        assert!(check_symbols_with(&[doc], &external).is_clean());
    }

    #[test]
    fn test_multi_label_ref() {
        let doc = Document::new("a.tex", "\\label{a}\\label{b}\nsee \\ref{a, b}");
        let check = check_symbols(&[doc]);
        assert!(check.is_clean());
        assert_eq!(check.table.reference_names().len(), 2);
    }
}
