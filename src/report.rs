//! Validation reports
//!
//! [`generate_report`] folds per-file link results, read warnings, the symbol
//! check and the artifact cross-check into one immutable [`ValidationReport`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fingerprint::Fingerprint;
use crate::resolve::ResolvedLink;
use crate::symbols::SymbolCheck;

/// Resolved links of one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    pub file: String,
    pub links: Vec<ResolvedLink>,
}

/// Valid and broken links of one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileLinks {
    pub valid: Vec<ResolvedLink>,
    pub broken: Vec<ResolvedLink>,
}

/// A document that could not be scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    pub file: String,
    pub message: String,
}

/// A registered figure whose file is not in the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingArtifact {
    pub label: String,
    pub filename: String,
}

/// Registry cross-check outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub registered: usize,
    pub missing: Vec<MissingArtifact>,
}

/// Everything [`generate_report`] aggregates
#[derive(Debug, Default)]
pub struct ReportInputs {
    pub root: String,
    pub files: Vec<FileResult>,
    pub warnings: Vec<ScanWarning>,
    pub symbols: Option<SymbolCheck>,
    pub artifacts: Option<ArtifactCheck>,
    pub fingerprint: Option<Fingerprint>,
}

/// Outcome of a corpus scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub root: String,
    pub generated_at: DateTime<Utc>,
    pub files_scanned: usize,
    pub valid_links: usize,
    pub broken_links: usize,
    pub files: BTreeMap<String, FileLinks>,
    #[serde(default)]
    pub warnings: Vec<ScanWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<SymbolCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
}

/// Aggregate scan results into a report
pub fn generate_report(inputs: ReportInputs) -> ValidationReport {
    let mut files: BTreeMap<String, FileLinks> = BTreeMap::new();

    for result in inputs.files {
        let entry = files.entry(result.file).or_default();
        for link in result.links {
            if link.is_valid() {
                entry.valid.push(link);
            } else {
                entry.broken.push(link);
            }
        }
    }
    for entry in files.values_mut() {
        entry.valid.sort_by_key(|l| l.occurrence.line);
        entry.broken.sort_by_key(|l| l.occurrence.line);
    }

    let valid_links = files.values().map(|f| f.valid.len()).sum();
    let broken_links = files.values().map(|f| f.broken.len()).sum();

    let mut warnings = inputs.warnings;
    warnings.sort_by(|a, b| a.file.cmp(&b.file));

    ValidationReport {
        root: inputs.root,
        generated_at: Utc::now(),
        files_scanned: files.len(),
        valid_links,
        broken_links,
        files,
        warnings,
        symbols: inputs.symbols,
        artifacts: inputs.artifacts,
        fingerprint: inputs.fingerprint,
    }
}

impl ValidationReport {
    /// Broken links across all files, in file then line order
    pub fn broken(&self) -> impl Iterator<Item = &ResolvedLink> {
        self.files.values().flat_map(|f| f.broken.iter())
    }

    /// Broken links plus symbol and artifact violations
    ///
    /// Read warnings are not issues.
    pub fn issue_count(&self) -> usize {
        self.broken_links
            + self.symbols.as_ref().map(|s| s.violation_count()).unwrap_or(0)
            + self.artifacts.as_ref().map(|a| a.missing.len()).unwrap_or(0)
    }

    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }

    /// 0 when clean, 1 when issues were found
    pub fn exit_code(&self) -> i32 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    /// Render as a markdown document
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Reference Validation Report\n\n");
        out.push_str(&format!("- **Root**: `{}`\n", self.root));
        out.push_str(&format!("- **Generated**: {}\n", self.generated_at.to_rfc3339()));
        out.push_str(&format!("- **Files scanned**: {}\n", self.files_scanned));
        out.push_str(&format!("- **Valid links**: {}\n", self.valid_links));
        out.push_str(&format!("- **Broken links**: {}\n", self.broken_links));
        if let Some(fingerprint) = &self.fingerprint {
            out.push_str(&format!("- **Corpus fingerprint**: `{}`\n", fingerprint));
        }
        out.push_str(&format!(
            "- **Status**: {}\n",
            if self.is_clean() { "PASS" } else { "FAIL" }
        ));

        if self.broken_links > 0 {
            out.push_str("\n## Broken Links\n\n");
            out.push_str("| File | Line | Text | Target |\n");
            out.push_str("|------|------|------|--------|\n");
            for link in self.broken() {
                let target = match &link.suggestion {
                    Some(s) => format!("`{}` (did you mean `{}`?)", cell(&link.occurrence.raw_target), cell(s)),
                    None => format!("`{}`", cell(&link.occurrence.raw_target)),
                };
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    cell(&link.occurrence.source_file),
                    link.occurrence.line,
                    cell(&link.occurrence.text),
                    target
                ));
            }
        }

        if let Some(symbols) = &self.symbols {
            out.push_str("\n## Labels and References\n\n");
            out.push_str(&format!(
                "{} labels, {} referenced names, {} dangling, {} duplicate\n\n",
                symbols.table.labels.len(),
                symbols.table.references.len(),
                symbols.dangling.len(),
                symbols.duplicates.len()
            ));
            for d in &symbols.dangling {
                out.push_str(&format!(
                    "- dangling `{}` at {}:{}\n",
                    cell(&d.name),
                    d.location.file,
                    d.location.line
                ));
            }
            for d in &symbols.duplicates {
                out.push_str(&format!(
                    "- duplicate `{}` at {}:{} (first defined at {}:{})\n",
                    cell(&d.name),
                    d.duplicate.file,
                    d.duplicate.line,
                    d.first.file,
                    d.first.line
                ));
            }
        }

        if let Some(artifacts) = &self.artifacts {
            out.push_str("\n## Registered Figures\n\n");
            out.push_str(&format!(
                "{} registered, {} missing\n\n",
                artifacts.registered,
                artifacts.missing.len()
            ));
            for m in &artifacts.missing {
                out.push_str(&format!("- `{}` → `{}` not found\n", m.label, m.filename));
            }
        }

        if !self.warnings.is_empty() {
            out.push_str("\n## Skipped Files\n\n");
            for w in &self.warnings {
                out.push_str(&format!("- `{}`: {}\n", w.file, w.message));
            }
        }

        out.push_str("\n## Per-File Summary\n\n");
        out.push_str("| File | Valid | Broken |\n");
        out.push_str("|------|-------|--------|\n");
        for (file, links) in &self.files {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                cell(file),
                links.valid.len(),
                links.broken.len()
            ));
        }

        out
    }
}

/// Escape a value for a markdown table cell
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}
