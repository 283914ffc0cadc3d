//! Corpus Validation
//!
//! Entry point that ties the index, link resolution, the symbol check and the
//! registry cross-check together. Documents are read and resolved on a bounded
//! pool of scoped threads sharing the read-only index; results are merged in
//! path order, so the report does not depend on the worker count.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::{RefConfig, ValidationConfig, DEFAULT_EXCLUDED_DIRS};
use crate::error::Result;
use crate::fingerprint::Fingerprint;
use crate::index::RepositoryIndex;
use crate::links::extract_links;
use crate::registry::ArtifactRegistry;
use crate::report::{
    generate_report, ArtifactCheck, FileResult, MissingArtifact, ReportInputs, ScanWarning,
    ValidationReport,
};
use crate::resolve::{ResolvedLink, Resolver};
use crate::symbols::{check_symbols_with, Document};

/// Scans a document tree and produces a [`ValidationReport`]
pub struct ReferenceValidator<'r> {
    config: ValidationConfig,
    excluded_dirs: Vec<String>,
    check_symbols: bool,
    registry: Option<&'r ArtifactRegistry>,
}

impl Default for ReferenceValidator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// One document after a worker is done with it
struct Scanned {
    path: String,
    outcome: std::result::Result<ScannedDocument, String>,
}

struct ScannedDocument {
    content: String,
    /// `None` for documents only scanned for symbols
    links: Option<Vec<ResolvedLink>>,
}

impl<'r> ReferenceValidator<'r> {
    pub fn new() -> Self {
        Self {
            config: ValidationConfig::default(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            check_symbols: false,
            registry: None,
        }
    }

    pub fn from_config(config: &RefConfig) -> Self {
        Self {
            config: config.validation.clone(),
            excluded_dirs: config.index.excluded_dirs.clone(),
            check_symbols: false,
            registry: None,
        }
    }

    /// Also run the corpus-wide label/reference check
    pub fn with_symbols(mut self, enabled: bool) -> Self {
        self.check_symbols = enabled;
        self
    }

    /// Cross-check registered figures and accept their labels as defined
    pub fn with_registry(mut self, registry: &'r ArtifactRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Index `root` and scan it
    pub fn scan(&self, root: impl AsRef<Path>) -> Result<ValidationReport> {
        let index = RepositoryIndex::build_with(root, &self.excluded_dirs)?;
        Ok(self.scan_index(&index))
    }

    /// Scan the documents of an already built index
    pub fn scan_index(&self, index: &RepositoryIndex) -> ValidationReport {
        let resolver = Resolver::new(index)
            .with_external_schemes(self.config.external_schemes.clone())
            .with_index_candidates(self.config.index_candidates.clone())
            .with_suggestions(self.config.suggestions);

        let link_docs: BTreeSet<String> = index
            .documents(&self.config.document_extensions)
            .into_iter()
            .collect();
        let mut targets = link_docs.clone();
        if self.check_symbols {
            targets.extend(index.documents(&self.config.symbol_extensions));
        }
        let targets: Vec<String> = targets.into_iter().collect();

        let workers = self.config.effective_workers(targets.len());
        debug!(documents = targets.len(), workers, "scanning corpus");

        let mut scanned = scan_parallel(&targets, workers, |path| {
            scan_document(&resolver, path, link_docs.contains(path))
        });
        scanned.sort_by(|a, b| a.path.cmp(&b.path));

        let mut files = Vec::new();
        let mut warnings = Vec::new();
        let mut documents = Vec::new();

        for item in scanned {
            match item.outcome {
                Ok(doc) => {
                    if let Some(links) = doc.links {
                        files.push(FileResult {
                            file: item.path.clone(),
                            links,
                        });
                    }
                    documents.push(Document::new(item.path, doc.content));
                }
                Err(message) => {
                    warn!(file = %item.path, %message, "skipping unreadable document");
                    warnings.push(ScanWarning {
                        file: item.path,
                        message,
                    });
                }
            }
        }

        let fingerprint = Fingerprint::of_documents(
            documents
                .iter()
                .map(|d| (d.path.as_str(), d.content.as_str())),
        );

        let symbols = if self.check_symbols {
            let external = self.registry.map(|r| r.labels()).unwrap_or_default();
            let symbol_docs: Vec<Document> = documents
                .into_iter()
                .filter(|d| has_extension(&d.path, &self.config.symbol_extensions))
                .collect();
            Some(check_symbols_with(&symbol_docs, &external))
        } else {
            None
        };

        let artifacts = self
            .registry
            .map(|registry| self.check_artifacts(registry, index));

        let report = generate_report(ReportInputs {
            root: index.root().display().to_string(),
            files,
            warnings,
            symbols,
            artifacts,
            fingerprint: Some(fingerprint),
        });

        info!(
            files = report.files_scanned,
            valid = report.valid_links,
            broken = report.broken_links,
            issues = report.issue_count(),
            "scan complete"
        );
        report
    }

    /// Every registered figure must exist somewhere in the index
    fn check_artifacts(&self, registry: &ArtifactRegistry, index: &RepositoryIndex) -> ArtifactCheck {
        let records = registry.list_by_sequence();
        let figure_dir = self
            .config
            .figure_dir
            .as_ref()
            .map(|d| d.to_string_lossy().trim_end_matches('/').to_string());

        let missing = records
            .iter()
            .filter(|record| !artifact_present(index, figure_dir.as_deref(), &record.filename))
            .map(|record| MissingArtifact {
                label: record.label.clone(),
                filename: record.filename.clone(),
            })
            .collect();

        ArtifactCheck {
            registered: records.len(),
            missing,
        }
    }
}

fn artifact_present(index: &RepositoryIndex, figure_dir: Option<&str>, filename: &str) -> bool {
    let filename = filename.trim_start_matches("./");
    if index.contains_file(filename) {
        return true;
    }
    if let Some(dir) = figure_dir.filter(|d| !d.is_empty()) {
        if index.contains_file(&format!("{}/{}", dir, filename)) {
            return true;
        }
    }
    // Bare names match a file of that name anywhere in the tree.
    !filename.contains('/')
        && index
            .files()
            .iter()
            .any(|f| f.rsplit('/').next() == Some(filename))
}

fn has_extension(path: &str, extensions: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Read one document and resolve its links
fn scan_document(resolver: &Resolver<'_>, path: &str, check_links: bool) -> Scanned {
    let full = resolver.index().root().join(path);
    let outcome = fs::read(&full)
        .map_err(|e| e.to_string())
        .and_then(|bytes| String::from_utf8(bytes).map_err(|_| "invalid UTF-8".to_string()))
        .map(|content| {
            let links = check_links.then(|| {
                extract_links(path, &content)
                    .into_iter()
                    .map(|occurrence| resolver.resolve_link(occurrence))
                    .collect()
            });
            ScannedDocument { content, links }
        });

    Scanned {
        path: path.to_string(),
        outcome,
    }
}

/// Run `job` over `items` on at most `workers` scoped threads
fn scan_parallel<F>(items: &[String], workers: usize, job: F) -> Vec<Scanned>
where
    F: Fn(&str) -> Scanned + Sync,
{
    if workers <= 1 || items.len() <= 1 {
        return items.iter().map(|item| job(item.as_str())).collect();
    }

    let per_worker = items.len().div_ceil(workers);
    let job = &job;
    let mut results = Vec::with_capacity(items.len());

    std::thread::scope(|s| {
        let tasks: Vec<_> = items
            .chunks(per_worker)
            .map(|chunk| s.spawn(move || chunk.iter().map(|item| job(item.as_str())).collect::<Vec<_>>()))
            .collect();

        for task in tasks {
            match task.join() {
                Ok(chunk) => results.extend(chunk),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::FigureSpec;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_parallel_preserves_items() {
        let items: Vec<String> = (0..25).map(|i| format!("{:02}.md", i)).collect();
        let results = scan_parallel(&items, 4, |path| Scanned {
            path: path.to_string(),
            outcome: Err(String::new()),
        });
        let mut paths: Vec<_> = results.into_iter().map(|s| s.path).collect();
        paths.sort();
        assert_eq!(paths, items);
    }

    #[test]
    fn test_worker_count_does_not_change_report() {
        let dir = tempdir().unwrap();
        for i in 0..12 {
            write(
                dir.path(),
                &format!("doc{}.md", i),
                &format!("[next](doc{}.md)\n[gone](gone{}.md)", i + 1, i),
            );
        }

        let serial = ReferenceValidator::new().with_workers(1).scan(dir.path()).unwrap();
        let parallel = ReferenceValidator::new().with_workers(4).scan(dir.path()).unwrap();

        assert_eq!(serial.valid_links, parallel.valid_links);
        assert_eq!(serial.broken_links, parallel.broken_links);
        assert_eq!(serial.fingerprint, parallel.fingerprint);
        let a: Vec<_> = serial.broken().map(|l| l.occurrence.raw_target.clone()).collect();
        let b: Vec<_> = parallel.broken().map(|l| l.occurrence.raw_target.clone()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_utf8_becomes_warning() {
        let dir = tempdir().unwrap();
        write(dir.path(), "ok.md", "[self](#top)");
        fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();

        let report = ReferenceValidator::new().scan(dir.path()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].file, "bad.md");
        assert_eq!(report.files_scanned, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_artifact_cross_check() {
        let dir = tempdir().unwrap();
        write(dir.path(), "paper.md", "See Figure \\ref{fig:present} and \\ref{fig:absent}.");
        write(dir.path(), "figures/present.png", "png");

        let registry = ArtifactRegistry::open(dir.path().join("registry.json")).unwrap();
        registry.register(FigureSpec::new("present.png", "Here")).unwrap();
        registry.register(FigureSpec::new("absent.png", "Gone")).unwrap();

        let report = ReferenceValidator::new()
            .with_symbols(true)
            .with_registry(&registry)
            .scan(dir.path())
            .unwrap();

        let artifacts = report.artifacts.as_ref().unwrap();
        assert_eq!(artifacts.registered, 2);
        assert_eq!(artifacts.missing.len(), 1);
        assert_eq!(artifacts.missing[0].label, "fig:absent");
        // Registered labels count as defined
        assert!(report.symbols.as_ref().unwrap().is_clean());
        assert_eq!(report.issue_count(), 1);
    }

    #[test]
    fn test_tex_scanned_only_for_symbols() {
        let dir = tempdir().unwrap();
        write(dir.path(), "paper.tex", "\\label{sec:a} [not a link](x.md) \\ref{sec:a}");
        write(dir.path(), "notes.md", "\\ref{sec:a}");

        let report = ReferenceValidator::new().with_symbols(true).scan(dir.path()).unwrap();
        assert_eq!(report.files_scanned, 1);
        assert_eq!(report.broken_links, 0);
        assert!(report.symbols.unwrap().is_clean());
    }
}
