//! Link Resolution
//!
//! Classifies a raw link target against the [`RepositoryIndex`]. Resolution is
//! a pure function of `(target, source_file)` and the index; it never touches
//! the filesystem.
//!
//! ## Strategy
//! 1. External scheme → `External`
//! 2. Split off `#fragment`
//! 3. Empty file part → `AnchorSelf`
//! 4. `./` or `../` → relative to the source directory, must not escape root
//! 5. Trailing `/` → directory index file, else the directory itself
//! 6. Bare path → source directory first, then root
//! 7. A fragment on a resolved file → `InternalFileAnchor` (fragment unchecked)

use serde::{Deserialize, Serialize};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::config::{DEFAULT_EXTERNAL_SCHEMES, DEFAULT_INDEX_CANDIDATES};
use crate::index::RepositoryIndex;
use crate::links::LinkOccurrence;

/// Classification of a resolved link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    External,
    AnchorSelf,
    InternalFile,
    InternalFileAnchor,
    DirectoryIndex,
    Directory,
    Broken,
}

impl LinkKind {
    pub fn is_valid(&self) -> bool {
        !matches!(self, LinkKind::Broken)
    }
}

/// Outcome of resolving one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub kind: LinkKind,
    /// Root-relative path the link points at (empty for the root directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Resolution {
    fn external() -> Self {
        Self {
            kind: LinkKind::External,
            path: None,
        }
    }

    fn broken() -> Self {
        Self {
            kind: LinkKind::Broken,
            path: None,
        }
    }

    fn to(kind: LinkKind, path: String) -> Self {
        Self {
            kind,
            path: Some(path),
        }
    }
}

/// A link occurrence together with its resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedLink {
    #[serde(flatten)]
    pub occurrence: LinkOccurrence,
    pub kind: LinkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    /// Closest indexed file, for broken links
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ResolvedLink {
    pub fn is_valid(&self) -> bool {
        self.kind.is_valid()
    }
}

/// Resolves link targets against an index
pub struct Resolver<'a> {
    index: &'a RepositoryIndex,
    external_schemes: Vec<String>,
    index_candidates: Vec<String>,
    suggestions: bool,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a RepositoryIndex) -> Self {
        Self {
            index,
            external_schemes: DEFAULT_EXTERNAL_SCHEMES.iter().map(|s| s.to_string()).collect(),
            index_candidates: DEFAULT_INDEX_CANDIDATES.iter().map(|s| s.to_string()).collect(),
            suggestions: true,
        }
    }

    pub fn with_external_schemes(mut self, schemes: Vec<String>) -> Self {
        self.external_schemes = schemes;
        self
    }

    pub fn with_index_candidates(mut self, candidates: Vec<String>) -> Self {
        self.index_candidates = candidates;
        self
    }

    pub fn with_suggestions(mut self, enabled: bool) -> Self {
        self.suggestions = enabled;
        self
    }

    pub fn index(&self) -> &RepositoryIndex {
        self.index
    }

    /// Resolve `target` as written in the root-relative `source_file`
    pub fn resolve(&self, target: &str, source_file: &str) -> Resolution {
        let target = target.trim();
        if self.is_external(target) {
            return Resolution::external();
        }

        let (file_part, has_fragment) = match target.split_once('#') {
            Some((file, _fragment)) => (file, true),
            None => (target, false),
        };

        if file_part.is_empty() {
            return Resolution::to(LinkKind::AnchorSelf, source_file.to_string());
        }

        let source_dir = parent_dir(source_file);
        let resolution = if file_part.starts_with("./") || file_part.starts_with("../") {
            match normalize(&join(source_dir, file_part)) {
                Some(path) if self.index.contains_file(&path) => {
                    Resolution::to(LinkKind::InternalFile, path)
                }
                _ => Resolution::broken(),
            }
        } else if file_part.ends_with('/') {
            self.resolve_directory(file_part, source_dir)
        } else {
            self.resolve_bare(file_part, source_dir)
        };

        if has_fragment
            && matches!(
                resolution.kind,
                LinkKind::InternalFile | LinkKind::DirectoryIndex
            )
        {
            return Resolution {
                kind: LinkKind::InternalFileAnchor,
                path: resolution.path,
            };
        }
        resolution
    }

    /// Resolve an extracted occurrence, attaching a suggestion when broken
    pub fn resolve_link(&self, occurrence: LinkOccurrence) -> ResolvedLink {
        let resolution = self.resolve(&occurrence.raw_target, &occurrence.source_file);
        let suggestion = if resolution.kind == LinkKind::Broken && self.suggestions {
            self.suggest(&occurrence.raw_target)
        } else {
            None
        };
        ResolvedLink {
            occurrence,
            kind: resolution.kind,
            resolved_path: resolution.path,
            suggestion,
        }
    }

    fn is_external(&self, target: &str) -> bool {
        let lower = target.to_ascii_lowercase();
        self.external_schemes
            .iter()
            .any(|scheme| lower.starts_with(&scheme.to_ascii_lowercase()))
    }

    fn resolve_directory(&self, file_part: &str, source_dir: &str) -> Resolution {
        let dir_part = file_part.trim_end_matches('/');
        let bases = [
            normalize(dir_part.trim_start_matches('/')),
            normalize(&join(source_dir, dir_part)),
        ];

        for base in bases.iter().flatten() {
            for candidate in &self.index_candidates {
                let path = join(base, candidate);
                if self.index.contains_file(&path) {
                    return Resolution::to(LinkKind::DirectoryIndex, path);
                }
            }
        }
        for base in bases.iter().flatten() {
            if self.index.contains_dir(base) {
                return Resolution::to(LinkKind::Directory, base.clone());
            }
        }
        Resolution::broken()
    }

    fn resolve_bare(&self, file_part: &str, source_dir: &str) -> Resolution {
        let candidates = match file_part.strip_prefix('/') {
            Some(rooted) => vec![normalize(rooted)],
            None => vec![
                normalize(&join(source_dir, file_part)),
                normalize(file_part),
            ],
        };

        candidates
            .into_iter()
            .flatten()
            .find(|path| self.index.contains_file(path))
            .map(|path| Resolution::to(LinkKind::InternalFile, path))
            .unwrap_or_else(Resolution::broken)
    }

    /// Closest indexed file by name, for "did you mean" hints
    fn suggest(&self, target: &str) -> Option<String> {
        let file_part = target.split('#').next().unwrap_or_default();
        let query = file_part.rsplit('/').find(|s| !s.is_empty())?;
        let matcher = SkimMatcherV2::default();

        self.index
            .files()
            .iter()
            .filter_map(|file| {
                let name = file.rsplit('/').next().unwrap_or(file);
                matcher.fuzzy_match(name, query).map(|score| (score, file))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(a.1)))
            .map(|(_, file)| file.clone())
    }
}

/// Directory part of a root-relative file path ("" at the root)
fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn join(base: &str, rel: &str) -> String {
    if base.is_empty() {
        rel.to_string()
    } else {
        format!("{}/{}", base, rel)
    }
}

/// Collapse `.` and `..` components
///
/// Returns `None` when the path climbs above the root.
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn repo(files: &[&str]) -> (TempDir, RepositoryIndex) {
        let dir = tempdir().unwrap();
        for rel in files {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
        let index = RepositoryIndex::build(dir.path()).unwrap();
        (dir, index)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("a/./b/../c.md").as_deref(), Some("a/c.md"));
        assert_eq!(normalize("a/../../x.md"), None);
        assert_eq!(normalize("./x.md").as_deref(), Some("x.md"));
    }

    #[test]
    fn test_external_schemes() {
        let (_dir, index) = repo(&[]);
        let resolver = Resolver::new(&index);
        for target in ["http://x", "https://x", "mailto:x", "ftp://x", "HTTPS://X"] {
            assert_eq!(resolver.resolve(target, "a.md").kind, LinkKind::External);
        }
    }

    #[test]
    fn test_anchor_self() {
        let (_dir, index) = repo(&["docs/a.md"]);
        let resolution = Resolver::new(&index).resolve("#intro", "docs/a.md");
        assert_eq!(resolution.kind, LinkKind::AnchorSelf);
        assert_eq!(resolution.path.as_deref(), Some("docs/a.md"));
    }

    #[test]
    fn test_relative_parent() {
        let (_dir, index) = repo(&["README.md", "docs/a.md"]);
        let resolution = Resolver::new(&index).resolve("../README.md", "docs/a.md");
        assert_eq!(resolution.kind, LinkKind::InternalFile);
        assert_eq!(resolution.path.as_deref(), Some("README.md"));
    }

    #[test]
    fn test_escape_root_is_broken() {
        let (_dir, index) = repo(&["docs/a.md"]);
        let resolution = Resolver::new(&index).resolve("../../outside.md", "docs/a.md");
        assert_eq!(resolution, Resolution::broken());
    }

    #[test]
    fn test_relative_requires_source_dir() {
        // "./" never falls back to the root
        let (_dir, index) = repo(&["b.md", "docs/a.md"]);
        let resolution = Resolver::new(&index).resolve("./b.md", "docs/a.md");
        assert_eq!(resolution.kind, LinkKind::Broken);
    }

    #[test]
    fn test_bare_prefers_source_dir_then_root() {
        let (_dir, index) = repo(&["notes.md", "docs/notes.md", "docs/a.md", "top.md"]);
        let resolver = Resolver::new(&index);
        assert_eq!(
            resolver.resolve("notes.md", "docs/a.md").path.as_deref(),
            Some("docs/notes.md")
        );
        assert_eq!(
            resolver.resolve("top.md", "docs/a.md").path.as_deref(),
            Some("top.md")
        );
        assert_eq!(
            resolver.resolve("/notes.md", "docs/a.md").path.as_deref(),
            Some("notes.md")
        );
    }

    #[test]
    fn test_directory_index_priority() {
        let (_dir, index) = repo(&["guide/README.md", "guide/AGENTS.md", "a.md"]);
        let resolution = Resolver::new(&index).resolve("guide/", "a.md");
        assert_eq!(resolution.kind, LinkKind::DirectoryIndex);
        assert_eq!(resolution.path.as_deref(), Some("guide/AGENTS.md"));
    }

    #[test]
    fn test_directory_without_index() {
        let (_dir, index) = repo(&["data/table.csv", "a.md"]);
        let resolver = Resolver::new(&index);
        let resolution = resolver.resolve("data/", "a.md");
        assert_eq!(resolution.kind, LinkKind::Directory);
        assert_eq!(resolution.path.as_deref(), Some("data"));
        assert_eq!(resolver.resolve("nowhere/", "a.md").kind, LinkKind::Broken);
    }

    #[test]
    fn test_directory_under_source_dir() {
        let (_dir, index) = repo(&["docs/api/index.md", "docs/a.md"]);
        let resolution = Resolver::new(&index).resolve("api/", "docs/a.md");
        assert_eq!(resolution.kind, LinkKind::DirectoryIndex);
        assert_eq!(resolution.path.as_deref(), Some("docs/api/index.md"));
    }

    #[test]
    fn test_fragment_on_file() {
        let (_dir, index) = repo(&["a.md", "b.md", "guide/README.md"]);
        let resolver = Resolver::new(&index);
        let resolution = resolver.resolve("b.md#does-not-matter", "a.md");
        assert_eq!(resolution.kind, LinkKind::InternalFileAnchor);
        assert_eq!(resolution.path.as_deref(), Some("b.md"));
        assert_eq!(
            resolver.resolve("guide/#setup", "a.md").kind,
            LinkKind::InternalFileAnchor
        );
        assert_eq!(resolver.resolve("c.md#x", "a.md").kind, LinkKind::Broken);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (_dir, index) = repo(&["a.md", "docs/b.md"]);
        let resolver = Resolver::new(&index);
        for target in ["docs/b.md", "../x.md", "#top", "docs/", "missing.md"] {
            assert_eq!(resolver.resolve(target, "a.md"), resolver.resolve(target, "a.md"));
        }
    }

    #[test]
    fn test_suggestion_for_broken_link() {
        let (_dir, index) = repo(&["docs/installation.md", "a.md"]);
        let link = LinkOccurrence {
            source_file: "a.md".to_string(),
            line: 1,
            text: "install".to_string(),
            raw_target: "docs/instalation.md".to_string(),
            is_image: false,
        };
        let resolved = Resolver::new(&index).resolve_link(link);
        assert!(!resolved.is_valid());
        assert_eq!(resolved.suggestion.as_deref(), Some("docs/installation.md"));
    }
}
