//! Repository Index
//!
//! One recursive walk of a root directory, recording every file and directory
//! as a `/`-separated root-relative path. A path is excluded when any of its
//! components is on the deny-list, so `output/` is skipped but `output.md` is
//! kept.

use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DEFAULT_EXCLUDED_DIRS;
use crate::error::{RefError, Result};

/// Files and directories under a repository root
#[derive(Debug, Clone)]
pub struct RepositoryIndex {
    root: PathBuf,
    files: BTreeSet<String>,
    directories: BTreeSet<String>,
}

impl RepositoryIndex {
    /// Index `root` with the default deny-list
    pub fn build(root: impl AsRef<Path>) -> Result<Self> {
        let excluded: Vec<String> = DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect();
        Self::build_with(root, &excluded)
    }

    /// Index `root`, skipping any path with a component in `excluded`
    pub fn build_with(root: impl AsRef<Path>, excluded: &[String]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(RefError::RootNotFound(root.to_path_buf()));
        }
        let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();

        let mut files = BTreeSet::new();
        let mut directories = BTreeSet::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            // Pruning a directory drops every path beneath it.
            .filter_entry(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| !(entry.file_type().is_dir() && excluded.contains(name)))
                    .unwrap_or(true)
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry while indexing");
                    continue;
                }
            };

            let relative = match entry.path().strip_prefix(root) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let key = to_key(relative);

            if entry.file_type().is_dir() {
                directories.insert(key);
            } else {
                files.insert(key);
            }
        }

        debug!(
            root = %root.display(),
            files = files.len(),
            directories = directories.len(),
            "indexed repository"
        );

        Ok(Self {
            root: root.to_path_buf(),
            files,
            directories,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    pub fn directories(&self) -> &BTreeSet<String> {
        &self.directories
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains(path)
    }

    /// The empty path names the root itself
    pub fn contains_dir(&self, path: &str) -> bool {
        path.is_empty() || self.directories.contains(path)
    }

    /// Indexed files whose extension is in `extensions`, in path order
    pub fn documents(&self, extensions: &[String]) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| {
                Path::new(f.as_str())
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

fn to_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
