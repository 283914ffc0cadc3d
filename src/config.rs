//! Configuration management for the reference engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (refgraph.toml)
//! - Environment variables (REFGRAPH__*)
//!
//! ## Example config file (refgraph.toml):
//! ```toml
//! [registry]
//! store = "figures/registry.json"
//! default_generator = "plots.py"
//!
//! [index]
//! excluded_dirs = [".git", "node_modules", "output"]
//!
//! [validation]
//! document_extensions = ["md"]
//! symbol_extensions = ["md", "tex"]
//! figure_dir = "figures"
//! max_listed = 10
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory names skipped at any depth when indexing a repository
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    "output",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".cache",
    ".tox",
    "target",
    "build",
    "dist",
    ".ipynb_checkpoints",
];

/// Link prefixes that are never resolved against the filesystem
pub const DEFAULT_EXTERNAL_SCHEMES: &[&str] = &["http://", "https://", "mailto:", "ftp://"];

/// Files that stand in for a directory link, in priority order
pub const DEFAULT_INDEX_CANDIDATES: &[&str] = &["AGENTS.md", "README.md", "index.md"];

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RefConfig {
    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Repository index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the JSON store backing the figure registry
    #[serde(default = "default_store_path")]
    pub store: PathBuf,

    /// Attribution recorded when a figure is registered without a generator
    #[serde(default = "default_generator")]
    pub default_generator: String,
}

/// Repository index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory names excluded wherever they appear in a path
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Extensions of documents whose links are checked
    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,

    /// Extensions of documents scanned for labels and references
    #[serde(default = "default_symbol_extensions")]
    pub symbol_extensions: Vec<String>,

    /// Link prefixes treated as external
    #[serde(default = "default_external_schemes")]
    pub external_schemes: Vec<String>,

    /// Candidate index files for directory links
    #[serde(default = "default_index_candidates")]
    pub index_candidates: Vec<String>,

    /// Worker threads for corpus scans (0 = available parallelism)
    #[serde(default)]
    pub workers: usize,

    /// Broken items listed in verbose console output
    #[serde(default = "default_max_listed")]
    pub max_listed: usize,

    /// Root-relative directory where registered figure files live
    #[serde(default)]
    pub figure_dir: Option<PathBuf>,

    /// Attach "did you mean" suggestions to broken links
    #[serde(default = "default_true")]
    pub suggestions: bool,
}

// Default value functions
fn default_store_path() -> PathBuf {
    PathBuf::from("figures/registry.json")
}

fn default_generator() -> String {
    "unknown".to_string()
}

fn default_excluded_dirs() -> Vec<String> {
    DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect()
}

fn default_document_extensions() -> Vec<String> {
    vec!["md".to_string()]
}

fn default_symbol_extensions() -> Vec<String> {
    vec!["md".to_string(), "tex".to_string()]
}

fn default_external_schemes() -> Vec<String> {
    DEFAULT_EXTERNAL_SCHEMES.iter().map(|s| s.to_string()).collect()
}

fn default_index_candidates() -> Vec<String> {
    DEFAULT_INDEX_CANDIDATES.iter().map(|s| s.to_string()).collect()
}

fn default_max_listed() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            store: default_store_path(),
            default_generator: default_generator(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            document_extensions: default_document_extensions(),
            symbol_extensions: default_symbol_extensions(),
            external_schemes: default_external_schemes(),
            index_candidates: default_index_candidates(),
            workers: 0,
            max_listed: default_max_listed(),
            figure_dir: None,
            suggestions: true,
        }
    }
}

impl ValidationConfig {
    /// Worker count for a scan over `jobs` documents
    pub fn effective_workers(&self, jobs: usize) -> usize {
        let configured = if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(8)
        } else {
            self.workers
        };
        configured.clamp(1, jobs.max(1))
    }
}

impl RefConfig {
    /// Load configuration, layering an explicit file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = ["refgraph.toml", ".refgraph.toml", "config/refgraph.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "refgraph") {
            let xdg_config = config_dir.config_dir().join("refgraph.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // REFGRAPH__VALIDATION__WORKERS=4
        builder = builder.add_source(
            Environment::with_prefix("REFGRAPH")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Registry store path, resolved against `root` when relative
    pub fn store_path(&self, root: &Path) -> PathBuf {
        if self.registry.store.is_absolute() {
            self.registry.store.clone()
        } else {
            root.join(&self.registry.store)
        }
    }
}
