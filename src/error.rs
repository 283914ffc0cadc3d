//! Error types for the reference engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type for registry and validation operations
pub type Result<T> = std::result::Result<T, RefError>;

/// Reference engine errors
///
/// Per-link and per-document failures are never errors: they end up as data in
/// the [`ValidationReport`](crate::report::ValidationReport). Only usage errors
/// and failed registry writes surface here.
#[derive(Error, Debug)]
pub enum RefError {
    #[error("Repository root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Label already registered: {label} (sequence {sequence_id})")]
    DuplicateLabel { label: String, sequence_id: String },

    #[error("Invalid figure spec: {0}")]
    InvalidSpec(String),

    #[error("Registry opened read-only: {0}")]
    ReadOnly(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
