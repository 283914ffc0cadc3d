//! refgraph
//!
//! A cross-document reference integrity engine for manuscripts written as
//! trees of markdown/LaTeX-flavored documents with generated figures.
//!
//! ## Features
//!
//! - **Figure Registry**: Durable label → figure metadata store that survives
//!   crashes and recovers from corrupt files
//! - **Repository Index**: One walk of the tree, excluding VCS/build/cache dirs
//! - **Link Resolution**: Multi-strategy resolution of markdown link targets
//! - **Symbol Check**: Corpus-wide `\label`/`\ref`/`{#anchor}` integrity
//! - **Reports**: Markdown and JSON reports with CI-friendly exit codes
//!
//! ## Architecture
//!
//! ```text
//! ArtifactRegistry ──────────────┐
//!                                ▼
//! RepositoryIndex ──▶ ReferenceValidator ──▶ ValidationReport
//!                      ├── links::extract_links
//!                      ├── resolve::Resolver
//!                      └── symbols::check_symbols
//! ```

pub mod artifact;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod links;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod symbols;
pub mod validator;

pub use artifact::{ArtifactRecord, FigureSpec};
pub use config::RefConfig;
pub use error::{RefError, Result};
pub use fingerprint::Fingerprint;
pub use index::RepositoryIndex;
pub use links::{extract_links, LinkOccurrence};
pub use registry::ArtifactRegistry;
pub use report::{generate_report, ValidationReport};
pub use resolve::{LinkKind, Resolution, ResolvedLink, Resolver};
pub use symbols::{check_symbols, check_symbols_with, Document, SymbolCheck, SymbolTable};
pub use validator::ReferenceValidator;
