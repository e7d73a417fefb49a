//! Incremental, watch-driven code symbol index.
//!
//! Projects are watched recursively; filesystem events are debounced per
//! path, changed files are re-extracted into [`index::FileRecord`]s, and
//! [`service::CodeIntelligence`] answers search and completion queries
//! against the in-memory index while it updates.

pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod project;
pub mod query;
pub mod service;

pub use config::Config;
pub use error::{IndexError, Result};
pub use index::{Dependency, DependencyKind, Extractor, FileRecord, Scope, Symbol, SymbolKind};
pub use service::{CodeIntelligence, FileAnalysis};
