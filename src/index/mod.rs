// Index data model: symbols, dependencies and per-file records

pub mod project;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};

pub use project::{ProjectIndex, ProjectInfo, ProjectStats};

/// A named declaration located in a source file.
///
/// Addressed by `(file_path, name, line_start)`. Lines are 1-based, columns
/// 0-based; when an extractor cannot see the extent, `*_end` equals `*_start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub column_end: u32,
    pub signature: String,
    pub doc: Option<String>,
    /// Name of the innermost enclosing class, resolved by name within the same file
    pub parent: Option<String>,
    pub scope: Scope,
    pub language: String,
}

impl Symbol {
    /// Whether `line` falls inside this symbol's extent
    pub fn encloses(&self, line: u32) -> bool {
        self.line_start <= line && line <= self.line_end
    }
}

/// Symbol kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Variable,
    Interface,
    Type,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 6] = [
        SymbolKind::Function,
        SymbolKind::Method,
        SymbolKind::Class,
        SymbolKind::Variable,
        SymbolKind::Interface,
        SymbolKind::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Variable => "variable",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SymbolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SymbolKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown symbol kind: {}", s))
    }
}

/// Lexical scope a symbol was declared in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Global,
    Class,
    Function,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Class => "class",
            Scope::Function => "function",
        }
    }
}

/// One import/include edge, target left unresolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub source_file: PathBuf,
    pub target: String,
    pub alias: String,
    pub kind: DependencyKind,
    pub line: u32,
    pub is_relative: bool,
}

/// Dependency kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Import,
    FromImport,
    Require,
    DynamicImport,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Import => "import",
            DependencyKind::FromImport => "from_import",
            DependencyKind::Require => "require",
            DependencyKind::DynamicImport => "dynamic_import",
        }
    }
}

/// Output of one extractor run over one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub symbols: Vec<Symbol>,
    pub dependencies: Vec<Dependency>,
    pub parse_error: Option<String>,
}

impl Extraction {
    pub fn failed(error: &IndexError) -> Self {
        Self {
            symbols: Vec::new(),
            dependencies: Vec::new(),
            parse_error: Some(error.to_string()),
        }
    }
}

/// How an extractor understands source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Full syntax tree
    Grammar,
    /// Line-level regular expressions
    Pattern,
}

/// Language-specific source → symbols/dependencies conversion.
///
/// Implementations must not panic on any input. A fatal parse failure is
/// reported as `IndexError::Parse` from the `extract_*` methods; `extract`
/// folds it into an empty [`Extraction`] carrying the diagnostic.
pub trait Extractor: Send + Sync {
    fn language(&self) -> &str;
    fn file_extensions(&self) -> &[&'static str];
    fn strategy(&self) -> Strategy;
    fn extract_symbols(&self, source: &str, file_path: &Path) -> Result<Vec<Symbol>>;
    fn extract_dependencies(&self, source: &str, file_path: &Path) -> Result<Vec<Dependency>>;

    fn extract(&self, source: &str, file_path: &Path) -> Extraction {
        let symbols = match self.extract_symbols(source, file_path) {
            Ok(symbols) => symbols,
            Err(e) => return Extraction::failed(&e),
        };
        match self.extract_dependencies(source, file_path) {
            Ok(dependencies) => Extraction {
                symbols,
                dependencies,
                parse_error: None,
            },
            Err(e) => Extraction::failed(&e),
        }
    }
}

/// Cached analysis of one file. Replaced wholesale on re-index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub language: String,
    pub content_hash: String,
    pub symbols: Vec<Symbol>,
    pub dependencies: Vec<Dependency>,
    pub parse_error: Option<String>,
    pub last_indexed_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(path: PathBuf, language: &str, content_hash: String, extraction: Extraction) -> Self {
        Self {
            path,
            language: language.to_string(),
            content_hash,
            symbols: extraction.symbols,
            dependencies: extraction.dependencies,
            parse_error: extraction.parse_error,
            last_indexed_at: Utc::now(),
        }
    }
}

/// Hex digest used to detect content changes
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_round_trip_names() {
        for kind in SymbolKind::ALL {
            assert_eq!(kind.as_str().parse::<SymbolKind>().unwrap(), kind);
        }
        assert_eq!("CLASS".parse::<SymbolKind>().unwrap(), SymbolKind::Class);
        assert!("module".parse::<SymbolKind>().is_err());
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"def foo(): pass"), content_hash(b"def foo(): pass"));
        assert_ne!(content_hash(b"def foo(): pass"), content_hash(b"def bar(): pass"));
    }

    #[test]
    fn test_failed_extraction_is_empty() {
        let err = IndexError::Parse {
            path: PathBuf::from("bad.py"),
            message: "invalid syntax".to_string(),
        };
        let extraction = Extraction::failed(&err);
        assert!(extraction.symbols.is_empty());
        assert!(extraction.dependencies.is_empty());
        assert!(extraction.parse_error.unwrap().contains("invalid syntax"));
    }

    #[test]
    fn test_symbol_serializes_lowercase_kind() {
        let symbol = Symbol {
            name: "foo".to_string(),
            kind: SymbolKind::Function,
            file_path: PathBuf::from("a.py"),
            line_start: 1,
            line_end: 1,
            column_start: 0,
            column_end: 15,
            signature: "def foo()".to_string(),
            doc: None,
            parent: None,
            scope: Scope::Global,
            language: "python".to_string(),
        };
        let json = serde_json::to_value(&symbol).unwrap();
        assert_eq!(json["kind"], "function");
        assert_eq!(json["scope"], "global");
        assert!(symbol.encloses(1));
        assert!(!symbol.encloses(2));
    }
}
