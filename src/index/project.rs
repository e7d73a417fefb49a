// Per-project in-memory index

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::FileRecord;

/// Project metadata exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub path: PathBuf,
    pub added_at: DateTime<Utc>,
}

/// Aggregate counts over a project's records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub files: usize,
    pub symbols: usize,
    pub dependencies: usize,
    pub parse_errors: usize,
    pub languages: BTreeMap<String, usize>,
    pub symbol_kinds: BTreeMap<String, usize>,
}

/// In-memory store of file records for one watched root.
///
/// Records are held behind `Arc` and swapped in a single map insert, so a
/// reader holding a record sees either the old or the new version in full.
/// Every mutation carries a ticket from [`ProjectIndex::next_ticket`]; a
/// mutation whose ticket is older than the last one applied to the same path
/// is discarded. Once retired, the index accepts no further mutations.
pub struct ProjectIndex {
    name: String,
    root: PathBuf,
    added_at: DateTime<Utc>,
    files: DashMap<PathBuf, Arc<FileRecord>>,
    versions: DashMap<PathBuf, u64>,
    tickets: AtomicU64,
    retired: RwLock<bool>,
}

impl ProjectIndex {
    pub fn new(name: impl Into<String>, root: PathBuf) -> Self {
        Self {
            name: name.into(),
            root,
            added_at: Utc::now(),
            files: DashMap::new(),
            versions: DashMap::new(),
            tickets: AtomicU64::new(0),
            retired: RwLock::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn info(&self) -> ProjectInfo {
        ProjectInfo {
            name: self.name.clone(),
            path: self.root.clone(),
            added_at: self.added_at,
        }
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Issue the ordering ticket for the next mutation
    pub fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self, path: &Path) -> Option<Arc<FileRecord>> {
        self.files.get(path).map(|entry| entry.value().clone())
    }

    /// Install `record`, replacing any previous record for its path.
    /// Returns false when the index is retired or a newer ticket already applied.
    pub fn install(&self, record: Arc<FileRecord>, ticket: u64) -> bool {
        let retired = self.retired.read();
        if *retired {
            debug!("Discarding record for {} from retired project", record.path.display());
            return false;
        }

        let mut version = self.versions.entry(record.path.clone()).or_insert(0);
        if ticket < *version {
            debug!("Discarding superseded record for {}", record.path.display());
            return false;
        }
        *version = ticket;
        self.files.insert(record.path.clone(), record);
        true
    }

    /// Record that `ticket` found the cached record for `path` current.
    /// Returns false when the index is retired or a newer ticket already applied.
    pub fn confirm(&self, path: &Path, ticket: u64) -> bool {
        let retired = self.retired.read();
        if *retired {
            return false;
        }

        let mut version = self.versions.entry(path.to_path_buf()).or_insert(0);
        if ticket < *version {
            return false;
        }
        *version = ticket;
        true
    }

    /// Drop the record for `path`. Idempotent: removing an absent path is fine.
    /// Returns whether a record was present.
    pub fn remove(&self, path: &Path, ticket: u64) -> bool {
        let retired = self.retired.read();
        if *retired {
            return false;
        }

        let mut version = self.versions.entry(path.to_path_buf()).or_insert(0);
        if ticket < *version {
            return false;
        }
        *version = ticket;
        self.files.remove(path).is_some()
    }

    /// Drop every record below `dir`
    pub fn remove_under(&self, dir: &Path, ticket: u64) -> usize {
        let paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|entry| entry.key().starts_with(dir))
            .map(|entry| entry.key().clone())
            .collect();

        paths.iter().filter(|path| self.remove(path, ticket)).count()
    }

    pub fn has_files_under(&self, dir: &Path) -> bool {
        self.files.iter().any(|entry| entry.key().starts_with(dir))
    }

    /// Point-in-time copy of the committed records
    pub fn snapshot(&self) -> Vec<Arc<FileRecord>> {
        self.files.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_retired(&self) -> bool {
        *self.retired.read()
    }

    /// Stop accepting mutations and free every record
    pub fn retire(&self) {
        let mut retired = self.retired.write();
        *retired = true;
        self.files.clear();
        self.versions.clear();
    }

    pub fn stats(&self) -> ProjectStats {
        let mut stats = ProjectStats::default();
        for record in self.snapshot() {
            stats.files += 1;
            stats.symbols += record.symbols.len();
            stats.dependencies += record.dependencies.len();
            if record.parse_error.is_some() {
                stats.parse_errors += 1;
            }
            *stats.languages.entry(record.language.clone()).or_insert(0) += 1;
            for symbol in &record.symbols {
                *stats
                    .symbol_kinds
                    .entry(symbol.kind.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        stats
    }
}
