// Incremental indexing and file watching

pub mod debounce;
pub mod parser;
pub mod registry;
pub mod watcher;

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::IndexingConfig;
use crate::error::{IndexError, Result};
use crate::index::{content_hash, Extraction, Extractor, FileRecord, ProjectIndex};

use self::debounce::{ChangeKind, CoalescedChange};
use self::registry::ExtractorRegistry;

/// What happened to one path after a change was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A new record was installed
    Indexed {
        symbols: usize,
        dependencies: usize,
        parse_error: bool,
    },
    /// Content hash matched the cached record
    Unchanged,
    Removed { files: usize },
    Skipped(SkipReason),
    /// Read failed; any stale record was dropped
    Failed(String),
    /// Superseded by a newer change or the project was removed
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Unsupported,
    Excluded,
    TooLarge { size: u64 },
}

/// Result of [`IncrementalIndexer::refresh`]
#[derive(Debug, Clone)]
pub enum Refreshed {
    Indexed(Arc<FileRecord>),
    Unchanged(Arc<FileRecord>),
    Discarded,
}

/// Totals for a tree walk
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub files: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub parse_errors: usize,
    pub symbols: usize,
    pub elapsed: Duration,
}

impl IndexSummary {
    pub fn record(&mut self, outcome: &IndexOutcome) {
        self.files += 1;
        match outcome {
            IndexOutcome::Indexed {
                symbols,
                parse_error,
                ..
            } => {
                self.indexed += 1;
                self.symbols += symbols;
                if *parse_error {
                    self.parse_errors += 1;
                }
            }
            IndexOutcome::Unchanged => self.unchanged += 1,
            IndexOutcome::Skipped(_) => self.skipped += 1,
            IndexOutcome::Failed(_) => self.failed += 1,
            IndexOutcome::Removed { .. } | IndexOutcome::Discarded => {}
        }
    }
}

/// Turns coalesced changes into [`ProjectIndex`] mutations
pub struct IncrementalIndexer {
    registry: Arc<ExtractorRegistry>,
    exclude_dirs: HashSet<String>,
    max_file_size: u64,
    follow_symlinks: bool,
    workers: usize,
}

impl IncrementalIndexer {
    pub fn new(registry: Arc<ExtractorRegistry>, config: &IndexingConfig) -> Self {
        Self {
            registry,
            exclude_dirs: config.exclude_dirs.iter().cloned().collect(),
            max_file_size: config.max_file_size,
            follow_symlinks: config.follow_symlinks,
            workers: config.workers.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<ExtractorRegistry> {
        &self.registry
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether `path` sits inside an excluded directory below `root`
    pub fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative.components().any(|component| match component {
            Component::Normal(name) => name
                .to_str()
                .is_some_and(|name| self.exclude_dirs.contains(name)),
            _ => false,
        })
    }

    pub fn is_eligible(&self, root: &Path, path: &Path) -> bool {
        self.registry.is_supported(path) && !self.is_excluded(root, path)
    }

    /// Apply one coalesced change to `project`
    pub fn apply(&self, project: &ProjectIndex, change: &CoalescedChange, ticket: u64) -> IndexOutcome {
        debug!("Applying {} {}", change.kind.as_str(), change.path.display());

        match change.kind {
            ChangeKind::Deleted => self.remove_path(project, &change.path, ticket),
            ChangeKind::Created | ChangeKind::Modified => self.index_file(project, &change.path, ticket),
        }
    }

    /// Re-read `path` and install a fresh record unless the content hash matches.
    pub fn refresh(&self, project: &ProjectIndex, path: &Path, ticket: u64) -> Result<Refreshed> {
        let extractor = self
            .registry
            .get_for_file(path)
            .ok_or_else(|| IndexError::UnsupportedLanguage(path.to_path_buf()))?;

        let bytes = self.read_source(path)?;
        let hash = content_hash(&bytes);

        if let Some(existing) = project.get(path) {
            if existing.content_hash == hash {
                if !project.confirm(path, ticket) {
                    return Ok(Refreshed::Discarded);
                }
                debug!("Unchanged: {}", path.display());
                return Ok(Refreshed::Unchanged(existing));
            }
        }

        let source = decode(path, bytes)?;
        let extraction = self.analyze_source(extractor.as_ref(), &source, path);
        let record = Arc::new(FileRecord::new(
            path.to_path_buf(),
            extractor.language(),
            hash,
            extraction,
        ));

        if project.install(Arc::clone(&record), ticket) {
            Ok(Refreshed::Indexed(record))
        } else {
            Ok(Refreshed::Discarded)
        }
    }

    /// Index a created or modified file. Failures never propagate: they are
    /// logged and the stale record, if any, is dropped.
    pub fn index_file(&self, project: &ProjectIndex, path: &Path, ticket: u64) -> IndexOutcome {
        if !self.registry.is_supported(path) {
            return IndexOutcome::Skipped(SkipReason::Unsupported);
        }
        if self.is_excluded(project.root(), path) {
            return IndexOutcome::Skipped(SkipReason::Excluded);
        }

        match self.refresh(project, path, ticket) {
            Ok(Refreshed::Indexed(record)) => {
                debug!("Indexed {}: {} symbols", path.display(), record.symbols.len());
                IndexOutcome::Indexed {
                    symbols: record.symbols.len(),
                    dependencies: record.dependencies.len(),
                    parse_error: record.parse_error.is_some(),
                }
            }
            Ok(Refreshed::Unchanged(_)) => IndexOutcome::Unchanged,
            Ok(Refreshed::Discarded) => IndexOutcome::Discarded,
            Err(IndexError::FileTooLarge { size, limit, .. }) => {
                info!("Skipping {}: {} bytes exceeds {} byte limit", path.display(), size, limit);
                project.remove(path, ticket);
                IndexOutcome::Skipped(SkipReason::TooLarge { size })
            }
            Err(e) => {
                warn!("Failed to index {}: {}", path.display(), e);
                project.remove(path, ticket);
                IndexOutcome::Failed(e.to_string())
            }
        }
    }

    /// Drop the record for a deleted file, or every record below a deleted directory
    pub fn remove_path(&self, project: &ProjectIndex, path: &Path, ticket: u64) -> IndexOutcome {
        if project.remove(path, ticket) {
            debug!("Removed {}", path.display());
            return IndexOutcome::Removed { files: 1 };
        }

        let files = project.remove_under(path, ticket);
        if files > 0 {
            debug!("Removed {} records under {}", files, path.display());
        }
        IndexOutcome::Removed { files }
    }

    /// One-shot analysis outside any project
    pub fn analyze_path(&self, path: &Path) -> Result<FileRecord> {
        let extractor = self
            .registry
            .get_for_file(path)
            .ok_or_else(|| IndexError::UnsupportedLanguage(path.to_path_buf()))?;

        let bytes = self.read_source(path)?;
        let hash = content_hash(&bytes);
        let source = decode(path, bytes)?;
        let extraction = self.analyze_source(extractor.as_ref(), &source, path);

        Ok(FileRecord::new(path.to_path_buf(), extractor.language(), hash, extraction))
    }

    fn analyze_source(&self, extractor: &dyn Extractor, source: &str, path: &Path) -> Extraction {
        let extraction = extractor.extract(source, path);
        if let Some(message) = &extraction.parse_error {
            warn!("{}", message);
        }
        extraction
    }

    /// Read a file, refusing anything above the size limit
    fn read_source(&self, path: &Path) -> Result<Vec<u8>> {
        let metadata = std::fs::metadata(path).map_err(|e| IndexError::io(path, e))?;
        if !metadata.is_file() {
            return Err(IndexError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        if metadata.len() > self.max_file_size {
            return Err(IndexError::FileTooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        std::fs::read(path).map_err(|e| IndexError::io(path, e))
    }

    /// Eligible files below `dir`; excluded directories are pruned before descent
    pub fn collect_files(&self, root: &Path, dir: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(dir)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| self.exclude_dirs.contains(name)))
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_file() && self.is_eligible(root, entry.path()) {
                files.push(entry.into_path());
            }
        }
        files
    }

    /// Index every eligible file below `dir` as a synthetic creation,
    /// bounded by the shared worker `pool`
    pub async fn index_tree(
        self: &Arc<Self>,
        project: &Arc<ProjectIndex>,
        dir: &Path,
        pool: &Arc<Semaphore>,
    ) -> IndexSummary {
        let started = Instant::now();

        let files = {
            let indexer = Arc::clone(self);
            let root = project.root().to_path_buf();
            let dir = dir.to_path_buf();
            tokio::task::spawn_blocking(move || indexer.collect_files(&root, &dir))
                .await
                .unwrap_or_default()
        };
        debug!("Found {} files under {}", files.len(), dir.display());

        let outcomes: Vec<Option<IndexOutcome>> = stream::iter(files)
            .map(|path| {
                let indexer = Arc::clone(self);
                let project = Arc::clone(project);
                let pool = Arc::clone(pool);
                async move {
                    let _permit = pool.acquire_owned().await.ok()?;
                    if project.is_retired() {
                        return None;
                    }
                    let ticket = project.next_ticket();
                    tokio::task::spawn_blocking(move || indexer.index_file(&project, &path, ticket))
                        .await
                        .ok()
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut summary = IndexSummary::default();
        for outcome in outcomes.iter().flatten() {
            summary.record(outcome);
        }
        summary.elapsed = started.elapsed();
        summary
    }
}

fn decode(path: &Path, bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes)
        .map_err(|e| IndexError::io(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}
