// Watched project lifecycle

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tracing::info;

use crate::error::{IndexError, Result};
use crate::index::{ProjectIndex, ProjectInfo};
use crate::indexer::watcher::ProjectWatcher;
use crate::indexer::{IncrementalIndexer, IndexSummary};

/// Snapshot returned by [`ProjectManager::list_projects`]
#[derive(Debug, Clone, Serialize)]
pub struct ProjectListing {
    pub projects: Vec<ProjectInfo>,
    pub watch_status: WatchStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchStatus {
    pub watched_count: usize,
    pub cached_file_count: usize,
    pub pending_changes: usize,
}

struct WatchedProject {
    index: Arc<ProjectIndex>,
    watcher: ProjectWatcher,
}

/// Owner of every watched [`ProjectIndex`].
///
/// Add and remove on the same root are serialized through a per-root async
/// lock; different roots never wait on each other.
pub struct ProjectManager {
    indexer: Arc<IncrementalIndexer>,
    projects: DashMap<PathBuf, WatchedProject>,
    path_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    pool: Arc<Semaphore>,
    debounce: Duration,
}

impl ProjectManager {
    pub fn new(indexer: Arc<IncrementalIndexer>, debounce: Duration) -> Self {
        let workers = indexer.workers();
        Self {
            indexer,
            projects: DashMap::new(),
            path_locks: DashMap::new(),
            pool: Arc::new(Semaphore::new(workers)),
            debounce,
        }
    }

    pub fn indexer(&self) -> &Arc<IncrementalIndexer> {
        &self.indexer
    }

    fn lock_for(&self, root: &Path) -> Arc<Mutex<()>> {
        self.path_locks
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `root` unless another caller holds or awaits it.
    /// `lock` is the caller's own handle, which must be the only one left
    /// besides the map's.
    fn release_lock(&self, root: &Path, lock: Arc<Mutex<()>>) {
        self.path_locks
            .remove_if(root, |_, held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
    }

    /// Start watching `path`, index it, and register it.
    /// The watch starts before the initial walk so edits made during the walk are not lost.
    pub async fn add_project(&self, path: &Path, name: Option<&str>) -> Result<(ProjectInfo, IndexSummary)> {
        if !path.exists() {
            return Err(IndexError::NotFound(path.to_path_buf()));
        }
        let root = path.canonicalize().map_err(|e| IndexError::io(path, e))?;
        if !root.is_dir() {
            return Err(IndexError::NotFound(root));
        }

        let lock = self.lock_for(&root);
        let guard = lock.lock().await;
        let result = self.add_locked(root.clone(), name).await;
        drop(guard);

        if result.is_err() && !self.projects.contains_key(&root) {
            self.release_lock(&root, lock);
        }
        result
    }

    async fn add_locked(&self, root: PathBuf, name: Option<&str>) -> Result<(ProjectInfo, IndexSummary)> {
        if self.projects.contains_key(&root) {
            return Err(IndexError::AlreadyWatched(root));
        }

        let name = name
            .map(str::to_string)
            .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| root.display().to_string());
        let index = Arc::new(ProjectIndex::new(name, root.clone()));

        let watcher = ProjectWatcher::start(
            Arc::clone(&index),
            Arc::clone(&self.indexer),
            Arc::clone(&self.pool),
            self.debounce,
        )?;

        let summary = self.indexer.index_tree(&index, &root, &self.pool).await;
        info!(
            "Indexed project {} ({}): {} files, {} symbols, {} failed in {:?}",
            index.name(),
            root.display(),
            summary.indexed,
            summary.symbols,
            summary.failed,
            summary.elapsed
        );

        let info = index.info();
        self.projects.insert(root, WatchedProject { index, watcher });
        Ok((info, summary))
    }

    /// Stop watching `path` and free its index
    pub async fn remove_project(&self, path: &Path) -> Result<ProjectInfo> {
        let root = normalize_path(path);

        let lock = self.lock_for(&root);
        let guard = lock.lock().await;
        let result = match self.projects.remove(&root) {
            Some((_, mut project)) => {
                project.watcher.stop();
                project.index.retire();
                info!("Removed project {} ({})", project.index.name(), root.display());
                Ok(project.index.info())
            }
            None => Err(IndexError::NotWatched(root.clone())),
        };
        drop(guard);

        self.release_lock(&root, lock);
        result
    }

    pub fn list_projects(&self) -> ProjectListing {
        let mut projects = Vec::new();
        let mut cached_file_count = 0;
        let mut pending_changes = 0;
        for entry in self.projects.iter() {
            projects.push(entry.index.info());
            cached_file_count += entry.index.file_count();
            pending_changes += entry.watcher.pending_changes();
        }
        projects.sort_by(|a, b| a.path.cmp(&b.path));

        ProjectListing {
            watch_status: WatchStatus {
                watched_count: projects.len(),
                cached_file_count,
                pending_changes,
            },
            projects,
        }
    }

    /// Live indexes, in root order
    pub fn projects_snapshot(&self) -> Vec<Arc<ProjectIndex>> {
        let mut indexes: Vec<Arc<ProjectIndex>> = self
            .projects
            .iter()
            .map(|entry| Arc::clone(&entry.index))
            .collect();
        indexes.sort_by(|a, b| a.root().cmp(b.root()));
        indexes
    }

    pub fn get(&self, root: &Path) -> Option<Arc<ProjectIndex>> {
        let root = normalize_path(root);
        self.projects.get(&root).map(|entry| Arc::clone(&entry.index))
    }

    /// The most specific watched project containing `path`
    pub fn project_for_path(&self, path: &Path) -> Option<Arc<ProjectIndex>> {
        self.projects
            .iter()
            .filter(|entry| path.starts_with(entry.key()))
            .max_by_key(|entry| entry.key().components().count())
            .map(|entry| Arc::clone(&entry.index))
    }

    /// Remove every project
    pub async fn shutdown(&self) {
        let roots: Vec<PathBuf> = self.projects.iter().map(|entry| entry.key().clone()).collect();
        for root in roots {
            // Already removed by a concurrent caller is fine here
            let _ = self.remove_project(&root).await;
        }
    }
}

/// Canonical form of `path`; for a path that no longer exists, the
/// canonical parent joined with the file name
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
