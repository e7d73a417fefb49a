// File watcher for incremental updates

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::debounce::{ChangeKind, CoalescedChange, Debouncer};
use super::{IncrementalIndexer, IndexOutcome};
use crate::error::{IndexError, Result};
use crate::index::ProjectIndex;

/// Recursive OS watch feeding one project's indexing pipeline.
///
/// The notify callback only forwards raw events into a channel. An ingestion
/// task translates and filters them into the debouncer, and a dispatch task
/// hands each coalesced change to the shared worker pool.
pub struct ProjectWatcher {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    debouncer: Arc<Debouncer>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProjectWatcher {
    /// Start watching `project`'s root. Must be called from within a tokio runtime.
    pub fn start(
        project: Arc<ProjectIndex>,
        indexer: Arc<IncrementalIndexer>,
        pool: Arc<Semaphore>,
        debounce: Duration,
    ) -> Result<Self> {
        let root = project.root().to_path_buf();
        let watch_error = |source| IndexError::Watch {
            path: root.clone(),
            source,
        };

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(watch_error)?;

        let (debouncer, changes) = Debouncer::new(debounce);
        let debouncer = Arc::new(debouncer);

        let ingest = tokio::spawn(ingest(
            raw_rx,
            Arc::clone(&project),
            Arc::clone(&indexer),
            Arc::clone(&debouncer),
        ));
        let dispatch = tokio::spawn(dispatch(changes, project, indexer, pool));

        info!("Watching {}", root.display());

        Ok(Self {
            root,
            watcher: Some(watcher),
            debouncer,
            tasks: vec![ingest, dispatch],
        })
    }

    /// Paths waiting out the debounce window
    pub fn pending_changes(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Stop the OS watch, drop pending timers and stop dispatching.
    /// Work already on the pool finishes but is discarded by the retired index.
    pub fn stop(&mut self) {
        if self.watcher.take().is_none() {
            return;
        }
        self.debouncer.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Stopped watching {}", self.root.display());
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Map one raw notify event onto per-path change kinds.
/// Renames become a deletion of the old path plus a creation of the new one.
pub fn translate(event: &Event) -> Vec<(PathBuf, ChangeKind)> {
    let each = |kind: ChangeKind| -> Vec<(PathBuf, ChangeKind)> {
        event.paths.iter().map(|path| (path.clone(), kind)).collect()
    };
    let by_existence = || -> Vec<(PathBuf, ChangeKind)> {
        event
            .paths
            .iter()
            .map(|path| {
                let kind = if path.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                (path.clone(), kind)
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => each(ChangeKind::Created),
        EventKind::Remove(_) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::Both if event.paths.len() >= 2 => vec![
                (event.paths[0].clone(), ChangeKind::Deleted),
                (event.paths[1].clone(), ChangeKind::Created),
            ],
            RenameMode::From => each(ChangeKind::Deleted),
            RenameMode::To => each(ChangeKind::Created),
            _ => by_existence(),
        },
        EventKind::Modify(_) => each(ChangeKind::Modified),
        EventKind::Any => by_existence(),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Whether a translated change is worth debouncing for `project`
fn is_tracked(project: &ProjectIndex, indexer: &IncrementalIndexer, path: &Path, kind: ChangeKind) -> bool {
    if !project.contains_path(path) || indexer.is_excluded(project.root(), path) {
        return false;
    }
    if indexer.registry().is_supported(path) {
        return true;
    }

    // Directories: removal prunes cached records, creation indexes the subtree
    match kind {
        ChangeKind::Deleted => project.has_files_under(path),
        ChangeKind::Created => path.is_dir(),
        ChangeKind::Modified => false,
    }
}

async fn ingest(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    project: Arc<ProjectIndex>,
    indexer: Arc<IncrementalIndexer>,
    debouncer: Arc<Debouncer>,
) {
    while let Some(res) = events.recv().await {
        match res {
            Ok(event) => {
                for (path, kind) in translate(&event) {
                    if is_tracked(&project, &indexer, &path, kind) {
                        debug!("File event: {} {}", kind.as_str(), path.display());
                        debouncer.record(path, kind);
                    }
                }
            }
            Err(e) => error!("File watch error on {}: {}", project.root().display(), e),
        }
    }
}

async fn dispatch(
    mut changes: mpsc::UnboundedReceiver<CoalescedChange>,
    project: Arc<ProjectIndex>,
    indexer: Arc<IncrementalIndexer>,
    pool: Arc<Semaphore>,
) {
    while let Some(change) = changes.recv().await {
        if project.is_retired() {
            break;
        }

        if change.kind != ChangeKind::Deleted && change.path.is_dir() {
            let indexer = Arc::clone(&indexer);
            let project = Arc::clone(&project);
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                let summary = indexer.index_tree(&project, &change.path, &pool).await;
                info!(
                    "Indexed new directory {}: {} files, {} symbols",
                    change.path.display(),
                    summary.indexed,
                    summary.symbols
                );
            });
            continue;
        }

        // Tickets follow receive order, so a slow earlier change for the
        // same path cannot overwrite a later one
        let ticket = project.next_ticket();
        let permit = match Arc::clone(&pool).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let indexer = Arc::clone(&indexer);
        let project = Arc::clone(&project);
        tokio::spawn(async move {
            let path = change.path.clone();
            let applied = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                indexer.apply(&project, &change, ticket)
            })
            .await;

            match applied {
                Ok(outcome) => log_outcome(&path, &outcome),
                Err(e) => warn!("Indexing task for {} failed: {}", path.display(), e),
            }
        });
    }
}

fn log_outcome(path: &Path, outcome: &IndexOutcome) {
    match outcome {
        IndexOutcome::Indexed { symbols, .. } => {
            info!("Re-indexed {}: {} symbols", path.display(), symbols)
        }
        IndexOutcome::Removed { files } if *files > 0 => {
            info!("Removed {} from index ({} files)", path.display(), files)
        }
        other => debug!("{}: {:?}", path.display(), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::indexer::registry::ExtractorRegistry;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::tempdir;

    #[test]
    fn test_translate_rename_both() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/old.py"))
            .add_path(PathBuf::from("/p/new.py"));

        assert_eq!(
            translate(&event),
            vec![
                (PathBuf::from("/p/old.py"), ChangeKind::Deleted),
                (PathBuf::from("/p/new.py"), ChangeKind::Created),
            ]
        );
    }

    #[test]
    fn test_translate_basic_kinds() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/p/a.py"));
        assert_eq!(translate(&create), vec![(PathBuf::from("/p/a.py"), ChangeKind::Created)]);

        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/p/a.py"));
        assert_eq!(translate(&modify), vec![(PathBuf::from("/p/a.py"), ChangeKind::Modified)]);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/p/a.py"));
        assert_eq!(translate(&remove), vec![(PathBuf::from("/p/a.py"), ChangeKind::Deleted)]);

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/p/a.py"));
        assert_eq!(translate(&from), vec![(PathBuf::from("/p/a.py"), ChangeKind::Deleted)]);

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(PathBuf::from("/p/a.py"));
        assert!(translate(&access).is_empty());
    }

    #[test]
    fn test_translate_ambiguous_rename_checks_disk() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("here.py");
        std::fs::write(&present, "").unwrap();
        let gone = dir.path().join("gone.py");

        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Any)))
            .add_path(present.clone())
            .add_path(gone.clone());
        assert_eq!(
            translate(&event),
            vec![(present, ChangeKind::Created), (gone, ChangeKind::Deleted)]
        );
    }

    #[test]
    fn test_tracking_filter() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        let indexer = IncrementalIndexer::new(
            Arc::new(ExtractorRegistry::with_builtin()),
            &IndexingConfig::default(),
        );
        let project = ProjectIndex::new("p", dir.path().to_path_buf());
        let root = dir.path();

        assert!(is_tracked(&project, &indexer, &root.join("a.py"), ChangeKind::Modified));
        assert!(!is_tracked(&project, &indexer, &root.join("notes.txt"), ChangeKind::Modified));
        assert!(!is_tracked(&project, &indexer, &root.join(".git/x.py"), ChangeKind::Created));
        assert!(!is_tracked(&project, &indexer, Path::new("/elsewhere/a.py"), ChangeKind::Created));

        // New directory gets indexed, unknown removed directory is ignored
        assert!(is_tracked(&project, &indexer, &root.join("pkg"), ChangeKind::Created));
        assert!(!is_tracked(&project, &indexer, &root.join("pkg"), ChangeKind::Deleted));
    }
}
