// Per-path event coalescing

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Semantic change kinds after raw event translation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A path waiting for its quiet period to elapse
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub detected_at: Instant,
}

/// The single change emitted for a burst of raw events on one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalescedChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

#[derive(Default)]
struct State {
    pending: HashMap<PathBuf, PendingChange>,
    closed: bool,
}

/// Debounce state machine, keyed by path.
///
/// A path with no pending entry is idle. The first event makes it pending and
/// starts a timer; later events overwrite the kind and push the deadline out.
/// Once `window` passes without events the latest kind is sent exactly once
/// and the path goes back to idle.
pub struct Debouncer {
    window: Duration,
    state: Arc<Mutex<State>>,
    tx: mpsc::UnboundedSender<CoalescedChange>,
    shutdown: watch::Sender<bool>,
}

impl Debouncer {
    /// Must be called from within a tokio runtime
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<CoalescedChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let debouncer = Self {
            window,
            state: Arc::new(Mutex::new(State::default())),
            tx,
            shutdown,
        };
        (debouncer, rx)
    }

    /// Register a raw event for `path`
    pub fn record(&self, path: PathBuf, kind: ChangeKind) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }

        let now = Instant::now();
        if let Some(pending) = state.pending.get_mut(&path) {
            pending.kind = kind;
            pending.detected_at = now;
            return;
        }

        state.pending.insert(
            path.clone(),
            PendingChange {
                path: path.clone(),
                kind,
                detected_at: now,
            },
        );
        drop(state);

        self.spawn_timer(path);
    }

    fn spawn_timer(&self, path: PathBuf) {
        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let window = self.window;
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                let deadline = {
                    let state = state.lock();
                    match state.pending.get(&path) {
                        Some(pending) if !state.closed => pending.detected_at + window,
                        _ => return,
                    }
                };

                tokio::select! {
                    _ = sleep_until(deadline) => {}
                    _ = shutdown.changed() => return,
                }

                let change = {
                    let mut state = state.lock();
                    let due = match state.pending.get(&path) {
                        Some(pending) => pending.detected_at + window <= Instant::now(),
                        None => return,
                    };
                    if !due {
                        continue;
                    }
                    state.pending.remove(&path)
                };

                if let Some(pending) = change {
                    debug!("Debounced {} {}", pending.kind.as_str(), pending.path.display());
                    let _ = tx.send(CoalescedChange {
                        path: pending.path,
                        kind: pending.kind,
                    });
                }
                return;
            }
        });
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Drop every pending change and stop all timers. Later events are ignored.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        drop(state);

        self.shutdown.send_replace(true);
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_latest_kind() {
        let (debouncer, mut rx) = Debouncer::new(WINDOW);
        let start = Instant::now();

        debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Created);
        for _ in 0..5 {
            tokio::time::advance(Duration::from_millis(200)).await;
            debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Modified);
        }
        assert_eq!(debouncer.pending_count(), 1);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.path, PathBuf::from("/p/a.py"));
        assert_eq!(change.kind, ChangeKind::Modified);
        assert!(start.elapsed() >= Duration::from_millis(2000));

        assert_eq!(debouncer.pending_count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_paths_are_independent() {
        let (debouncer, mut rx) = Debouncer::new(WINDOW);

        debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Modified);
        tokio::time::advance(Duration::from_millis(500)).await;
        debouncer.record(PathBuf::from("/p/b.py"), ChangeKind::Deleted);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, CoalescedChange { path: "/p/a.py".into(), kind: ChangeKind::Modified });
        assert_eq!(second, CoalescedChange { path: "/p/b.py".into(), kind: ChangeKind::Deleted });
    }

    #[tokio::test(start_paused = true)]
    async fn test_path_returns_to_idle_after_emit() {
        let (debouncer, mut rx) = Debouncer::new(WINDOW);

        debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Modified);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Modified);

        debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Deleted);
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Deleted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending() {
        let (debouncer, mut rx) = Debouncer::new(WINDOW);

        debouncer.record(PathBuf::from("/p/a.py"), ChangeKind::Modified);
        debouncer.cancel();
        debouncer.record(PathBuf::from("/p/b.py"), ChangeKind::Modified);
        assert_eq!(debouncer.pending_count(), 0);

        let waited = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(waited.is_err());
    }
}
