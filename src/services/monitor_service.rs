use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::AppError;

/// Repeat events for the same path inside this window are suppressed.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
/// Debounce timestamps older than this are pruned to bound memory.
const DEBOUNCE_RETENTION: Duration = Duration::from_secs(5);
/// Backpressure accumulates here, never in the store.
const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    /// The destination side of a rename; consumers treat it like a create.
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

/// Watches a set of root paths recursively and emits a debounced, normalized
/// stream of change events over a bounded channel. A rename is always split
/// into a delete of the old path and a renamed signal for the new path.
pub struct ChangeMonitor {
    tx: SyncSender<ChangeEvent>,
    debouncer: Arc<Mutex<Debouncer>>,
    watchers: Vec<RecommendedWatcher>,
    active: bool,
}

impl ChangeMonitor {
    pub fn new() -> (Self, Receiver<ChangeEvent>) {
        let (tx, rx) = sync_channel(EVENT_QUEUE_CAPACITY);
        (
            ChangeMonitor {
                tx,
                debouncer: Arc::new(Mutex::new(Debouncer::new())),
                watchers: Vec::new(),
                active: false,
            },
            rx,
        )
    }

    /// Starts one recursive watcher per root. A no-op (with a warning) while
    /// already active; otherwise any previous watch set is fully stopped
    /// first. Per-root failures are logged and the remaining roots proceed.
    pub fn start(&mut self, paths: &[PathBuf]) {
        if self.active {
            tracing::warn!("file system monitoring is already active");
            return;
        }
        self.stop();

        for path in paths {
            if !path.is_dir() {
                tracing::warn!("watch path does not exist: {}", path.display());
                continue;
            }
            match self.create_watcher(path) {
                Ok(watcher) => {
                    self.watchers.push(watcher);
                    tracing::info!("started monitoring path: {}", path.display());
                }
                Err(e) => {
                    tracing::error!("error starting monitoring for {}: {e}", path.display());
                }
            }
        }

        self.active = true;
    }

    pub fn stop(&mut self) {
        self.watchers.clear();
        self.debouncer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
        if self.active {
            tracing::info!("stopped file system monitoring");
        }
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn create_watcher(&self, path: &Path) -> Result<RecommendedWatcher, AppError> {
        let tx = self.tx.clone();
        let debouncer = self.debouncer.clone();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                match result {
                    Ok(event) => dispatch(&event, &debouncer, &tx),
                    // Watcher infrastructure errors are log-only; they are not
                    // filesystem events and monitoring keeps running.
                    Err(e) => tracing::error!("file system watcher error: {e}"),
                }
            })
            .map_err(|e| AppError::Watcher(e.to_string()))?;
        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| AppError::Watcher(e.to_string()))?;
        Ok(watcher)
    }
}

/// One unit of debouncing: a rename pair is admitted or suppressed as a whole,
/// keyed on its destination path.
enum Normalized {
    Single(ChangeEvent),
    RenamePair { from: PathBuf, to: PathBuf },
}

fn dispatch(event: &notify::Event, debouncer: &Mutex<Debouncer>, tx: &SyncSender<ChangeEvent>) {
    let now = Instant::now();
    for item in normalize(event) {
        let admitted = {
            let mut guard = debouncer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match &item {
                Normalized::Single(ev) => guard.admit(&ev.path, now),
                Normalized::RenamePair { to, .. } => guard.admit(to, now),
            }
        };
        if !admitted {
            continue;
        }
        match item {
            Normalized::Single(ev) => send(tx, ev),
            Normalized::RenamePair { from, to } => {
                send(
                    tx,
                    ChangeEvent {
                        kind: ChangeKind::Deleted,
                        path: from,
                    },
                );
                send(
                    tx,
                    ChangeEvent {
                        kind: ChangeKind::Renamed,
                        path: to,
                    },
                );
            }
        }
    }
}

fn send(tx: &SyncSender<ChangeEvent>, event: ChangeEvent) {
    // A full queue blocks the watcher callback until the consumer drains;
    // a dropped receiver just means nobody is listening any more.
    if tx.send(event).is_err() {
        tracing::debug!("change event dropped: no consumer attached");
    }
}

fn normalize(event: &notify::Event) -> Vec<Normalized> {
    let single = |kind: ChangeKind| -> Vec<Normalized> {
        event
            .paths
            .iter()
            .map(|p| {
                Normalized::Single(ChangeEvent {
                    kind,
                    path: p.clone(),
                })
            })
            .collect()
    };

    match event.kind {
        EventKind::Create(_) => single(ChangeKind::Created),
        EventKind::Remove(_) => single(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![Normalized::RenamePair {
                from: from.clone(),
                to: to.clone(),
            }],
            _ => single(ChangeKind::Modified),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => single(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(ChangeKind::Renamed),
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Some backends only report "a name changed" with one path; treat
            // it as a create when the path still exists and a delete when not.
            if let [from, to] = event.paths.as_slice() {
                vec![Normalized::RenamePair {
                    from: from.clone(),
                    to: to.clone(),
                }]
            } else {
                event
                    .paths
                    .iter()
                    .map(|p| {
                        let kind = if p.exists() {
                            ChangeKind::Renamed
                        } else {
                            ChangeKind::Deleted
                        };
                        Normalized::Single(ChangeEvent {
                            kind,
                            path: p.clone(),
                        })
                    })
                    .collect()
            }
        }
        EventKind::Modify(_) => single(ChangeKind::Modified),
        _ => Vec::new(),
    }
}

/// Per-path last-seen timestamps for duplicate suppression.
struct Debouncer {
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Debouncer {
            seen: HashMap::new(),
        }
    }

    /// True when the event should be processed; false when a prior event for
    /// the same path was accepted inside the debounce window. Stale entries
    /// are pruned on every accepted event.
    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.seen.get(path) {
            if now.duration_since(*last) < DEBOUNCE_WINDOW {
                return false;
            }
        }
        self.seen.insert(path.to_path_buf(), now);
        self.seen
            .retain(|_, accepted| now.duration_since(*accepted) <= DEBOUNCE_RETENTION);
        true
    }

    fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn debounce_suppresses_events_inside_window() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();
        let path = Path::new("/data/file.txt");

        assert!(debouncer.admit(path, t0));
        assert!(!debouncer.admit(path, t0 + Duration::from_millis(300)));
    }

    #[test]
    fn debounce_admits_events_outside_window() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();
        let path = Path::new("/data/file.txt");

        assert!(debouncer.admit(path, t0));
        assert!(debouncer.admit(path, t0 + Duration::from_millis(600)));
    }

    #[test]
    fn debounce_tracks_paths_independently() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();

        assert!(debouncer.admit(Path::new("/a"), t0));
        assert!(debouncer.admit(Path::new("/b"), t0 + Duration::from_millis(100)));
    }

    #[test]
    fn debounce_prunes_stale_entries() {
        let mut debouncer = Debouncer::new();
        let t0 = Instant::now();

        debouncer.admit(Path::new("/a"), t0);
        debouncer.admit(Path::new("/b"), t0 + Duration::from_secs(6));

        assert_eq!(debouncer.seen.len(), 1);
        assert!(debouncer.seen.contains_key(Path::new("/b")));
    }

    #[test]
    fn rename_with_both_paths_becomes_delete_plus_renamed() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/data/old.txt"))
            .add_path(PathBuf::from("/data/new.txt"));

        let (monitor, rx) = ChangeMonitor::new();
        dispatch(&event, &monitor.debouncer, &monitor.tx);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(
            first,
            ChangeEvent {
                kind: ChangeKind::Deleted,
                path: PathBuf::from("/data/old.txt")
            }
        );
        assert_eq!(
            second,
            ChangeEvent {
                kind: ChangeKind::Renamed,
                path: PathBuf::from("/data/new.txt")
            }
        );
        assert!(rx.try_recv().is_err(), "rename must yield exactly two events");
    }

    #[test]
    fn rename_halves_map_to_delete_and_renamed() {
        let from = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(PathBuf::from("/data/old.txt"));
        let to = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(PathBuf::from("/data/new.txt"));

        let (monitor, rx) = ChangeMonitor::new();
        dispatch(&from, &monitor.debouncer, &monitor.tx);
        dispatch(&to, &monitor.debouncer, &monitor.tx);

        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Deleted);
        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Renamed);
    }

    #[test]
    fn burst_of_events_for_one_path_is_dispatched_once() {
        let event = notify::Event::new(EventKind::Modify(ModifyKind::Data(
            notify::event::DataChange::Content,
        )))
        .add_path(PathBuf::from("/data/busy.txt"));

        let (monitor, rx) = ChangeMonitor::new();
        dispatch(&event, &monitor.debouncer, &monitor.tx);
        dispatch(&event, &monitor.debouncer, &monitor.tx);
        dispatch(&event, &monitor.debouncer, &monitor.tx);

        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Modified);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn monitor_lifecycle_flags() {
        let (mut monitor, _rx) = ChangeMonitor::new();
        assert!(!monitor.is_active());

        let dir = tempfile::tempdir().unwrap();
        monitor.start(&[dir.path().to_path_buf()]);
        assert!(monitor.is_active());

        // Starting again while active is a warning-level no-op.
        monitor.start(&[dir.path().to_path_buf()]);
        assert!(monitor.is_active());

        monitor.stop();
        assert!(!monitor.is_active());
    }

    fn wait_for<F>(rx: &Receiver<ChangeEvent>, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&ChangeEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(event) = rx.recv_timeout(Duration::from_millis(100)) {
                if pred(&event) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn watcher_reports_file_creation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut monitor, rx) = ChangeMonitor::new();
        monitor.start(&[dir.path().to_path_buf()]);

        fs::write(dir.path().join("watched.txt"), "hello").unwrap();

        let found = wait_for(&rx, Duration::from_secs(5), |event| {
            event.path.ends_with("watched.txt") && event.kind != ChangeKind::Deleted
        });
        monitor.stop();
        assert!(found, "watcher should report the created file");
    }

    #[test]
    fn watcher_reports_file_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doomed.txt");
        fs::write(&file, "bye").unwrap();

        let (mut monitor, rx) = ChangeMonitor::new();
        monitor.start(&[dir.path().to_path_buf()]);

        // Give the watcher time to establish before mutating the tree.
        std::thread::sleep(Duration::from_millis(600));
        fs::remove_file(&file).unwrap();

        let found = wait_for(&rx, Duration::from_secs(5), |event| {
            event.path.ends_with("doomed.txt") && event.kind == ChangeKind::Deleted
        });
        monitor.stop();
        assert!(found, "watcher should report the deleted file");
    }
}
