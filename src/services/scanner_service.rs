use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::models::file_record::{FileRecord, RiskLevel};
use crate::models::scan_progress::ScanProgress;

/// Emit a progress snapshot at most once per this many files.
const PROGRESS_INTERVAL: u64 = 500;
/// Seed for the dynamic total-file estimate; grown as the scan outpaces it.
const INITIAL_ESTIMATE: u64 = 100_000;

/// Result of one scan invocation. `files` holds everything collected, even
/// when the scan was cancelled partway through.
pub struct ScanOutcome {
    pub files: Vec<FileRecord>,
    pub stats: ScanStats,
}

#[derive(Debug, Clone)]
pub struct ScanStats {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl ScanStats {
    /// Terminal snapshot for the scan's progress stream: 100% and complete.
    pub fn completion_snapshot(&self) -> ScanProgress {
        let rate = if self.elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        };
        ScanProgress {
            files_scanned: self.files_scanned,
            bytes_scanned: self.bytes_scanned,
            current_path: String::new(),
            percent_complete: 100.0,
            elapsed: self.elapsed,
            remaining: Duration::ZERO,
            files_per_second: rate,
            estimated_total_files: self.files_scanned,
            is_complete: true,
            error: None,
        }
    }
}

/// Builds a record for a single file, following symlink-free canonicalization
/// the same way the index stores paths. Returns None for directories and for
/// anything that cannot be stat'ed.
pub fn file_record_from_path(path: &Path) -> Option<FileRecord> {
    let metadata = match path.metadata() {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("could not stat {}: {e}", path.display());
            return None;
        }
    };
    if !metadata.is_file() {
        return None;
    }

    let name = path.file_name()?.to_string_lossy().to_string();
    let extension = path.extension().map(|e| e.to_string_lossy().to_lowercase());
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let parent = canonical
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();

    Some(FileRecord {
        path: canonical.to_string_lossy().to_string(),
        name,
        parent_path: parent,
        extension,
        size_bytes: metadata.len() as i64,
        created_at: metadata.created().ok().map(DateTime::<Utc>::from),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        scanned_at: Utc::now(),
        risk_level: RiskLevel::Safe,
        risk_reason: String::new(),
    })
}

/// Walks every root, collecting file records. Direct file children of a
/// directory are recorded before its subdirectories are entered. Per-entry
/// and per-root failures are logged and skipped; the walk itself never fails.
/// Cancellation is checked between entries and between subdirectories and
/// returns whatever was collected so far.
pub fn scan_paths<F>(paths: &[PathBuf], cancel: &AtomicBool, on_progress: F) -> ScanOutcome
where
    F: FnMut(&ScanProgress),
{
    ScanPass::new(cancel, on_progress).run(paths)
}

struct ScanPass<'a, F: FnMut(&ScanProgress)> {
    cancel: &'a AtomicBool,
    on_progress: F,
    tracker: ProgressTracker,
    files: Vec<FileRecord>,
}

impl<'a, F: FnMut(&ScanProgress)> ScanPass<'a, F> {
    fn new(cancel: &'a AtomicBool, on_progress: F) -> Self {
        ScanPass {
            cancel,
            on_progress,
            tracker: ProgressTracker::new(),
            files: Vec::new(),
        }
    }

    fn run(mut self, paths: &[PathBuf]) -> ScanOutcome {
        for path in paths {
            if self.cancelled() {
                break;
            }
            if path.is_dir() {
                self.scan_directory(path);
            } else if path.is_file() {
                if let Some(record) = file_record_from_path(path) {
                    self.push(record);
                }
            } else {
                tracing::error!("scan root is not accessible: {}", path.display());
                let snapshot = self
                    .tracker
                    .error_snapshot(&path.to_string_lossy(), "root path not accessible");
                (self.on_progress)(&snapshot);
            }
        }

        let stats = self.tracker.stats(self.cancelled());
        ScanOutcome {
            files: self.files,
            stats,
        }
    }

    fn scan_directory(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("error accessing directory {}: {e}", dir.display());
                let snapshot = self
                    .tracker
                    .error_snapshot(&dir.to_string_lossy(), &e.to_string());
                (self.on_progress)(&snapshot);
                return;
            }
        };

        // Files in this directory first, subdirectories after.
        let mut subdirs = Vec::new();
        for entry in entries {
            if self.cancelled() {
                return;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    tracing::debug!("skipping {}: {e}", entry.path().display());
                    continue;
                }
            };
            if file_type.is_dir() {
                subdirs.push(entry.path());
            } else if file_type.is_file() {
                if let Some(record) = file_record_from_path(&entry.path()) {
                    self.push(record);
                }
            }
        }

        for subdir in subdirs {
            if self.cancelled() {
                return;
            }
            self.scan_directory(&subdir);
        }
    }

    fn push(&mut self, record: FileRecord) {
        self.tracker.record_file(record.size_bytes);
        if self.tracker.files_scanned % PROGRESS_INTERVAL == 0 {
            let snapshot = self.tracker.snapshot(&record.path);
            (self.on_progress)(&snapshot);
        }
        self.files.push(record);
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Progress state for one scan invocation. Never shared between scans, so
/// sequential or concurrent scans cannot leak estimates or percentages into
/// each other.
struct ProgressTracker {
    started: Instant,
    files_scanned: u64,
    bytes_scanned: u64,
    estimate: u64,
    last_percent: f64,
}

impl ProgressTracker {
    fn new() -> Self {
        ProgressTracker {
            started: Instant::now(),
            files_scanned: 0,
            bytes_scanned: 0,
            estimate: INITIAL_ESTIMATE,
            last_percent: 0.0,
        }
    }

    fn record_file(&mut self, size_bytes: i64) {
        self.files_scanned += 1;
        self.bytes_scanned += size_bytes.max(0) as u64;
        if self.files_scanned >= self.estimate {
            self.estimate = grown_estimate(self.files_scanned);
        }
    }

    fn snapshot(&mut self, current_path: &str) -> ScanProgress {
        let elapsed = self.started.elapsed();
        let rate = if elapsed.as_secs_f64() > 0.0 {
            self.files_scanned as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        // Never regress a previously reported percentage, even though the
        // estimate can jump upward mid-scan.
        let raw = (self.files_scanned as f64 * 100.0 / self.estimate as f64).min(99.0);
        let percent = raw.max(self.last_percent);
        self.last_percent = percent;
        let remaining = if rate > 0.0 {
            Duration::from_secs_f64((self.estimate - self.files_scanned) as f64 / rate)
        } else {
            Duration::ZERO
        };

        ScanProgress {
            files_scanned: self.files_scanned,
            bytes_scanned: self.bytes_scanned,
            current_path: current_path.to_string(),
            percent_complete: percent,
            elapsed,
            remaining,
            files_per_second: rate,
            estimated_total_files: self.estimate,
            is_complete: false,
            error: None,
        }
    }

    fn error_snapshot(&mut self, current_path: &str, message: &str) -> ScanProgress {
        let mut snapshot = self.snapshot(current_path);
        snapshot.error = Some(message.to_string());
        snapshot
    }

    fn stats(&self, cancelled: bool) -> ScanStats {
        ScanStats {
            files_scanned: self.files_scanned,
            bytes_scanned: self.bytes_scanned,
            elapsed: self.started.elapsed(),
            cancelled,
        }
    }
}

fn grown_estimate(count: u64) -> u64 {
    (count + 1_000).max((count as f64 * 1.3) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn no_progress(_: &ScanProgress) {}

    fn write_file(path: &Path, len: usize) {
        File::create(path).unwrap().write_all(&vec![b'x'; len]).unwrap();
    }

    fn canonical(path: &Path) -> String {
        path.canonicalize().unwrap().to_string_lossy().to_string()
    }

    #[test]
    fn scans_files_before_recursing() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub/nested")).unwrap();
        write_file(&dir.path().join("a.txt"), 3);
        write_file(&dir.path().join("sub/b.txt"), 5);
        write_file(&dir.path().join("sub/nested/c.txt"), 7);

        let cancel = AtomicBool::new(false);
        let outcome = scan_paths(&[dir.path().to_path_buf()], &cancel, no_progress);

        assert_eq!(outcome.files.len(), 3);
        assert_eq!(outcome.stats.files_scanned, 3);
        assert_eq!(outcome.stats.bytes_scanned, 15);
        assert!(!outcome.stats.cancelled);

        // Direct children come before anything below a subdirectory.
        assert_eq!(outcome.files[0].name, "a.txt");
        assert_eq!(outcome.files[1].name, "b.txt");
        assert_eq!(outcome.files[2].name, "c.txt");
        assert_eq!(outcome.files[0].path, canonical(&dir.path().join("a.txt")));
        assert_eq!(
            outcome.files[1].parent_path,
            canonical(&dir.path().join("sub"))
        );
    }

    #[test]
    fn single_file_root_yields_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lone.log");
        write_file(&file, 9);

        let cancel = AtomicBool::new(false);
        let outcome = scan_paths(&[file.clone()], &cancel, no_progress);

        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].name, "lone.log");
        assert_eq!(outcome.files[0].extension.as_deref(), Some("log"));
        assert_eq!(outcome.files[0].size_bytes, 9);
    }

    #[test]
    fn missing_root_reports_error_and_scan_continues() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("real.txt"), 1);

        let mut snapshots = Vec::new();
        let cancel = AtomicBool::new(false);
        let outcome = scan_paths(
            &[
                PathBuf::from("/nonexistent/spacelens_missing_root"),
                dir.path().to_path_buf(),
            ],
            &cancel,
            |p| snapshots.push(p.clone()),
        );

        assert_eq!(outcome.files.len(), 1);
        assert!(snapshots.iter().any(|s| s.error.is_some()));
    }

    #[test]
    fn cancellation_returns_partial_results_without_error() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir.path().join("a.txt"), 1);
        write_file(&dir.path().join("b.txt"), 1);

        let cancel = AtomicBool::new(true);
        let outcome = scan_paths(&[dir.path().to_path_buf()], &cancel, no_progress);

        assert!(outcome.files.is_empty());
        assert!(outcome.stats.cancelled);
    }

    #[test]
    fn progress_emitted_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..1200 {
            write_file(&dir.path().join(format!("f{i}.dat")), 1);
        }

        let mut snapshots = Vec::new();
        let cancel = AtomicBool::new(false);
        let outcome = scan_paths(&[dir.path().to_path_buf()], &cancel, |p| {
            snapshots.push(p.clone())
        });

        assert_eq!(outcome.stats.files_scanned, 1200);
        assert_eq!(snapshots.len(), 2); // at 500 and at 1000
        assert_eq!(snapshots[0].files_scanned, 500);
        assert_eq!(snapshots[1].files_scanned, 1000);
        assert!(snapshots[1].percent_complete >= snapshots[0].percent_complete);
    }

    #[test]
    fn estimate_grows_when_count_reaches_it() {
        let mut tracker = ProgressTracker::new();
        tracker.estimate = 100; // small seed to keep the test fast

        for _ in 0..100 {
            tracker.record_file(1);
        }
        // 100 >= 100, so the estimate must have grown past the count.
        assert!(tracker.estimate > 100);
        assert_eq!(tracker.estimate, 1_100); // max(100 + 1000, 130)
    }

    #[test]
    fn estimate_growth_uses_larger_of_both_rules() {
        assert_eq!(grown_estimate(100), 1_100); // +1000 dominates
        assert_eq!(grown_estimate(100_000), 130_000); // *1.3 dominates
    }

    #[test]
    fn percent_never_regresses_when_estimate_jumps() {
        let mut tracker = ProgressTracker::new();
        tracker.estimate = 100;

        for _ in 0..99 {
            tracker.record_file(1);
        }
        let before = tracker.snapshot("a").percent_complete;
        assert!(before > 98.0);

        // Crossing the estimate grows it, which would drop the raw percent.
        tracker.record_file(1);
        let after = tracker.snapshot("b").percent_complete;
        assert!(after >= before);
    }

    #[test]
    fn percent_is_capped_below_one_hundred_while_running() {
        let mut tracker = ProgressTracker::new();
        tracker.estimate = 10;
        for _ in 0..9 {
            tracker.record_file(1);
        }
        assert!(tracker.snapshot("x").percent_complete <= 99.0);
    }

    #[test]
    fn remaining_time_is_zero_without_rate() {
        let mut tracker = ProgressTracker::new();
        let snapshot = tracker.snapshot("x");
        assert_eq!(snapshot.remaining, Duration::ZERO);
        assert_eq!(snapshot.files_per_second, 0.0);
    }

    #[test]
    fn completion_snapshot_reports_one_hundred_percent() {
        let stats = ScanStats {
            files_scanned: 42,
            bytes_scanned: 1000,
            elapsed: Duration::from_secs(2),
            cancelled: false,
        };
        let snapshot = stats.completion_snapshot();
        assert_eq!(snapshot.percent_complete, 100.0);
        assert!(snapshot.is_complete);
        assert_eq!(snapshot.files_per_second, 21.0);
    }
}
