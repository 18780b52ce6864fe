use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;

use crate::data::repository;
use crate::error::AppError;
use crate::models::file_record::FileRecord;
use crate::models::scan_progress::ScanProgress;
use crate::services::aggregator_service;
use crate::services::monitor_service::{ChangeEvent, ChangeKind, ChangeMonitor};
use crate::services::risk_service::RiskEngine;
use crate::services::scanner_service::{self, file_record_from_path, ScanOutcome};

const FILE_BATCH_SIZE: usize = 2_000;
const DIRECTORY_BATCH_SIZE: usize = 1_000;
/// Wait before re-statting a changed path so a file is not read mid-write.
const SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Idle,
    Scanning,
    Persisting,
    Aggregating,
    Monitoring,
}

#[derive(Debug, Clone)]
pub struct ScanSummary {
    pub files_indexed: usize,
    pub directories_indexed: usize,
    pub cancelled: bool,
}

/// Coordinates the full index lifecycle: a clearing initial scan, batched
/// persistence, directory aggregation, and then live single-record updates
/// fed by the change monitor. All live updates are applied by one consumer
/// thread, so concurrent filesystem events never interleave in the store.
pub struct IndexService {
    db: Arc<Mutex<Connection>>,
    risk: Arc<RiskEngine>,
    state: Arc<Mutex<IndexState>>,
    cancel: Arc<AtomicBool>,
    monitor: Mutex<ChangeMonitor>,
    events: Mutex<Option<Receiver<ChangeEvent>>>,
}

impl IndexService {
    pub fn new(db: Arc<Mutex<Connection>>, risk: Arc<RiskEngine>) -> Self {
        let (monitor, events) = ChangeMonitor::new();
        IndexService {
            db,
            risk,
            state: Arc::new(Mutex::new(IndexState::Idle)),
            cancel: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(monitor),
            events: Mutex::new(Some(events)),
        }
    }

    pub fn state(&self) -> IndexState {
        *lock(&self.state)
    }

    /// Cooperative: stops new units of work; never rolls back written batches.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Clears the store, scans `paths` while forwarding progress, persists
    /// file records in batches, aggregates directories, then switches to live
    /// monitoring of the same roots. Blocking; hosts run it on a background
    /// thread. Store errors propagate and halt the remaining batches; a
    /// cancelled scan keeps whatever was already written.
    pub fn initial_scan<F>(&self, paths: &[PathBuf], mut on_progress: F) -> Result<ScanSummary, AppError>
    where
        F: FnMut(&ScanProgress),
    {
        self.cancel.store(false, Ordering::Relaxed);
        lock(&self.monitor).stop();
        self.set_state(IndexState::Scanning);

        let result = self.run_initial_scan(paths, &mut on_progress);
        if result.is_err() {
            self.set_state(IndexState::Idle);
        }
        result
    }

    fn run_initial_scan<F>(&self, paths: &[PathBuf], on_progress: &mut F) -> Result<ScanSummary, AppError>
    where
        F: FnMut(&ScanProgress),
    {
        tracing::info!("starting initial scan of {} paths", paths.len());
        {
            let conn = self.lock_db();
            repository::clear_all(&conn)?;
        }

        let ScanOutcome { mut files, stats } =
            scanner_service::scan_paths(paths, &self.cancel, |p| on_progress(p));
        let total = files.len();

        self.set_state(IndexState::Persisting);
        let mut files_indexed = 0;
        for batch in files.chunks_mut(FILE_BATCH_SIZE) {
            if self.cancelled() {
                break;
            }
            for record in batch.iter_mut() {
                let (level, reason) = self.risk.classify(&record.path, false);
                record.risk_level = level;
                record.risk_reason = reason;
            }
            {
                let conn = self.lock_db();
                repository::insert_files(&conn, batch)?;
            }
            files_indexed += batch.len();

            on_progress(&ScanProgress {
                files_scanned: total as u64,
                bytes_scanned: stats.bytes_scanned,
                current_path: format!("Saving to database: {files_indexed} / {total}"),
                percent_complete: 99.0,
                elapsed: stats.elapsed,
                remaining: Duration::ZERO,
                files_per_second: 0.0,
                estimated_total_files: total as u64,
                is_complete: false,
                error: None,
            });
        }

        let mut directories_indexed = 0;
        if !self.cancelled() {
            self.set_state(IndexState::Aggregating);
            let directories = aggregator_service::aggregate(&files, &self.risk);
            for batch in directories.chunks(DIRECTORY_BATCH_SIZE) {
                if self.cancelled() {
                    break;
                }
                {
                    let conn = self.lock_db();
                    repository::insert_directories(&conn, batch)?;
                }
                directories_indexed += batch.len();
            }
        }

        on_progress(&stats.completion_snapshot());

        let cancelled = self.cancelled();
        if cancelled {
            tracing::info!("initial scan cancelled; {files_indexed} files persisted");
            self.set_state(IndexState::Idle);
        } else {
            tracing::info!("initial scan completed; total files: {total}");
            self.start_monitoring(paths);
        }

        Ok(ScanSummary {
            files_indexed,
            directories_indexed,
            cancelled,
        })
    }

    /// Starts the change monitor on `paths` and (once) the consumer thread
    /// that applies live updates one at a time, in delivery order.
    pub fn start_monitoring(&self, paths: &[PathBuf]) {
        lock(&self.monitor).start(paths);
        self.spawn_update_worker();
        self.set_state(IndexState::Monitoring);
    }

    pub fn stop_monitoring(&self) {
        lock(&self.monitor).stop();
        let mut state = lock(&self.state);
        if *state == IndexState::Monitoring {
            *state = IndexState::Idle;
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.monitor).is_active()
    }

    /// Files exceeding the configured size threshold whose last modification
    /// is older than the configured age threshold.
    pub fn cleanup_candidates(&self) -> Result<Vec<FileRecord>, AppError> {
        let config = self.risk.config();
        let conn = self.lock_db();
        repository::large_old_files(
            &conn,
            config.large_file_threshold_bytes,
            config.old_file_threshold_days,
            Utc::now(),
        )
    }

    /// Re-rolls directory aggregates from the stored file rows. Live updates
    /// deliberately leave aggregates stale (they touch single file rows only);
    /// this is the on-demand counterpart, never invoked automatically.
    pub fn refresh_aggregates(&self) -> Result<usize, AppError> {
        let files = {
            let conn = self.lock_db();
            repository::all_files(&conn)?
        };
        let directories = aggregator_service::aggregate(&files, &self.risk);
        let conn = self.lock_db();
        repository::clear_directories(&conn)?;
        for batch in directories.chunks(DIRECTORY_BATCH_SIZE) {
            repository::insert_directories(&conn, batch)?;
        }
        Ok(directories.len())
    }

    fn spawn_update_worker(&self) {
        let Some(events) = lock(&self.events).take() else {
            return; // worker already running
        };
        let db = self.db.clone();
        let risk = self.risk.clone();
        thread::spawn(move || {
            // Single writer: events are applied strictly in delivery order.
            // The thread exits when the monitor (and its senders) go away.
            while let Ok(event) = events.recv() {
                apply_change(&db, &risk, &event);
            }
        });
    }

    fn lock_db(&self) -> MutexGuard<'_, Connection> {
        lock(&self.db)
    }

    fn set_state(&self, next: IndexState) {
        *lock(&self.state) = next;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply_change(db: &Mutex<Connection>, risk: &RiskEngine, event: &ChangeEvent) {
    match event.kind {
        ChangeKind::Deleted => {
            let conn = lock(db);
            match repository::delete_file_by_path(&conn, &event.path.to_string_lossy()) {
                Ok(_) => tracing::debug!("removed from index: {}", event.path.display()),
                Err(e) => tracing::warn!("error deleting {}: {e}", event.path.display()),
            }
        }
        ChangeKind::Created | ChangeKind::Modified | ChangeKind::Renamed => {
            thread::sleep(SETTLE_DELAY);
            // Vanished (or directory) paths are silently dropped.
            let Some(mut record) = file_record_from_path(&event.path) else {
                return;
            };
            let (level, reason) = risk.classify(&record.path, false);
            record.risk_level = level;
            record.risk_reason = reason;

            let conn = lock(db);
            match repository::upsert_file(&conn, &record) {
                Ok(()) => tracing::debug!("updated index entry: {}", record.path),
                Err(e) => tracing::warn!("error updating {}: {e}", record.path),
            }
        }
    }
}
