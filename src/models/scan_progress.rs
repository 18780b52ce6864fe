use std::time::Duration;

use serde::Serialize;

/// Point-in-time snapshot of a running scan. Ephemeral; never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanProgress {
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub current_path: String,
    /// 0..=100, non-decreasing across one scan; 100 only on the final snapshot.
    pub percent_complete: f64,
    pub elapsed: Duration,
    /// Zero when the scan rate is zero or negative.
    pub remaining: Duration,
    pub files_per_second: f64,
    pub estimated_total_files: u64,
    pub is_complete: bool,
    pub error: Option<String>,
}
