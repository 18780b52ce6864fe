use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::file_record::RiskLevel;

/// Per-directory rollup of every file anywhere below it. Produced in bulk at
/// scan boundaries; live updates do not maintain these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Absolute directory path; unique.
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub total_size_bytes: i64,
    pub file_count: i64,
    /// Most recent modified time among descendant files.
    pub last_modified: Option<DateTime<Utc>>,
    /// Classified on the directory path itself, independent of descendants.
    pub risk_level: RiskLevel,
    pub risk_reason: String,
    /// Comma-separated dominant descendant extensions, e.g. "mp4, jpg, log".
    pub main_file_types: String,
}
