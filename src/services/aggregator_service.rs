use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::models::directory_record::DirectoryRecord;
use crate::models::file_record::{FileRecord, RiskLevel};
use crate::services::risk_service::RiskEngine;

struct DirAccumulator {
    path: String,
    name: String,
    parent_path: String,
    total_size_bytes: i64,
    file_count: i64,
    last_modified: Option<DateTime<Utc>>,
    risk: (RiskLevel, String),
    ext_counts: HashMap<String, i64>,
}

impl DirAccumulator {
    fn new(dir: &Path, risk_engine: &RiskEngine) -> Self {
        let path = dir.to_string_lossy().to_string();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.clone());
        let parent_path = dir
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let risk = risk_engine.classify(&path, true);
        DirAccumulator {
            path,
            name,
            parent_path,
            total_size_bytes: 0,
            file_count: 0,
            last_modified: None,
            risk,
            ext_counts: HashMap::new(),
        }
    }

    fn add(&mut self, file: &FileRecord) {
        self.total_size_bytes += file.size_bytes;
        self.file_count += 1;
        if file.modified_at > self.last_modified {
            self.last_modified = file.modified_at;
        }
        if let Some(ext) = &file.extension {
            *self.ext_counts.entry(ext.clone()).or_default() += 1;
        }
    }

    fn finish(self) -> DirectoryRecord {
        let mut counted: Vec<(String, i64)> = self.ext_counts.into_iter().collect();
        counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let main_file_types = counted
            .iter()
            .take(3)
            .map(|(ext, _)| ext.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        DirectoryRecord {
            path: self.path,
            name: self.name,
            parent_path: self.parent_path,
            total_size_bytes: self.total_size_bytes,
            file_count: self.file_count,
            last_modified: self.last_modified,
            risk_level: self.risk.0,
            risk_reason: self.risk.1,
            main_file_types,
        }
    }
}

/// Rolls a flat set of file records up into one record per ancestor
/// directory, all the way to the volume root. Each file contributes its size,
/// count and modified time to every directory on its parent chain, so totals
/// are exact for whole subtrees without a second pass. Directories are
/// risk-classified once, on their own path, when first seen.
pub fn aggregate(files: &[FileRecord], risk_engine: &RiskEngine) -> Vec<DirectoryRecord> {
    let mut dirs: HashMap<String, DirAccumulator> = HashMap::new();

    for file in files {
        if file.parent_path.is_empty() {
            continue;
        }
        let mut current: Option<&Path> = Some(Path::new(file.parent_path.as_str()));
        while let Some(dir) = current {
            let key = dir.to_string_lossy();
            if key.is_empty() {
                break;
            }
            dirs.entry(key.to_string())
                .or_insert_with(|| DirAccumulator::new(dir, risk_engine))
                .add(file);
            current = dir.parent();
        }
    }

    let mut records: Vec<DirectoryRecord> = dirs.into_values().map(DirAccumulator::finish).collect();
    records.sort_by(|a, b| a.path.cmp(&b.path));
    records
}
