use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::AppError;
use crate::models::directory_record::DirectoryRecord;
use crate::models::file_record::{FileRecord, RiskLevel};

const FILE_COLUMNS: &str = "path, name, parent_path, extension, size_bytes, created_at, modified_at, scanned_at, risk_level, risk_reason";
const DIRECTORY_COLUMNS: &str = "path, name, parent_path, total_size_bytes, file_count, last_modified, risk_level, risk_reason, main_file_types";

fn map_file_row(row: &Row) -> rusqlite::Result<FileRecord> {
    let risk: String = row.get(8)?;
    Ok(FileRecord {
        path: row.get(0)?,
        name: row.get(1)?,
        parent_path: row.get(2)?,
        extension: row.get(3)?,
        size_bytes: row.get(4)?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
        scanned_at: row.get(7)?,
        risk_level: risk.parse::<RiskLevel>().unwrap_or(RiskLevel::Safe),
        risk_reason: row.get(9)?,
    })
}

fn map_directory_row(row: &Row) -> rusqlite::Result<DirectoryRecord> {
    let risk: String = row.get(6)?;
    Ok(DirectoryRecord {
        path: row.get(0)?,
        name: row.get(1)?,
        parent_path: row.get(2)?,
        total_size_bytes: row.get(3)?,
        file_count: row.get(4)?,
        last_modified: row.get(5)?,
        risk_level: risk.parse::<RiskLevel>().unwrap_or(RiskLevel::Safe),
        risk_reason: row.get(7)?,
        main_file_types: row.get(8)?,
    })
}

pub fn insert_files(conn: &Connection, files: &[FileRecord]) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO files (path, name, parent_path, extension, size_bytes, created_at, modified_at, scanned_at, risk_level, risk_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for file in files {
            stmt.execute(params![
                file.path,
                file.name,
                file.parent_path,
                file.extension,
                file.size_bytes,
                file.created_at,
                file.modified_at,
                file.scanned_at,
                file.risk_level.to_string(),
                file.risk_reason,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn upsert_file(conn: &Connection, file: &FileRecord) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR REPLACE INTO files (path, name, parent_path, extension, size_bytes, created_at, modified_at, scanned_at, risk_level, risk_reason)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            file.path,
            file.name,
            file.parent_path,
            file.extension,
            file.size_bytes,
            file.created_at,
            file.modified_at,
            file.scanned_at,
            file.risk_level.to_string(),
            file.risk_reason,
        ],
    )?;
    Ok(())
}

pub fn delete_file_by_path(conn: &Connection, path: &str) -> Result<usize, AppError> {
    let count = conn.execute("DELETE FROM files WHERE path = ?1", params![path])?;
    Ok(count)
}

pub fn get_file_by_path(conn: &Connection, path: &str) -> Result<Option<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"
    ))?;
    let record = stmt.query_row(params![path], map_file_row).optional()?;
    Ok(record)
}

pub fn files_in_directory(
    conn: &Connection,
    directory_path: &str,
) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE parent_path = ?1 ORDER BY size_bytes DESC"
    ))?;
    let records = stmt
        .query_map(params![directory_path], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn largest_files(conn: &Connection, count: i64) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY size_bytes DESC LIMIT ?1"
    ))?;
    let records = stmt
        .query_map(params![count], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn recently_modified_files(conn: &Connection, count: i64) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY modified_at DESC LIMIT ?1"
    ))?;
    let records = stmt
        .query_map(params![count], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn files_by_size(
    conn: &Connection,
    skip: i64,
    take: i64,
) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY size_bytes DESC LIMIT ?2 OFFSET ?1"
    ))?;
    let records = stmt
        .query_map(params![skip, take], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn files_by_date(
    conn: &Connection,
    skip: i64,
    take: i64,
) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files ORDER BY modified_at DESC LIMIT ?2 OFFSET ?1"
    ))?;
    let records = stmt
        .query_map(params![skip, take], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn total_file_count(conn: &Connection) -> Result<i64, AppError> {
    let count = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
    Ok(count)
}

pub fn total_size_bytes(conn: &Connection) -> Result<i64, AppError> {
    let sum = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM files",
        [],
        |row| row.get(0),
    )?;
    Ok(sum)
}

/// Files at least `min_size_bytes` large whose last modification is at least
/// `min_age_days` before `now`. Files without a modified time never qualify.
pub fn large_old_files(
    conn: &Connection,
    min_size_bytes: i64,
    min_age_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<FileRecord>, AppError> {
    let cutoff = now - Duration::days(min_age_days);
    let mut stmt = conn.prepare(&format!(
        "SELECT {FILE_COLUMNS} FROM files
         WHERE size_bytes >= ?1 AND modified_at IS NOT NULL AND modified_at <= ?2
         ORDER BY size_bytes DESC"
    ))?;
    let records = stmt
        .query_map(params![min_size_bytes, cutoff], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn insert_directories(
    conn: &Connection,
    directories: &[DirectoryRecord],
) -> Result<(), AppError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO directories (path, name, parent_path, total_size_bytes, file_count, last_modified, risk_level, risk_reason, main_file_types)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for dir in directories {
            stmt.execute(params![
                dir.path,
                dir.name,
                dir.parent_path,
                dir.total_size_bytes,
                dir.file_count,
                dir.last_modified,
                dir.risk_level.to_string(),
                dir.risk_reason,
                dir.main_file_types,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn get_directory_by_path(
    conn: &Connection,
    path: &str,
) -> Result<Option<DirectoryRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE path = ?1"
    ))?;
    let record = stmt.query_row(params![path], map_directory_row).optional()?;
    Ok(record)
}

pub fn subdirectories_of(
    conn: &Connection,
    parent_path: &str,
) -> Result<Vec<DirectoryRecord>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE parent_path = ?1 ORDER BY total_size_bytes DESC"
    ))?;
    let records = stmt
        .query_map(params![parent_path], map_directory_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

/// Largest directories, optionally restricted to paths under `root_prefix`.
pub fn top_directories(
    conn: &Connection,
    count: i64,
    root_prefix: Option<&str>,
) -> Result<Vec<DirectoryRecord>, AppError> {
    let records = match root_prefix {
        Some(prefix) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DIRECTORY_COLUMNS} FROM directories WHERE path LIKE ?1 || '%' ORDER BY total_size_bytes DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![prefix, count], map_directory_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DIRECTORY_COLUMNS} FROM directories ORDER BY total_size_bytes DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![count], map_directory_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        }
    };
    Ok(records)
}

pub fn all_files(conn: &Connection) -> Result<Vec<FileRecord>, AppError> {
    let mut stmt = conn.prepare(&format!("SELECT {FILE_COLUMNS} FROM files"))?;
    let records = stmt
        .query_map([], map_file_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn clear_all(conn: &Connection) -> Result<(), AppError> {
    conn.execute("DELETE FROM files", [])?;
    conn.execute("DELETE FROM directories", [])?;
    Ok(())
}

pub fn clear_directories(conn: &Connection) -> Result<(), AppError> {
    conn.execute("DELETE FROM directories", [])?;
    Ok(())
}
