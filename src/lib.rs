//! Indexes local filesystem trees into SQLite, rolls file metadata up into
//! per-directory aggregates, classifies paths by deletion risk, and keeps the
//! index live from filesystem change notifications.

pub mod data;
pub mod error;
pub mod models;
pub mod services;

pub use error::AppError;
pub use models::directory_record::DirectoryRecord;
pub use models::file_record::{FileRecord, RiskLevel};
pub use models::risk::{RiskConfig, RiskRule};
pub use models::scan_progress::ScanProgress;
pub use services::index_service::{IndexService, IndexState, ScanSummary};
pub use services::monitor_service::{ChangeEvent, ChangeKind, ChangeMonitor};
pub use services::risk_service::RiskEngine;
