use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::models::file_record::RiskLevel;
use crate::models::risk::RiskConfig;

const DEFAULT_EXPLANATION: &str = "User data or common file type.";

/// Classifies paths by deletion risk from an ordered rule list. Rules are
/// evaluated in configured order and the first match wins; path rules are
/// checked before extension rules, and directories never match extension
/// rules.
pub struct RiskEngine {
    config: RwLock<RiskConfig>,
    config_path: Option<PathBuf>,
}

impl RiskEngine {
    /// Loads the rule set from the platform config directory, falling back to
    /// (and persisting) the built-in defaults when the resource is missing or
    /// unreadable.
    pub fn new() -> Self {
        let config_path = directories::ProjectDirs::from("", "", "spacelens")
            .map(|dirs| dirs.config_dir().join("risk_config.json"));
        match config_path {
            Some(path) => Self::with_config_path(path),
            None => {
                tracing::warn!("could not resolve config directory; risk config will not persist");
                Self::from_config(RiskConfig::default())
            }
        }
    }

    pub fn with_config_path(path: PathBuf) -> Self {
        let config = load_or_default(&path);
        RiskEngine {
            config: RwLock::new(config),
            config_path: Some(path),
        }
    }

    /// In-memory engine; nothing is read from or written to disk.
    pub fn from_config(config: RiskConfig) -> Self {
        RiskEngine {
            config: RwLock::new(config),
            config_path: None,
        }
    }

    pub fn classify(&self, path: &str, is_directory: bool) -> (RiskLevel, String) {
        let config = self
            .config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let path_lower = path.to_lowercase();

        // Path rules are more specific, so they win over extension rules.
        for rule in config.rules.iter().filter(|r| !r.is_extension) {
            if path_lower.contains(&rule.pattern.to_lowercase()) {
                return (rule.level, rule.explanation.clone());
            }
        }

        if !is_directory {
            if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
                let ext = ext.to_lowercase();
                for rule in config.rules.iter().filter(|r| r.is_extension) {
                    if ext == rule.pattern.trim_start_matches('.').to_lowercase() {
                        return (rule.level, rule.explanation.clone());
                    }
                }
            }
        }

        (RiskLevel::Safe, DEFAULT_EXPLANATION.to_string())
    }

    pub fn config(&self) -> RiskConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swaps in a new config for subsequent classifications and persists it.
    /// Already-classified records are not revisited.
    pub fn update_config(&self, config: RiskConfig) {
        if let Some(path) = &self.config_path {
            save_config(path, &config);
        }
        let mut guard = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = config;
    }

    /// Human-facing category label for an extension; display only, not risk.
    pub fn category(extension: &str) -> &'static str {
        match extension.to_lowercase().trim_start_matches('.') {
            "mp4" | "mkv" | "avi" | "mov" => "Video",
            "mp3" | "wav" | "flac" | "m4a" => "Audio",
            "jpg" | "jpeg" | "png" | "gif" | "bmp" => "Image",
            "zip" | "rar" | "7z" | "tar" | "gz" => "Archive",
            "exe" | "msi" | "bat" | "sh" => "Executable",
            "log" | "txt" | "md" => "Document/Log",
            "pdf" | "doc" | "docx" | "xls" | "xlsx" => "Office",
            "dll" | "sys" | "bin" => "System",
            _ => "Other",
        }
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn load_or_default(path: &Path) -> RiskConfig {
    match fs::read_to_string(path) {
        Ok(text) => match serde_json::from_str::<RiskConfig>(&text) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("risk config at {} is corrupt ({e}); using defaults", path.display());
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("could not read risk config {}: {e}", path.display());
        }
    }

    let config = RiskConfig::default();
    save_config(path, &config);
    config
}

fn save_config(path: &Path, config: &RiskConfig) {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
        fs::write(path, json)
    };
    if let Err(e) = write() {
        tracing::warn!("could not persist risk config {}: {e}", path.display());
    }
}
