use serde::{Deserialize, Serialize};

use crate::models::file_record::RiskLevel;

/// One classification rule. `pattern` is either a path fragment or a file
/// extension depending on `is_extension`; rules are evaluated in list order
/// and the first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskRule {
    pub pattern: String,
    pub level: RiskLevel,
    pub explanation: String,
    pub is_extension: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub rules: Vec<RiskRule>,
    #[serde(default = "default_large_file_threshold")]
    pub large_file_threshold_bytes: i64,
    #[serde(default = "default_old_file_threshold")]
    pub old_file_threshold_days: i64,
}

fn default_large_file_threshold() -> i64 {
    500 * 1024 * 1024
}

fn default_old_file_threshold() -> i64 {
    180
}

impl Default for RiskConfig {
    fn default() -> Self {
        fn path(pattern: &str, level: RiskLevel, explanation: &str) -> RiskRule {
            RiskRule {
                pattern: pattern.to_string(),
                level,
                explanation: explanation.to_string(),
                is_extension: false,
            }
        }
        fn ext(pattern: &str, level: RiskLevel, explanation: &str) -> RiskRule {
            RiskRule {
                pattern: pattern.to_string(),
                level,
                explanation: explanation.to_string(),
                is_extension: true,
            }
        }

        RiskConfig {
            rules: vec![
                path(
                    "C:\\Windows",
                    RiskLevel::HighRisk,
                    "System directory, deletion will break Windows.",
                ),
                path(
                    "C:\\Program Files",
                    RiskLevel::HighRisk,
                    "Installed applications, should be uninstalled via Settings.",
                ),
                path(
                    "/System",
                    RiskLevel::HighRisk,
                    "Operating system files, deletion will break the system.",
                ),
                path(
                    "/usr",
                    RiskLevel::HighRisk,
                    "System programs and libraries, managed by the OS.",
                ),
                ext(
                    ".sys",
                    RiskLevel::HighRisk,
                    "System driver file.",
                ),
                ext(
                    ".dll",
                    RiskLevel::HighRisk,
                    "Application library, required for programs to run.",
                ),
                ext(
                    ".dylib",
                    RiskLevel::HighRisk,
                    "Application library, required for programs to run.",
                ),
                path(
                    "AppData",
                    RiskLevel::Review,
                    "Application data and settings. Deleting may reset app state.",
                ),
                path(
                    "/Library/Application Support",
                    RiskLevel::Review,
                    "Application data and settings. Deleting may reset app state.",
                ),
                ext(
                    ".exe",
                    RiskLevel::Review,
                    "Executable program. Ensure you don't need this app.",
                ),
                path(
                    "Temp",
                    RiskLevel::Safe,
                    "Temporary files, usually safe to delete.",
                ),
                path(
                    "/tmp",
                    RiskLevel::Safe,
                    "Temporary files, usually safe to delete.",
                ),
                ext(
                    ".log",
                    RiskLevel::Safe,
                    "Log file, typically safe to delete.",
                ),
            ],
            large_file_threshold_bytes: default_large_file_threshold(),
            old_file_threshold_days: default_old_file_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_thresholds() {
        let config = RiskConfig::default();
        assert_eq!(config.large_file_threshold_bytes, 500 * 1024 * 1024);
        assert_eq!(config.old_file_threshold_days, 180);
        assert!(!config.rules.is_empty());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = RiskConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RiskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn missing_thresholds_fall_back_to_defaults() {
        let parsed: RiskConfig = serde_json::from_str(r#"{"rules": []}"#).unwrap();
        assert_eq!(parsed.large_file_threshold_bytes, 500 * 1024 * 1024);
        assert_eq!(parsed.old_file_threshold_days, 180);
    }
}
