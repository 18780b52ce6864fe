use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How cautious a user should be before deleting a path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Safe,
    Review,
    HighRisk,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Review => write!(f, "review"),
            Self::HighRisk => write!(f, "high_risk"),
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "safe" => Ok(Self::Safe),
            "review" => Ok(Self::Review),
            "high_risk" => Ok(Self::HighRisk),
            _ => Err(format!("unknown risk level: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path; the stable identity of the record.
    pub path: String,
    pub name: String,
    pub parent_path: String,
    /// Lowercase, without the leading dot.
    pub extension: Option<String>,
    pub size_bytes: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    pub scanned_at: DateTime<Utc>,
    pub risk_level: RiskLevel,
    pub risk_reason: String,
}
