use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Substring that marks an artifact as incremental in the service's naming scheme.
const INCREMENTAL_MARKER: &str = "inc";
const NAME_DATE_DIGITS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Incremental,
}

impl BackupKind {
    /// Kind is not reported by the service; it follows the artifact name.
    pub fn from_name(name: &str) -> Self {
        if name.contains(INCREMENTAL_MARKER) {
            Self::Incremental
        } else {
            Self::Full
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

/// Kind requested when asking the service to create a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    #[default]
    Auto,
    Full,
    Incremental,
}

impl BackupType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Full => "full",
            Self::Incremental => "incremental",
        }
    }
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackupType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "full" => Ok(Self::Full),
            "incremental" | "inc" => Ok(Self::Incremental),
            other => Err(format!("unknown backup type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub name: String,
    pub kind: BackupKind,
    /// `None` when the service did not report a size.
    pub size: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Backup {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self::with_size(name, None)
    }

    pub fn with_size(name: impl Into<String>, size: Option<String>) -> Self {
        let name = name.into();
        Self {
            kind: BackupKind::from_name(&name),
            date: date_from_name(&name),
            size,
            name,
        }
    }
}

/// First run of eight digits in `name`, read as `YYYYMMDD`.
pub fn date_from_name(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    let mut run_start = None;
    for (idx, byte) in bytes.iter().enumerate() {
        if !byte.is_ascii_digit() {
            run_start = None;
            continue;
        }
        let start = *run_start.get_or_insert(idx);
        if idx + 1 - start == NAME_DATE_DIGITS {
            return NaiveDate::parse_from_str(&name[start..=idx], "%Y%m%d").ok();
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub retention_days: u32,
    pub auto_backup: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            auto_backup: true,
        }
    }
}

impl Settings {
    /// Shallow merge: fields missing from `patch` keep their current value.
    pub fn merged(self, patch: &SettingsPatch) -> Self {
        Self {
            retention_days: patch.retention_days.unwrap_or(self.retention_days),
            auto_backup: patch.auto_backup.unwrap_or(self.auto_backup),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_backup: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_inc_substring() {
        assert_eq!(BackupKind::from_name("full_2024"), BackupKind::Full);
        assert_eq!(BackupKind::from_name("db_inc_2024"), BackupKind::Incremental);
        // Anything containing the marker counts, even mid-word.
        assert_eq!(BackupKind::from_name("princeton"), BackupKind::Incremental);
    }

    #[test]
    fn date_is_read_from_first_eight_digit_run() {
        assert_eq!(
            date_from_name("full_20240131_db"),
            NaiveDate::from_ymd_opt(2024, 1, 31)
        );
        assert_eq!(date_from_name("inc_2024"), None);
        assert_eq!(date_from_name("full_20241399"), None);
    }

    #[test]
    fn settings_merge_keeps_unspecified_fields() {
        let current = Settings {
            retention_days: 30,
            auto_backup: true,
        };
        let merged = current.merged(&SettingsPatch {
            auto_backup: Some(false),
            ..SettingsPatch::default()
        });
        assert_eq!(
            merged,
            Settings {
                retention_days: 30,
                auto_backup: false
            }
        );
    }

    #[test]
    fn backup_type_parses_wire_names() {
        assert_eq!("auto".parse::<BackupType>(), Ok(BackupType::Auto));
        assert_eq!("Incremental".parse::<BackupType>(), Ok(BackupType::Incremental));
        assert!("weekly".parse::<BackupType>().is_err());
    }
}
