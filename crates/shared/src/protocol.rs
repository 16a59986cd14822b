use serde::{Deserialize, Serialize};

use crate::domain::{Backup, BackupType};

pub const LIST_BACKUPS_ROUTE: &str = "/backups/list";
pub const CREATE_BACKUP_ROUTE: &str = "/backups/create";
pub const RESTORE_BACKUP_ROUTE: &str = "/backups/restore";
pub const BACKUPS_ROUTE: &str = "/backups";
pub const API_KEY_HEADER: &str = "x-api-key";

/// A single listing item. The service reports either bare names or records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackupEntry {
    Name(String),
    Record {
        name: String,
        #[serde(default)]
        size: Option<String>,
    },
}

impl BackupEntry {
    pub fn into_backup(self) -> Backup {
        match self {
            Self::Name(name) => Backup::from_name(name),
            Self::Record { name, size } => Backup::with_size(name, size),
        }
    }
}

impl From<&str> for BackupEntry {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListBackupsResponse {
    #[serde(default)]
    pub backups: Vec<BackupEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBackupRequest {
    pub backup_type: BackupType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBackupResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub backup_name: Option<String>,
}

impl CreateBackupResponse {
    /// Name reported by the service, falling back to the tool output line
    /// `... created backup '<name>' ...`.
    pub fn resolved_backup_name(&self) -> Option<String> {
        if let Some(name) = &self.backup_name {
            return Some(name.clone());
        }
        self.output
            .as_deref()?
            .lines()
            .find(|line| line.contains("created backup"))
            .and_then(|line| line.split('\'').nth(1))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// Failure body returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackupKind;

    #[test]
    fn listing_accepts_names_and_records() {
        let body = r#"{"backups":["full_20240101",{"name":"inc_20240102","size":"12MiB","date":"2024-01-02"}]}"#;
        let parsed: ListBackupsResponse = serde_json::from_str(body).expect("parse");
        let backups: Vec<_> = parsed
            .backups
            .into_iter()
            .map(BackupEntry::into_backup)
            .collect();
        assert_eq!(backups[0].kind, BackupKind::Full);
        assert_eq!(backups[0].size, None);
        assert_eq!(backups[1].kind, BackupKind::Incremental);
        assert_eq!(backups[1].size.as_deref(), Some("12MiB"));
    }

    #[test]
    fn create_request_uses_wire_type_names() {
        let body = serde_json::to_string(&CreateBackupRequest {
            backup_type: BackupType::Incremental,
        })
        .expect("serialize");
        assert_eq!(body, r#"{"backup_type":"incremental"}"#);
    }

    #[test]
    fn backup_name_falls_back_to_output() {
        let response = CreateBackupResponse {
            status: Some("success".into()),
            output: Some("starting\nsuccessfully created backup 'full_20240301'\n".into()),
            backup_name: None,
        };
        assert_eq!(
            response.resolved_backup_name().as_deref(),
            Some("full_20240301")
        );
        assert_eq!(CreateBackupResponse::default().resolved_backup_name(), None);
    }

    #[test]
    fn error_body_message_handles_structured_detail() {
        let text: ErrorBody = serde_json::from_str(r#"{"detail":"Backup not found"}"#).expect("parse");
        assert_eq!(text.message(), "Backup not found");
        let structured: ErrorBody =
            serde_json::from_str(r#"{"detail":[{"msg":"field required"}]}"#).expect("parse");
        assert!(structured.message().contains("field required"));
    }
}
