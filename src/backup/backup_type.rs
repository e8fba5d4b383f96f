use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::backup::result_error::error::Error;

/// Tag sent with every upload so the collector knows what it receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum BackupType {
    #[serde(rename = "backup_database")]
    #[display("backup_database")]
    Database,
    #[serde(rename = "backup_storage")]
    #[display("backup_storage")]
    Storage,
}

impl BackupType {
    pub const ALL: [BackupType; 2] = [BackupType::Database, BackupType::Storage];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Database => "backup_database",
            BackupType::Storage => "backup_storage",
        }
    }
}

impl FromStr for BackupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackupType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Config(format!("Backup type not found: {s:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_type_wire_values() {
        assert_eq!(BackupType::Database.to_string(), "backup_database");
        assert_eq!(BackupType::Storage.as_str(), "backup_storage");
        assert_eq!(
            serde_json::to_string(&BackupType::Storage).unwrap(),
            "\"backup_storage\""
        );
    }

    #[test]
    fn test_backup_type_from_str() {
        assert_eq!(
            "backup_database".parse::<BackupType>().unwrap(),
            BackupType::Database
        );
        assert!("backup_everything".parse::<BackupType>().is_err());
    }
}
