//! Validation functions for configuration values.

use chrono::Utc;
use std::path::Path;
use url::Url;
use validator::ValidationError;

pub fn validate_cron_str<S: AsRef<str>>(cron: S) -> Result<(), ValidationError> {
    let cron = cron.as_ref();
    if cron_parser::parse(cron, &Utc::now()).is_err() {
        return Err(ValidationError::new("InvalidCron")
            .with_message(format!("Invalid cron string: {cron:?}").into()));
    }

    Ok(())
}

/// An empty URL is reported as a missing value elsewhere, anything else has
/// to parse. The scheme is enforced by the uploader.
pub fn validate_backup_url<S: AsRef<str>>(url: S) -> Result<(), ValidationError> {
    let url = url.as_ref();
    if url.is_empty() {
        return Ok(());
    }

    Url::parse(url).map(|_| ()).map_err(|e| {
        ValidationError::new("InvalidUrl").with_message(format!("Invalid backup_url: {e}").into())
    })
}

pub fn validate_not_a_file<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.is_file() {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} is not a directory", dir).into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_cron_str() {
        assert!(validate_cron_str("0 2 * * *").is_ok());
        assert!(validate_cron_str("not a cron").is_err());
    }

    #[test]
    fn test_validate_backup_url() {
        assert!(validate_backup_url("").is_ok());
        assert!(validate_backup_url("https://collector.example.com/api/backup").is_ok());
        assert!(validate_backup_url("http://insecure.example.com").is_ok());
        assert!(validate_backup_url("not a url").is_err());
    }

    #[test]
    fn test_validate_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, "x").unwrap();

        assert!(validate_not_a_file(temp_dir.path()).is_ok());
        assert!(validate_not_a_file(temp_dir.path().join("missing")).is_ok());
        assert!(validate_not_a_file(&file).is_err());
    }
}
