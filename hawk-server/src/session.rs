//! The local session record.
//!
//! The login itself lives in the gateway under the session label; this file
//! only proves that `hawk-server login` completed for the configured account.
//! `run` refuses to start without it unless it may prompt for a login.

use std::path::{Path, PathBuf};

use hawk_sdk::objects::UserProfile;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("session file {path} not found, run `hawk-server login` first")]
    Missing { path: PathBuf },

    #[error("failed to access session file {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("session file {path} is corrupt: {error}")]
    Corrupt {
        path: PathBuf,
        #[source]
        error: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub label: String,
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub authorized_at: OffsetDateTime,
}

impl SessionRecord {
    pub fn new(label: impl Into<String>, user: &UserProfile) -> Self {
        Self {
            label: label.into(),
            user_id: user.id,
            username: user.username.clone(),
            authorized_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Read the record at `path`.
pub async fn read_record(path: &Path) -> Result<SessionRecord, SessionFileError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            return Err(SessionFileError::Missing {
                path: path.to_owned(),
            });
        }
        Err(error) => {
            return Err(SessionFileError::Io {
                path: path.to_owned(),
                error,
            });
        }
    };
    serde_json::from_str(&contents).map_err(|error| SessionFileError::Corrupt {
        path: path.to_owned(),
        error,
    })
}

/// Write `record` to `path` atomically: temp file, then rename.
pub async fn write_record(path: &Path, record: &SessionRecord) -> Result<(), SessionFileError> {
    let io_error = |error| SessionFileError::Io {
        path: path.to_owned(),
        error,
    };
    let json = serde_json::to_string_pretty(record).map_err(|error| SessionFileError::Corrupt {
        path: path.to_owned(),
        error,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let temp_path = path.with_extension("session.tmp");
    tokio::fs::write(&temp_path, json).await.map_err(io_error)?;
    tokio::fs::rename(&temp_path, path).await.map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("hawk-session-{}", std::process::id()))
            .join(format!("{name}.session"))
    }

    #[tokio::test]
    async fn test_missing_record_is_reported() {
        let err = read_record(&temp_path("absent")).await.unwrap_err();
        assert!(matches!(err, SessionFileError::Missing { .. }));
    }

    #[tokio::test]
    async fn test_record_survives_write_and_read() {
        let path = temp_path("monitor");
        let user = UserProfile {
            id: 42,
            username: Some("hawk".to_string()),
            first_name: None,
            last_name: None,
        };
        let record = SessionRecord::new("monitor", &user);

        write_record(&path, &record).await.unwrap();
        let read = read_record(&path).await.unwrap();
        assert_eq!(read.label, "monitor");
        assert_eq!(read.user_id, 42);
        assert_eq!(read.authorized_at.unix_timestamp(), record.authorized_at.unix_timestamp());

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_is_rejected() {
        let path = temp_path("corrupt");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "not json").await.unwrap();

        let err = read_record(&path).await.unwrap_err();
        assert!(matches!(err, SessionFileError::Corrupt { .. }));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
