//! Loading the newline-delimited list of source handles.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("failed to read source list {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("source list {0} has no sources")]
    Empty(PathBuf),
}

/// Reduce one line of the list to a handle.
///
/// `https://t.me/name` and `t.me/name` become `name`; a leading `@` is dropped.
pub fn normalize_handle(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let handle = if line.contains("t.me/") {
        line.trim_end_matches('/').rsplit('/').next().unwrap_or(line)
    } else {
        line
    };
    let handle = handle.trim_start_matches('@');
    (!handle.is_empty()).then(|| handle.to_owned())
}

/// Parse the list, keeping the first occurrence of each handle.
pub fn parse_sources(contents: &str) -> Vec<String> {
    let mut handles: Vec<String> = Vec::new();
    for handle in contents.lines().filter_map(normalize_handle) {
        if !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}

/// Read and parse the list at `path`. A missing or empty list is an error.
pub async fn load_sources(path: &Path) -> Result<Vec<String>, SourceListError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|error| SourceListError::Io {
            path: path.to_owned(),
            error,
        })?;
    let handles = parse_sources(&contents);
    if handles.is_empty() {
        return Err(SourceListError::Empty(path.to_owned()));
    }
    info!(path = %path.display(), count = handles.len(), "Loaded source list");
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        let contents = "\
# calls
https://t.me/alpha_calls
t.me/beta/

@gamma
-1001234567890
alpha_calls
";
        assert_eq!(
            parse_sources(contents),
            vec!["alpha_calls", "beta", "gamma", "-1001234567890"]
        );
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let missing = std::env::temp_dir().join("hawk-missing-sources.txt");
        assert!(matches!(
            load_sources(&missing).await,
            Err(SourceListError::Io { .. })
        ));

        let empty = std::env::temp_dir().join(format!("hawk-empty-sources-{}.txt", std::process::id()));
        tokio::fs::write(&empty, "# nothing here\n\n").await.unwrap();
        assert!(matches!(
            load_sources(&empty).await,
            Err(SourceListError::Empty(_))
        ));
        let _ = tokio::fs::remove_file(&empty).await;
    }
}
