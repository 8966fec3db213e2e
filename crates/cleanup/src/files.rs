//! Local file deletion.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::error::{CleanupError, Result};
use crate::plan::{read_config, FILES_TO_DELETE};

/// Deletes every file listed in the file plan at `config_path`.
///
/// A missing plan is a no-op. Individual removal failures are logged and
/// skipped. Returns the number of files removed.
pub async fn cleanup_files(config_path: &Path) -> Result<usize> {
    let Some(bytes) = read_config(config_path, FILES_TO_DELETE).await? else {
        return Ok(0);
    };
    let files: Vec<PathBuf> = serde_json::from_slice(&bytes).map_err(|source| {
        error!(error = %source, "failed to unmarshal file cleanup config");
        CleanupError::MalformedConfig {
            config_type: FILES_TO_DELETE,
            source,
        }
    })?;

    let mut removed = 0;
    for path in &files {
        info!(path = %path.display(), "Deleting file");
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "File deletion successful");
                removed += 1;
            }
            Err(err) => error!(path = %path.display(), error = %err, "file deletion failed"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deletes_listed_files_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("00-multus.conf");
        let missing = dir.path().join("multus");
        std::fs::write(&present, "{}").unwrap();

        let config = dir.path().join("file-config.json");
        std::fs::write(&config, serde_json::to_vec(&[&present, &missing]).unwrap()).unwrap();

        let removed = cleanup_files(&config).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!present.exists());
    }

    #[tokio::test]
    async fn test_missing_config_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let removed = cleanup_files(&dir.path().join("file-config.json"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_malformed_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("file-config.json");
        std::fs::write(&config, "{not json").unwrap();

        let err = cleanup_files(&config).await.unwrap_err();
        assert!(matches!(err, CleanupError::MalformedConfig { config_type: FILES_TO_DELETE, .. }));
    }
}
