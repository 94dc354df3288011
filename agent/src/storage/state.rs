//! Persisted deployment state
//!
//! One record per host: the last commit that was successfully synced.
//! A missing, empty or corrupt file is equivalent to "no prior
//! deployment" and is rewritten as `{}` instead of failing the caller.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AgentError;
use crate::filesys::file::File;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    last_commit: Option<String>,
}

/// Store for the last deployed commit id
#[derive(Debug, Clone)]
pub struct StateStore {
    file: File,
}

impl StateStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    /// Load the last deployed commit id.
    ///
    /// Never fails on bad contents: an unparsable file is reset to an
    /// empty record and reported as absent.
    pub async fn load(&self) -> Option<String> {
        if !self.file.exists().await {
            return None;
        }

        let contents = match self.file.read_string().await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read state file: {}", e);
                return None;
            }
        };

        if contents.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<StateRecord>(&contents) {
            Ok(record) => record.last_commit,
            Err(_) => {
                warn!(
                    "State file {} is corrupt, resetting",
                    self.file.path().display()
                );
                if let Err(e) = self.save(None).await {
                    warn!("Failed to reset state file: {}", e);
                }
                None
            }
        }
    }

    /// Persist the last deployed commit id. `None` writes an empty
    /// record.
    pub async fn save(&self, commit: Option<&str>) -> Result<(), AgentError> {
        let record = StateRecord {
            last_commit: commit.map(str::to_string),
        };
        let contents = serde_json::to_string(&record)?;
        self.file.write_atomic(contents.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(File::new(dir.path().join("last_commit.json")));
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(File::new(dir.path().join("last_commit.json")));

        store.save(Some("abc123")).await.unwrap();
        assert_eq!(store.load().await, Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn test_save_none_writes_empty_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_commit.json");
        let store = StateStore::new(File::new(path.clone()));

        store.save(None).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{}");
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_corrupt_file_self_heals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_commit.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = StateStore::new(File::new(path.clone()));
        assert_eq!(store.load().await, None);

        // The file was rewritten as an empty record
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{}");
    }
}
