//! Snapshot archive extraction
//!
//! Branch snapshots arrive as zip archives with a single top-level
//! directory named `{repo}-{branch}`. Extraction is CPU and blocking
//! IO bound, so it runs on the blocking pool.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::errors::AgentError;

/// Extract `bytes` (a zip archive) into `dest`.
///
/// Returns the path of the single top-level directory the archive
/// unpacks to.
pub async fn extract_snapshot(bytes: Vec<u8>, dest: &Path) -> Result<PathBuf, AgentError> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_blocking(bytes, &dest))
        .await
        .map_err(|e| AgentError::ExtractError(format!("extraction task panicked: {}", e)))?
}

fn extract_blocking(bytes: Vec<u8>, dest: &Path) -> Result<PathBuf, AgentError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AgentError::ExtractError(format!("invalid archive: {}", e)))?;

    let mut root: Option<PathBuf> = None;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AgentError::ExtractError(format!("bad archive entry: {}", e)))?;

        // Skip entries that would escape the destination
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => continue,
        };

        if root.is_none() {
            if let Some(first) = relative.components().next() {
                root = Some(dest.join(first.as_os_str()));
            }
        }

        let out_path = dest.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut contents)?;
            std::fs::write(&out_path, contents)?;
        }
    }

    let root =
        root.ok_or_else(|| AgentError::ExtractError("archive is empty".to_string()))?;
    debug!("Extracted snapshot to {}", root.display());
    Ok(root)
}

/// Expected name of the archive's top-level directory
pub fn snapshot_root_name(repo_name: &str, branch: &str) -> String {
    format!("{}-{}", repo_name, branch)
}
