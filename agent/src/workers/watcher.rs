//! Inbox filesystem watcher
//!
//! Watches the pending directory for new or rewritten JSON config
//! files and forwards their paths to the scheduler. The notify
//! backend delivers events on its own thread, so they cross into the
//! async world over an unbounded channel.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::errors::AgentError;

/// Start watching `dir` for JSON config files.
///
/// Returns the watcher handle; dropping it stops the watch.
pub fn watch_inbox(
    dir: &Path,
    tx: UnboundedSender<PathBuf>,
) -> Result<RecommendedWatcher, AgentError> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!("Inbox watch error: {}", e);
                return;
            }
        };

        if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
            return;
        }

        for path in event.paths {
            if !is_config_file(&path) {
                continue;
            }
            debug!("Inbox event for {}", path.display());
            // Receiver gone means we are shutting down
            let _ = tx.send(path);
        }
    })
    .map_err(|e| AgentError::ConfigError(format!("failed to create inbox watcher: {}", e)))?;

    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| {
            AgentError::ConfigError(format!("failed to watch {}: {}", dir.display(), e))
        })?;

    Ok(watcher)
}

fn is_config_file(path: &Path) -> bool {
    path.extension().map(|e| e == "json").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_config_file() {
        assert!(is_config_file(Path::new("/inbox/site.json")));
        assert!(!is_config_file(Path::new("/inbox/site.json.tmp")));
        assert!(!is_config_file(Path::new("/inbox/README")));
    }

    #[tokio::test]
    async fn test_watch_inbox_reports_new_config() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let _watcher = watch_inbox(dir.path(), tx).unwrap();
        std::fs::write(dir.path().join("site.json"), b"{}").unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("no inbox event within timeout")
            .expect("channel closed");
        assert_eq!(received.file_name().unwrap(), "site.json");
    }
}
