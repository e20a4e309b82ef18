//! Snapshot retention.
//!
//! Keeps the newest `max` snapshots and removes the rest. Ordering comes
//! from the snapshot name, which sorts chronologically, so retention never
//! depends on filesystem timestamps. Empty year/month directories left
//! behind after deletion are swept away too.

use crate::error::{Result, TimeMachineError};
use crate::services::snapshot_index::list_snapshots;
use std::path::Path;

/// Delete all but the newest `max` snapshots under `root`. Returns how many
/// were removed. Individual deletion failures are logged and skipped so one
/// stuck directory cannot block the rest of the pass.
pub async fn prune(root: &Path, max: usize) -> Result<usize> {
    if tokio::fs::metadata(root).await.is_err() {
        return Err(TimeMachineError::DirNotFound(root.to_path_buf()));
    }

    let snapshots = list_snapshots(root);
    if snapshots.len() <= max {
        return Ok(0);
    }

    let mut removed = 0usize;
    for snapshot in &snapshots[max..] {
        match tokio::fs::remove_dir_all(&snapshot.path).await {
            Ok(()) => {
                tracing::info!(snapshot = %snapshot.name, "Removed old backup");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(snapshot = %snapshot.name, error = %e, "Failed to remove old backup");
            }
        }
    }

    sweep_empty_dirs(root).await;
    Ok(removed)
}

/// Remove now-empty month and year directories. Best effort only.
async fn sweep_empty_dirs(root: &Path) {
    let Ok(mut years) = tokio::fs::read_dir(root).await else {
        return;
    };
    while let Ok(Some(year)) = years.next_entry().await {
        let year_path = year.path();
        if !year_path.is_dir() {
            continue;
        }
        if let Ok(mut months) = tokio::fs::read_dir(&year_path).await {
            while let Ok(Some(month)) = months.next_entry().await {
                let month_path = month.path();
                if month_path.is_dir() {
                    // Fails on non-empty directories, which is the point.
                    let _ = tokio::fs::remove_dir(&month_path).await;
                }
            }
        }
        let _ = tokio::fs::remove_dir(&year_path).await;
    }
}
