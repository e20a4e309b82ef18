//! Backward chain-walk resolution for incremental snapshots.
//!
//! A smart snapshot omits files that were unchanged at backup time, so "the
//! content of file F as of snapshot S" is found in the first snapshot at or
//! before S (walking toward older snapshots) that physically stored F.
//! Resolution uses existence checks, never the manifest — a missing or
//! corrupt manifest must not break restores.

use crate::services::snapshot_index::canonical_chain;
use std::path::{Path, PathBuf};

/// Infer the backup root from a snapshot path by ascending exactly three
/// levels (`<name>` → `MM` → `YYYY` → root). Restore operations assume the
/// canonical layout; arbitrary nesting is only tolerated when listing.
pub fn backup_root_of(snapshot: &Path) -> Option<&Path> {
    snapshot.ancestors().nth(3)
}

/// Walk `chain` (newest first) from `start` toward older snapshots and
/// return the first physical location of `relative`. `None` means the file
/// never existed anywhere at or before `start` — an ordinary outcome, not
/// an error.
pub async fn resolve_file(chain: &[PathBuf], start: &Path, relative: &str) -> Option<PathBuf> {
    let start_name = start.file_name()?;
    let position = chain.iter().position(|p| p.file_name() == Some(start_name));

    let Some(position) = position else {
        // Not part of the canonical chain (legacy snapshot): probe only the
        // start snapshot itself.
        let candidate = start.join(relative);
        return exists(&candidate).await.then_some(candidate);
    };

    for snapshot in &chain[position..] {
        let candidate = snapshot.join(relative);
        if exists(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

/// Convenience used by browse/restore paths: infer the root from the
/// snapshot itself, enumerate the canonical chain and resolve.
pub async fn resolve_from_snapshot(snapshot: &Path, relative: &str) -> Option<PathBuf> {
    let chain = match backup_root_of(snapshot) {
        Some(root) => canonical_chain(root),
        None => Vec::new(),
    };
    resolve_file(&chain, snapshot, relative).await
}

async fn exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
