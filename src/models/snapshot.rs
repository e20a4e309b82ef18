//! Snapshot identity and the full/incremental distinction.

use crate::models::manifest::Manifest;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One timestamped backup directory. `name` is either the dashed form
/// `YYYY-MM-DD-HHMMSS` or a 12-digit legacy timestamp; both are zero-padded,
/// so lexicographic order on `name` is chronological order. The index relies
/// on this to sort newest-first without parsing dates.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub path: PathBuf,
    pub name: String,
    #[serde(skip)]
    pub mtime: Option<SystemTime>,
}

impl Snapshot {
    pub fn new(path: PathBuf, mtime: Option<SystemTime>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name, mtime }
    }

    /// Load the snapshot's storage kind. Manifest present means incremental
    /// (smart) storage; absent means a self-contained full backup.
    pub async fn kind(&self) -> SnapshotKind {
        match Manifest::load(&self.path).await {
            Some(manifest) => SnapshotKind::Incremental(manifest),
            None => SnapshotKind::Full,
        }
    }
}

/// Storage model of one snapshot. Full snapshots hold every file they are
/// responsible for; incremental snapshots rely on chain resolution for
/// anything missing from their manifest's physical set.
#[derive(Debug, Clone)]
pub enum SnapshotKind {
    Full,
    Incremental(Manifest),
}

/// Dashed snapshot name: `YYYY-MM-DD-HHMMSS`.
pub fn is_dashed_snapshot_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| match i {
        4 | 7 | 10 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}

/// Legacy snapshot name: 12 digits (`YYYYMMDDHHMM`).
pub fn is_legacy_snapshot_name(name: &str) -> bool {
    name.len() == 12 && name.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_snapshot_name(name: &str) -> bool {
    is_dashed_snapshot_name(name) || is_legacy_snapshot_name(name)
}

/// Does this directory hold backup-like content? Used as a fallback when a
/// directory name matches neither snapshot pattern (hand-renamed folders,
/// imports from other tools).
pub fn looks_like_snapshot_dir(path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "automations.yaml" || name == "scripts.yaml" {
            return true;
        }
        if crate::fs::paths::is_yaml_file(&name) {
            return true;
        }
    }
    false
}
