//! Snapshot creation.
//!
//! A snapshot is a directory `<root>/YYYY/MM/YYYY-MM-DD-HHMMSS` holding
//! copies of the live configuration, grouped in four passes: root-level
//! YAML files, `lovelace*` dashboard files under `.storage`, and the
//! recursive `esphome` and `packages` trees. In smart mode a file whose
//! bytes already exist in the chain is skipped, and a manifest records
//! every candidate so later readers can tell a skip from a deletion.

use crate::error::{Result, TimeMachineError};
use crate::fs::paths::{is_yaml_file, list_yaml_files_recursive};
use crate::models::manifest::{Manifest, ManifestFiles};
use crate::services::changes::has_file_changed;
use crate::services::retention;
use crate::services::snapshot_index::canonical_chain;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub live_config_path: PathBuf,
    pub backup_root: PathBuf,
    /// Recorded in logs only: "manual", "scheduled", "pre-restore".
    pub source: String,
    pub max_backups: Option<usize>,
    pub timezone: Option<chrono_tz::Tz>,
    pub smart_backup: bool,
    pub esphome_enabled: bool,
    pub packages_enabled: bool,
}

/// Create one snapshot and return its directory.
pub async fn perform_backup(req: &BackupRequest) -> Result<PathBuf> {
    ensure_backup_root(&req.backup_root).await?;

    // The chain must be captured before the new directory exists, or the
    // empty snapshot would shadow every prior copy during skip checks.
    let chain = if req.smart_backup {
        canonical_chain(&req.backup_root)
    } else {
        Vec::new()
    };

    let (year, month, name) = snapshot_name(Utc::now(), req.timezone);
    let snapshot_dir = req.backup_root.join(&year).join(&month).join(&name);
    tokio::fs::create_dir_all(&snapshot_dir).await?;

    tracing::info!(
        snapshot = %name,
        source = %req.source,
        smart = req.smart_backup,
        "Starting backup"
    );

    let mut files = ManifestFiles::default();
    let mut copied = 0usize;
    let mut skipped = 0usize;

    for rel in root_yaml_files(&req.live_config_path).await {
        files.root.push(rel.clone());
        copy_candidate(req, &chain, &snapshot_dir, &rel, &mut copied, &mut skipped).await;
    }

    // Manifest entries are bare names relative to their category directory;
    // copies use the full path relative to the snapshot root.
    for name in lovelace_files(&req.live_config_path).await {
        files.storage.push(name.clone());
        let rel = format!(".storage/{name}");
        copy_candidate(req, &chain, &snapshot_dir, &rel, &mut copied, &mut skipped).await;
    }

    if req.esphome_enabled {
        for name in list_yaml_files_recursive(&req.live_config_path.join("esphome")) {
            files.esphome.push(name.clone());
            let rel = format!("esphome/{name}");
            copy_candidate(req, &chain, &snapshot_dir, &rel, &mut copied, &mut skipped).await;
        }
    }

    if req.packages_enabled {
        for name in list_yaml_files_recursive(&req.live_config_path.join("packages")) {
            files.packages.push(name.clone());
            let rel = format!("packages/{name}");
            copy_candidate(req, &chain, &snapshot_dir, &rel, &mut copied, &mut skipped).await;
        }
    }

    if req.smart_backup {
        let mut manifest = Manifest::new(true);
        manifest.files = files;
        if let Err(e) = manifest.write(&snapshot_dir).await {
            tracing::warn!(error = %e, "Failed to write backup manifest");
        }
    }

    tracing::info!(
        snapshot = %name,
        copied,
        skipped,
        "Backup complete"
    );

    if let Some(max) = req.max_backups {
        match retention::prune(&req.backup_root, max).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "Pruned old backups");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Backup retention pass failed"),
        }
    }

    Ok(snapshot_dir)
}

/// Copy one candidate file into the snapshot, honoring smart-mode skips.
/// Copy failures are logged and the file is left out of the snapshot.
async fn copy_candidate(
    req: &BackupRequest,
    chain: &[PathBuf],
    snapshot_dir: &Path,
    rel: &str,
    copied: &mut usize,
    skipped: &mut usize,
) {
    let source = req.live_config_path.join(rel);
    if req.smart_backup && !has_file_changed(&source, chain, rel).await {
        *skipped += 1;
        return;
    }

    let dest = snapshot_dir.join(rel);
    if let Some(parent) = dest.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::warn!(file = rel, error = %e, "Failed to create snapshot subdirectory");
            return;
        }
    }
    match tokio::fs::copy(&source, &dest).await {
        Ok(_) => *copied += 1,
        Err(e) => tracing::warn!(file = rel, error = %e, "Failed to copy file, skipping"),
    }
}

/// Make sure the backup root exists and is writable before any directory
/// for the new snapshot is created.
async fn ensure_backup_root(root: &Path) -> Result<()> {
    match tokio::fs::metadata(root).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(root).await.map_err(|source| {
                TimeMachineError::BackupDirCreateFailed {
                    path: root.to_path_buf(),
                    source,
                }
            })?;
        }
        Err(source) => {
            return Err(TimeMachineError::BackupDirCreateFailed {
                path: root.to_path_buf(),
                source,
            })
        }
    }

    // A probe write catches read-only mounts that metadata alone misses.
    let probe = root.join(".write-test");
    tokio::fs::write(&probe, b"ok").await.map_err(|source| {
        TimeMachineError::BackupDirUnwritable {
            path: root.to_path_buf(),
            source,
        }
    })?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

/// Year, month and directory name for a snapshot taken at `now`, rendered
/// in the configured timezone (server local time when none is set).
fn snapshot_name(now: DateTime<Utc>, tz: Option<chrono_tz::Tz>) -> (String, String, String) {
    fn render<T: chrono::TimeZone>(local: DateTime<T>) -> (String, String, String)
    where
        T::Offset: std::fmt::Display,
    {
        (
            local.format("%Y").to_string(),
            local.format("%m").to_string(),
            local.format("%Y-%m-%d-%H%M%S").to_string(),
        )
    }

    match tz {
        Some(tz) => render(now.with_timezone(&tz)),
        None => render(now.with_timezone(&chrono::Local)),
    }
}

/// Top-level `*.yaml` files in the live configuration, non-recursive.
/// Symlinks and macOS `._` sidecar files are skipped.
async fn root_yaml_files(live_config: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(live_config).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("._") || !is_yaml_file(&name) {
            continue;
        }
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            names.push(name);
        }
    }
    names.sort();
    names
}

/// Bare names of the `lovelace*` dashboard files under `.storage`.
async fn lovelace_files(live_config: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(live_config.join(".storage")).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.starts_with("lovelace") {
            names.push(name);
        }
    }
    names.sort();
    names
}
