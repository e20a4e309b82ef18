//! Per-snapshot manifest for incremental backup support.
//!
//! A smart (incremental) snapshot only stores files that changed since the
//! previous snapshot, so the manifest records which relative paths the
//! snapshot is responsible for — copied or deliberately skipped. Snapshots
//! without a manifest are full backups by convention. The JSON layout is a
//! stable on-disk contract read by other tooling; bump `MANIFEST_VERSION`
//! on any incompatible change.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = ".backup_manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

/// Backup manifest — serialized as `.backup_manifest.json` in each snapshot
/// directory when smart backup is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub smart_backup: bool,
    pub files: ManifestFiles,
}

/// File names per category, relative to the category directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestFiles {
    /// Top-level YAML files of the config tree (`automations.yaml`, ...).
    #[serde(default)]
    pub root: Vec<String>,
    /// Dashboard files under `.storage/`.
    #[serde(default)]
    pub storage: Vec<String>,
    /// Relative paths under `esphome/`.
    #[serde(default)]
    pub esphome: Vec<String>,
    /// Relative paths under `packages/`.
    #[serde(default)]
    pub packages: Vec<String>,
}

impl Manifest {
    pub fn new(smart_backup: bool) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generated_at: chrono::Utc::now(),
            smart_backup,
            files: ManifestFiles::default(),
        }
    }

    /// Read a snapshot's manifest. Absent means the snapshot is a full
    /// (legacy) backup; a corrupt manifest is treated the same way so that
    /// callers fall back to scanning the directory.
    pub async fn load(snapshot_dir: &Path) -> Option<Manifest> {
        let path = snapshot_dir.join(MANIFEST_FILE_NAME);
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
                None
            }
        }
    }

    pub async fn write(&self, snapshot_dir: &Path) -> crate::error::Result<()> {
        let path = snapshot_dir.join(MANIFEST_FILE_NAME);
        let raw = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, raw).await?;
        Ok(())
    }
}
