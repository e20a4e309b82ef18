//! Restoration of items and files out of the snapshot chain.
//!
//! Structured restores (a single automation or script) splice the backed-up
//! item text into the live file byte-for-byte, leaving every other line of
//! the live file untouched. Raw restores copy whole files. Both read through
//! the chain, so an item can be restored from an incremental snapshot that
//! never physically stored its file.

use crate::error::{Result, TimeMachineError};
use crate::models::manifest::Manifest;
use crate::services::backup::{perform_backup, BackupRequest};
use crate::services::chain;
use crate::yaml::span;
use serde_yaml::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The two item-level restorable categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredKind {
    Automations,
    Scripts,
}

impl StructuredKind {
    pub fn file_name(self) -> &'static str {
        match self {
            StructuredKind::Automations => "automations.yaml",
            StructuredKind::Scripts => "scripts.yaml",
        }
    }

    /// Automations are a top-level list, scripts a top-level map.
    fn is_list(self) -> bool {
        matches!(self, StructuredKind::Automations)
    }
}

/// Whole-file restorable trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Lovelace,
    Esphome,
    Packages,
}

impl TreeKind {
    pub fn dir(self) -> &'static str {
        match self {
            TreeKind::Lovelace => ".storage",
            TreeKind::Esphome => "esphome",
            TreeKind::Packages => "packages",
        }
    }
}

/// Take a full safety snapshot of the live configuration before anything
/// about it is overwritten. Never incremental: a rollback of a rollback
/// must not depend on chain state.
pub async fn safety_backup(live_config: &Path, backup_root: &Path) -> Result<PathBuf> {
    perform_backup(&BackupRequest {
        live_config_path: live_config.to_path_buf(),
        backup_root: backup_root.to_path_buf(),
        source: "pre-restore".into(),
        max_backups: None,
        timezone: None,
        smart_backup: false,
        esphome_enabled: true,
        packages_enabled: true,
    })
    .await
}

/// Restore one automation or script, identified by `id` (or alias for
/// automations), from `snapshot` into the live file.
pub async fn restore_structured_item(
    live_config: &Path,
    snapshot: &Path,
    kind: StructuredKind,
    identifier: &str,
) -> Result<()> {
    let backup_file = chain::resolve_from_snapshot(snapshot, kind.file_name())
        .await
        .ok_or_else(|| TimeMachineError::ItemNotFoundInBackup(identifier.to_string()))?;

    let backup_text = tokio::fs::read_to_string(&backup_file).await?;
    let live_file = live_config.join(kind.file_name());
    let live_text = match tokio::fs::read_to_string(&live_file).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let updated = span::restore_item(&live_text, &backup_text, identifier, kind.is_list())?;
    write_atomic(&live_file, updated.as_bytes()).await?;

    tracing::info!(
        item = identifier,
        file = kind.file_name(),
        snapshot = %snapshot.display(),
        "Restored item"
    );
    Ok(())
}

/// Restore a whole file (dashboard, esphome or package YAML) from the
/// snapshot chain into the live tree. `relative` is validated against
/// traversal before any write.
pub async fn restore_raw_file(live_config: &Path, snapshot: &Path, relative: &str) -> Result<()> {
    let dest = crate::fs::paths::resolve_within(live_config, relative)?;
    let source = chain::resolve_from_snapshot(snapshot, relative)
        .await
        .ok_or_else(|| TimeMachineError::ItemNotFoundInBackup(relative.to_string()))?;

    let bytes = tokio::fs::read(&source).await?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(&dest, &bytes).await?;

    tracing::info!(file = relative, snapshot = %snapshot.display(), "Restored file");
    Ok(())
}

/// Write caller-supplied bytes into the live tree under `relative`. Used
/// when the operator edits the backed-up content before restoring it.
pub async fn restore_raw_content(live_config: &Path, relative: &str, content: &[u8]) -> Result<()> {
    let dest = crate::fs::paths::resolve_within(live_config, relative)?;
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(&dest, content).await?;
    tracing::info!(file = relative, "Wrote restored content");
    Ok(())
}

/// Automations visible from `snapshot`, resolved through the chain.
pub async fn list_snapshot_automations(snapshot: &Path) -> Result<Vec<Value>> {
    match read_structured(snapshot, StructuredKind::Automations).await? {
        Some(Value::Sequence(items)) => Ok(items),
        _ => Ok(Vec::new()),
    }
}

/// Scripts visible from `snapshot`, flattened from the keyed map into a
/// list of records with the key injected as `id`, so callers handle both
/// categories uniformly.
pub async fn list_snapshot_scripts(snapshot: &Path) -> Result<Vec<Value>> {
    let Some(Value::Mapping(map)) = read_structured(snapshot, StructuredKind::Scripts).await?
    else {
        return Ok(Vec::new());
    };

    let mut items = Vec::with_capacity(map.len());
    for (key, body) in map {
        let mut record = serde_yaml::Mapping::new();
        record.insert(Value::String("id".into()), key);
        if let Value::Mapping(fields) = body {
            for (k, v) in fields {
                // The key wins over any literal `id` field in the body.
                record.entry(k).or_insert(v);
            }
        }
        items.push(Value::Mapping(record));
    }
    Ok(items)
}

async fn read_structured(snapshot: &Path, kind: StructuredKind) -> Result<Option<Value>> {
    // An incremental snapshot whose manifest omits the file recorded its
    // absence at backup time; chain resolution would surface a stale older
    // copy as this snapshot's content.
    if let Some(manifest) = Manifest::load(snapshot).await {
        if !manifest.files.root.iter().any(|n| n == kind.file_name()) {
            return Ok(None);
        }
    }

    let Some(file) = chain::resolve_from_snapshot(snapshot, kind.file_name()).await else {
        return Ok(None);
    };
    let text = tokio::fs::read_to_string(&file).await?;
    Ok(Some(serde_yaml::from_str(&text)?))
}

/// Files of a tree visible from `snapshot`. Incremental snapshots answer
/// from their manifest, which lists skipped files too; full snapshots are
/// scanned physically. Paths are relative to the snapshot root.
pub async fn list_snapshot_files(snapshot: &Path, tree: TreeKind) -> Vec<String> {
    if let Some(manifest) = Manifest::load(snapshot).await {
        // Manifest entries are bare names relative to the category
        // directory; callers expect snapshot-relative paths.
        let names = match tree {
            TreeKind::Lovelace => &manifest.files.storage,
            TreeKind::Esphome => &manifest.files.esphome,
            TreeKind::Packages => &manifest.files.packages,
        };
        return names.iter().map(|n| format!("{}/{n}", tree.dir())).collect();
    }

    match tree {
        TreeKind::Lovelace => {
            let mut names = Vec::new();
            if let Ok(entries) = std::fs::read_dir(snapshot.join(".storage")) {
                for entry in entries.flatten() {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if name.starts_with("lovelace") && entry.path().is_file() {
                        names.push(format!(".storage/{name}"));
                    }
                }
            }
            names.sort();
            names
        }
        TreeKind::Esphome | TreeKind::Packages => {
            crate::fs::paths::list_yaml_files_recursive(&snapshot.join(tree.dir()))
                .into_iter()
                .map(|name| format!("{}/{name}", tree.dir()))
                .collect()
        }
    }
}

/// Raw bytes of a file as seen from `snapshot`, read through the chain.
pub async fn read_snapshot_file(snapshot: &Path, relative: &str) -> Result<Vec<u8>> {
    // Containment check against the snapshot directory itself.
    crate::fs::paths::resolve_within(snapshot, relative)?;
    let source = chain::resolve_from_snapshot(snapshot, relative)
        .await
        .ok_or_else(|| TimeMachineError::ItemNotFoundInBackup(relative.to_string()))?;
    Ok(tokio::fs::read(&source).await?)
}

/// Replace `path` via a sibling temp file and rename, so readers never see
/// a half-written live file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp.restore");
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::{Manifest, ManifestFiles};
    use std::fs;
    use tempfile::TempDir;

    fn make_snapshot(root: &Path, name: &str) -> PathBuf {
        let (year, month) = (&name[..4], &name[5..7]);
        let dir = root.join(year).join(month).join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_restore_item_preserves_live_formatting() {
        let root = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");

        fs::write(
            snapshot.join("automations.yaml"),
            "- id: a\n  alias: Old good\n  trigger: 1\n",
        )
        .unwrap();
        fs::write(
            live.path().join("automations.yaml"),
            "- id: a\n  alias: Broken\n  trigger: 9\n# bedtime routine\n- id: b\n  trigger: 2\n",
        )
        .unwrap();

        restore_structured_item(live.path(), &snapshot, StructuredKind::Automations, "a")
            .await
            .unwrap();

        let text = fs::read_to_string(live.path().join("automations.yaml")).unwrap();
        assert!(text.starts_with("- id: a\n  alias: Old good\n  trigger: 1\n"));
        assert!(!text.contains("Broken"));
        assert!(text.contains("# bedtime routine\n- id: b\n  trigger: 2\n"));
    }

    #[tokio::test]
    async fn test_restore_item_walks_the_chain() {
        let root = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        // Incremental snapshot without the file; an older one has it.
        let newer = make_snapshot(root.path(), "2026-08-02-000000");
        let older = make_snapshot(root.path(), "2026-08-01-000000");
        fs::write(older.join("automations.yaml"), "- id: a\n  trigger: 1\n").unwrap();

        restore_structured_item(live.path(), &newer, StructuredKind::Automations, "a")
            .await
            .unwrap();
        let text = fs::read_to_string(live.path().join("automations.yaml")).unwrap();
        assert!(text.contains("- id: a"));
    }

    #[tokio::test]
    async fn test_restore_missing_item_errors() {
        let root = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");
        fs::write(snapshot.join("automations.yaml"), "- id: a\n").unwrap();

        let err = restore_structured_item(
            live.path(),
            &snapshot,
            StructuredKind::Automations,
            "ghost",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TimeMachineError::ItemNotFoundInBackup(_)));
    }

    #[tokio::test]
    async fn test_restore_raw_file_rejects_traversal() {
        let root = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");

        let err = restore_raw_file(live.path(), &snapshot, "../outside.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, TimeMachineError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_restore_raw_file_creates_parent_dirs() {
        let root = TempDir::new().unwrap();
        let live = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");
        fs::create_dir_all(snapshot.join("esphome")).unwrap();
        fs::write(snapshot.join("esphome/node.yaml"), "esphome:\n").unwrap();

        restore_raw_file(live.path(), &snapshot, "esphome/node.yaml")
            .await
            .unwrap();
        assert_eq!(
            fs::read_to_string(live.path().join("esphome/node.yaml")).unwrap(),
            "esphome:\n"
        );
    }

    #[tokio::test]
    async fn test_scripts_flattened_with_key_as_id() {
        let root = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");
        fs::write(
            snapshot.join("scripts.yaml"),
            "wake_up:\n  alias: Wake\n  sequence: []\n",
        )
        .unwrap();

        let items = list_snapshot_scripts(&snapshot).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = items[0].as_mapping().unwrap();
        assert_eq!(item[&Value::from("id")], Value::from("wake_up"));
        assert_eq!(item[&Value::from("alias")], Value::from("Wake"));
    }

    #[tokio::test]
    async fn test_listing_respects_recorded_deletion() {
        let root = TempDir::new().unwrap();
        // Older snapshot stored the file; the newer incremental snapshot's
        // manifest does not list it, i.e. it was deleted before the backup.
        let older = make_snapshot(root.path(), "2026-08-01-000000");
        fs::write(older.join("automations.yaml"), "- id: a\n").unwrap();
        let newer = make_snapshot(root.path(), "2026-08-02-000000");
        Manifest::new(true).write(&newer).await.unwrap();

        assert!(list_snapshot_automations(&newer).await.unwrap().is_empty());
        // The older snapshot itself still shows its own copy.
        assert_eq!(list_snapshot_automations(&older).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_files_prefers_manifest() {
        let root = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");

        // Physical dir has one file; the manifest claims two (one skipped).
        fs::create_dir_all(snapshot.join("esphome")).unwrap();
        fs::write(snapshot.join("esphome/a.yaml"), "a: 1\n").unwrap();

        let mut manifest = Manifest::new(true);
        manifest.files = ManifestFiles {
            esphome: vec!["a.yaml".into(), "b.yaml".into()],
            ..ManifestFiles::default()
        };
        manifest.write(&snapshot).await.unwrap();

        let files = list_snapshot_files(&snapshot, TreeKind::Esphome).await;
        assert_eq!(files, vec!["esphome/a.yaml", "esphome/b.yaml"]);
    }

    #[tokio::test]
    async fn test_list_files_scans_full_snapshots() {
        let root = TempDir::new().unwrap();
        let snapshot = make_snapshot(root.path(), "2026-08-01-000000");
        fs::create_dir_all(snapshot.join(".storage")).unwrap();
        fs::write(snapshot.join(".storage/lovelace"), "{}").unwrap();
        fs::write(snapshot.join(".storage/core.config"), "{}").unwrap();

        let files = list_snapshot_files(&snapshot, TreeKind::Lovelace).await;
        assert_eq!(files, vec![".storage/lovelace"]);
    }

    #[tokio::test]
    async fn test_restore_raw_content_writes_supplied_bytes() {
        let live = TempDir::new().unwrap();
        restore_raw_content(live.path(), "esphome/edited.yaml", b"esphome:\n  name: x\n")
            .await
            .unwrap();
        assert_eq!(
            fs::read(live.path().join("esphome/edited.yaml")).unwrap(),
            b"esphome:\n  name: x\n"
        );

        let err = restore_raw_content(live.path(), "../escape.yaml", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, TimeMachineError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_read_snapshot_file_resolves_through_chain() {
        let root = TempDir::new().unwrap();
        let newer = make_snapshot(root.path(), "2026-08-02-000000");
        let older = make_snapshot(root.path(), "2026-08-01-000000");
        fs::create_dir_all(older.join(".storage")).unwrap();
        fs::write(older.join(".storage/lovelace"), "{\"views\":[]}").unwrap();

        let bytes = read_snapshot_file(&newer, ".storage/lovelace").await.unwrap();
        assert_eq!(bytes, b"{\"views\":[]}");

        let err = read_snapshot_file(&newer, "ghost.yaml").await.unwrap_err();
        assert!(matches!(err, TimeMachineError::ItemNotFoundInBackup(_)));
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("automations.yaml");
        write_atomic(&target, b"- id: a\n").await.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"- id: a\n");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
