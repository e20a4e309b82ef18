//! Snapshot-vs-live change detection.
//!
//! Two deliberately different policies coexist (and must not be unified):
//!
//! * automations/scripts are compared asymmetrically — only items present in
//!   the snapshot count, so additions made since the backup are ignored. The
//!   question answered is "would restoring this snapshot move something
//!   backward", not "are the trees equal".
//! * lovelace/esphome/packages file trees are compared symmetrically — a
//!   file on either side only, or differing bytes, counts as changed.
//!
//! Absent files are ordinary inputs here, never errors. Parse failures are
//! swallowed into "no change" for single checks and "has changes" for batch
//! checks, so an unevaluable snapshot is still surfaced in bulk listings.

use crate::error::Result;
use crate::fs::paths::list_yaml_files_recursive;
use crate::yaml::cache::YamlCache;
use crate::yaml::{item_identifier, item_matches};
use futures_util::future::join_all;
use serde_yaml::Value;
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Batch checks run with full parallelism inside a chunk and strict
/// sequencing between chunks, bounding peak open file descriptors.
const BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Automations,
    Scripts,
    Lovelace,
    Esphome,
    Packages,
}

#[derive(Default)]
pub struct ChangeDetector {
    cache: YamlCache,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does this snapshot differ from the live tree in `category`?
    /// Evaluation errors are reported as "no change" (conservative-false).
    pub async fn snapshot_has_changes(
        &self,
        snapshot: &Path,
        live_config: &Path,
        category: Category,
    ) -> bool {
        self.try_snapshot_has_changes(snapshot, live_config, category)
            .await
            .unwrap_or(false)
    }

    /// Check many snapshots, chunked. Evaluation errors are reported as
    /// "has changes" (conservative-true) so a snapshot that could not be
    /// evaluated is never hidden from the operator. Backup-side cache
    /// entries are purged afterwards to bound memory.
    pub async fn check_snapshots_batch(
        &self,
        snapshots: &[PathBuf],
        live_config: &Path,
        category: Category,
    ) -> HashMap<PathBuf, bool> {
        let mut results = HashMap::with_capacity(snapshots.len());
        for chunk in snapshots.chunks(BATCH_SIZE) {
            let checks = chunk.iter().map(|snapshot| async move {
                let changed = self
                    .try_snapshot_has_changes(snapshot, live_config, category)
                    .await
                    .unwrap_or(true);
                (snapshot.clone(), changed)
            });
            results.extend(join_all(checks).await);
        }
        self.cache.purge_outside(live_config).await;
        results
    }

    async fn try_snapshot_has_changes(
        &self,
        snapshot: &Path,
        live_config: &Path,
        category: Category,
    ) -> Result<bool> {
        match category {
            Category::Automations => self.automations_changed(snapshot, live_config).await,
            Category::Scripts => self.scripts_changed(snapshot, live_config).await,
            Category::Lovelace => lovelace_changed(snapshot, live_config).await,
            Category::Esphome => tree_changed(snapshot, live_config, "esphome").await,
            Category::Packages => tree_changed(snapshot, live_config, "packages").await,
        }
    }

    /// Asymmetric list-of-records comparison keyed by `id`/`alias`.
    async fn automations_changed(&self, snapshot: &Path, live_config: &Path) -> Result<bool> {
        let backup = self.load_sequence(&snapshot.join("automations.yaml")).await?;
        let live = self.load_sequence(&live_config.join("automations.yaml")).await?;

        for backup_item in &backup {
            let Some(identifier) = item_identifier(backup_item) else {
                continue;
            };
            match live.iter().find(|l| item_matches(l, &identifier)) {
                None => return Ok(true), // deleted since the snapshot
                Some(live_item) => {
                    if serde_yaml::to_string(backup_item)? != serde_yaml::to_string(live_item)? {
                        return Ok(true); // modified
                    }
                }
            }
        }
        // Items only present live are additions; by design they do not count.
        Ok(false)
    }

    /// Asymmetric dict-of-records comparison keyed by the dict key.
    async fn scripts_changed(&self, snapshot: &Path, live_config: &Path) -> Result<bool> {
        let backup = self.load_mapping(&snapshot.join("scripts.yaml")).await?;
        let live = self.load_mapping(&live_config.join("scripts.yaml")).await?;

        for (key, backup_body) in &backup {
            match live.get(key) {
                None => return Ok(true),
                Some(live_body) => {
                    if serde_yaml::to_string(backup_body)? != serde_yaml::to_string(live_body)? {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    async fn load_sequence(&self, path: &Path) -> Result<Vec<Value>> {
        Ok(match self.cache.load(path).await? {
            Some(value) => value.as_sequence().cloned().unwrap_or_default(),
            None => Vec::new(),
        })
    }

    async fn load_mapping(&self, path: &Path) -> Result<serde_yaml::Mapping> {
        Ok(match self.cache.load(path).await? {
            Some(value) => value.as_mapping().cloned().unwrap_or_default(),
            None => serde_yaml::Mapping::new(),
        })
    }
}

/// Symmetric comparison of the `lovelace*` dashboard files under `.storage`.
async fn lovelace_changed(snapshot: &Path, live_config: &Path) -> Result<bool> {
    let backup_files = lovelace_file_names(&snapshot.join(".storage")).await;
    let live_files = lovelace_file_names(&live_config.join(".storage")).await;

    for name in backup_files.union(&live_files) {
        let rel = format!(".storage/{name}");
        let backup = read_optional(&snapshot.join(&rel)).await?;
        let live = read_optional(&live_config.join(&rel)).await?;
        if backup != live {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn lovelace_file_names(storage_dir: &Path) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Ok(mut entries) = tokio::fs::read_dir(storage_dir).await else {
        return names;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && name.starts_with("lovelace") {
            names.insert(name);
        }
    }
    names
}

/// Symmetric comparison over the recursive YAML tree union of both sides.
async fn tree_changed(snapshot: &Path, live_config: &Path, subdir: &str) -> Result<bool> {
    let backup_files: BTreeSet<String> =
        list_yaml_files_recursive(&snapshot.join(subdir)).into_iter().collect();
    let live_files: BTreeSet<String> =
        list_yaml_files_recursive(&live_config.join(subdir)).into_iter().collect();

    for rel in backup_files.union(&live_files) {
        let backup = read_optional(&snapshot.join(subdir).join(rel)).await?;
        let live = read_optional(&live_config.join(subdir).join(rel)).await?;
        if backup != live {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Smart-backup skip decision: has the live file changed relative to its
/// nearest copy in the chain? Absent from every snapshot means new, so it
/// must be stored. An unreadable live file is skipped (reported unchanged).
pub async fn has_file_changed(live_file: &Path, chain: &[PathBuf], relative: &str) -> bool {
    let live = match tokio::fs::read(live_file).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(file = %live_file.display(), error = %e, "Skipping unreadable source file");
            return false;
        }
    };

    for snapshot in chain {
        let candidate = snapshot.join(relative);
        match tokio::fs::read(&candidate).await {
            Ok(backup) => return backup != live,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            // Unreadable copy: store the file rather than trust it.
            Err(_) => return true,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TempDir) {
        (TempDir::new().unwrap(), TempDir::new().unwrap())
    }

    #[tokio::test]
    async fn test_automations_additions_ignored() {
        let (snapshot, live) = setup();
        fs::write(
            snapshot.path().join("automations.yaml"),
            "- id: a\n  trigger: 1\n",
        )
        .unwrap();
        fs::write(
            live.path().join("automations.yaml"),
            "- id: a\n  trigger: 1\n- id: b\n  trigger: 2\n",
        )
        .unwrap();

        let detector = ChangeDetector::new();
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Automations)
                .await
        );
    }

    #[tokio::test]
    async fn test_automations_deletion_flagged() {
        let (snapshot, live) = setup();
        fs::write(snapshot.path().join("automations.yaml"), "- id: a\n").unwrap();
        fs::write(live.path().join("automations.yaml"), "[]\n").unwrap();

        let detector = ChangeDetector::new();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Automations)
                .await
        );
    }

    #[tokio::test]
    async fn test_automations_modification_flagged() {
        let (snapshot, live) = setup();
        fs::write(
            snapshot.path().join("automations.yaml"),
            "- id: a\n  trigger: 1\n",
        )
        .unwrap();
        fs::write(
            live.path().join("automations.yaml"),
            "- id: a\n  trigger: 2\n",
        )
        .unwrap();

        let detector = ChangeDetector::new();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Automations)
                .await
        );
    }

    #[tokio::test]
    async fn test_automations_alias_identity() {
        let (snapshot, live) = setup();
        fs::write(
            snapshot.path().join("automations.yaml"),
            "- alias: Wake up\n  trigger: 1\n",
        )
        .unwrap();
        fs::write(
            live.path().join("automations.yaml"),
            "- alias: Wake up\n  trigger: 1\n",
        )
        .unwrap();

        let detector = ChangeDetector::new();
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Automations)
                .await
        );
    }

    #[tokio::test]
    async fn test_scripts_keyed_by_dict_key() {
        let (snapshot, live) = setup();
        fs::write(
            snapshot.path().join("scripts.yaml"),
            "wake_up:\n  sequence: []\n",
        )
        .unwrap();
        // Live has an extra script (ignored) and the shared one unchanged.
        fs::write(
            live.path().join("scripts.yaml"),
            "wake_up:\n  sequence: []\nnight:\n  sequence: []\n",
        )
        .unwrap();

        let detector = ChangeDetector::new();
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Scripts)
                .await
        );

        fs::write(live.path().join("scripts.yaml"), "night:\n  sequence: []\n").unwrap();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Scripts)
                .await
        );
    }

    #[tokio::test]
    async fn test_missing_files_are_not_errors() {
        let (snapshot, live) = setup();
        let detector = ChangeDetector::new();
        for category in [Category::Automations, Category::Scripts, Category::Lovelace] {
            assert!(
                !detector
                    .snapshot_has_changes(snapshot.path(), live.path(), category)
                    .await
            );
        }
    }

    #[tokio::test]
    async fn test_tree_comparison_is_symmetric() {
        let (snapshot, live) = setup();
        fs::create_dir(snapshot.path().join("esphome")).unwrap();
        fs::create_dir(live.path().join("esphome")).unwrap();

        // Backup-only file.
        fs::write(snapshot.path().join("esphome/device.yaml"), "a: 1\n").unwrap();
        let detector = ChangeDetector::new();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Esphome)
                .await
        );

        // Identical on both sides: unchanged.
        fs::write(live.path().join("esphome/device.yaml"), "a: 1\n").unwrap();
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Esphome)
                .await
        );

        // Live-only file counts too (unlike automations/scripts).
        fs::write(live.path().join("esphome/new.yaml"), "b: 2\n").unwrap();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Esphome)
                .await
        );
    }

    #[tokio::test]
    async fn test_lovelace_new_live_file_counts() {
        let (snapshot, live) = setup();
        fs::create_dir(snapshot.path().join(".storage")).unwrap();
        fs::create_dir(live.path().join(".storage")).unwrap();
        fs::write(snapshot.path().join(".storage/lovelace"), "{\"a\":1}").unwrap();
        fs::write(live.path().join(".storage/lovelace"), "{\"a\":1}").unwrap();

        let detector = ChangeDetector::new();
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Lovelace)
                .await
        );

        fs::write(live.path().join(".storage/lovelace.map"), "{}").unwrap();
        assert!(
            detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Lovelace)
                .await
        );
    }

    #[tokio::test]
    async fn test_parse_error_conservative_directions() {
        let (snapshot, live) = setup();
        fs::write(snapshot.path().join("automations.yaml"), "{broken: [\n").unwrap();
        fs::write(live.path().join("automations.yaml"), "[]\n").unwrap();

        let detector = ChangeDetector::new();
        // Single check: swallowed into "no change".
        assert!(
            !detector
                .snapshot_has_changes(snapshot.path(), live.path(), Category::Automations)
                .await
        );
        // Batch check: surfaced as "has changes".
        let results = detector
            .check_snapshots_batch(
                &[snapshot.path().to_path_buf()],
                live.path(),
                Category::Automations,
            )
            .await;
        assert_eq!(results[snapshot.path()], true);
    }

    #[tokio::test]
    async fn test_has_file_changed_chain_semantics() {
        let live = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let s1 = root.path().join("2026/08/2026-08-20-000000");
        let s2 = root.path().join("2026/08/2026-08-01-000000");
        fs::create_dir_all(&s1).unwrap();
        fs::create_dir_all(&s2).unwrap();

        let live_file = live.path().join("automations.yaml");
        fs::write(&live_file, "- id: a\n").unwrap();
        let chain = vec![s1.clone(), s2.clone()];

        // Absent everywhere: changed (new file, must be stored).
        assert!(has_file_changed(&live_file, &chain, "automations.yaml").await);

        // Identical copy deeper in the chain: unchanged.
        fs::write(s2.join("automations.yaml"), "- id: a\n").unwrap();
        assert!(!has_file_changed(&live_file, &chain, "automations.yaml").await);

        // Newest copy wins even when an older identical one exists.
        fs::write(s1.join("automations.yaml"), "- id: b\n").unwrap();
        assert!(has_file_changed(&live_file, &chain, "automations.yaml").await);
    }
}
