//! Safe path resolution and YAML tree discovery.
//!
//! User-supplied file names are always relative to a fixed root (the live
//! config tree or a snapshot directory); `resolve_within` rejects anything
//! that would escape it. Resolution is purely lexical — symlinks are never
//! followed, they are skipped during discovery instead.

use crate::error::{Result, TimeMachineError};
use crate::models::snapshot::is_snapshot_name;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// How deep `dir_contains_snapshots` probes a candidate backup root.
const SNAPSHOT_PROBE_DEPTH: usize = 5;

pub fn is_yaml_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".yaml") || lower.ends_with(".yml")
}

/// Join `relative` onto `base`, refusing empty input, absolute paths and
/// any traversal that resolves to `base` itself or outside of it.
pub fn resolve_within(base: &Path, relative: &str) -> Result<PathBuf> {
    let trimmed = relative.trim();
    if trimmed.is_empty() {
        return Err(TimeMachineError::InvalidPath(relative.to_string()));
    }

    let rel = Path::new(trimmed);
    if rel.is_absolute() {
        return Err(TimeMachineError::InvalidPath(relative.to_string()));
    }

    let mut resolved = base.to_path_buf();
    let mut depth = 0usize;
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(TimeMachineError::InvalidPath(relative.to_string()));
                }
                depth -= 1;
                resolved.pop();
            }
            Component::Normal(part) => {
                depth += 1;
                resolved.push(part);
            }
            _ => return Err(TimeMachineError::InvalidPath(relative.to_string())),
        }
    }

    if depth == 0 {
        // Everything cancelled out; the target is the base directory.
        return Err(TimeMachineError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Collect all `.yaml`/`.yml` files under `root`, as sorted paths relative
/// to `root`. Symlinks and AppleDouble (`._*`) files are skipped. A missing
/// root yields an empty list.
pub fn list_yaml_files_recursive(root: &Path) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let Ok(entry) = entry else { continue };
        if entry.path_is_symlink() || !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with("._") || !is_yaml_file(&name) {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.push(relative.to_string_lossy().into_owned());
        }
    }
    files.sort();
    files
}

/// Recursive probe used when an operator points the app at a backup root:
/// does this tree contain any YAML file or snapshot-named directory within
/// the first few levels?
pub fn dir_contains_snapshots(root: &Path) -> bool {
    probe_for_snapshots(root, 0)
}

fn probe_for_snapshots(dir: &Path, depth: usize) -> bool {
    if depth > SNAPSHOT_PROBE_DEPTH {
        return false;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };

    let mut subdirs = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        match entry.file_type() {
            Ok(t) if t.is_dir() => {
                if is_snapshot_name(&name) {
                    return true;
                }
                subdirs.push(entry.path());
            }
            Ok(t) if t.is_file() => {
                if is_yaml_file(&name) {
                    return true;
                }
            }
            _ => {}
        }
    }

    subdirs
        .iter()
        .any(|sub| probe_for_snapshots(sub, depth + 1))
}

/// Outcome of validating an operator-supplied directory path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    Valid,
    NotFound,
    NotADirectory,
    /// Live config tree without an `automations.yaml`.
    MissingAutomations,
    /// Backup tree with no snapshot directories or YAML files in reach.
    NoBackupsFound,
}

/// Validate a live config root: must be a directory holding `automations.yaml`.
pub fn validate_live_path(path: &Path) -> PathStatus {
    match std::fs::metadata(path) {
        Err(_) => PathStatus::NotFound,
        Ok(meta) if !meta.is_dir() => PathStatus::NotADirectory,
        Ok(_) => {
            if path.join("automations.yaml").is_file() {
                PathStatus::Valid
            } else {
                PathStatus::MissingAutomations
            }
        }
    }
}

/// Validate a backup root: must be a directory with snapshots somewhere in
/// its first five levels.
pub fn validate_backup_root(path: &Path) -> PathStatus {
    match std::fs::metadata(path) {
        Err(_) => PathStatus::NotFound,
        Ok(meta) if !meta.is_dir() => PathStatus::NotADirectory,
        Ok(_) => {
            if dir_contains_snapshots(path) {
                PathStatus::Valid
            } else {
                PathStatus::NoBackupsFound
            }
        }
    }
}
