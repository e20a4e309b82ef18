//! Snapshot enumeration under a backup root.
//!
//! Two layouts coexist on real installs: the canonical `YYYY/MM/<name>`
//! hierarchy written by the backup engine, and legacy flat or hand-arranged
//! nesting from older releases. `list_snapshots` tolerates both via a
//! depth-first scan; `canonical_chain` is the fast path over the canonical
//! layout only, used by smart backup and chain resolution.

use crate::models::snapshot::{
    is_dashed_snapshot_name, is_snapshot_name, looks_like_snapshot_dir, Snapshot,
};
use std::path::{Path, PathBuf};

/// Category directories that exist inside snapshots (and inside the live
/// tree); they are scanned into but never classified as snapshots.
pub const SKIP_DIRS: [&str; 3] = ["esphome", ".storage", "packages"];

/// Enumerate every snapshot directory under `root`, newest first
/// (descending name order — zero-padded timestamp names make string order
/// chronological). A missing root is an empty chain, not an error.
pub fn list_snapshots(root: &Path) -> Vec<Snapshot> {
    let mut found = Vec::new();
    scan_dir(root, &mut found);
    found.sort_by(|a, b| b.name.cmp(&a.name));
    found
}

fn scan_dir(dir: &Path, found: &mut Vec<Snapshot>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let skip_listed = SKIP_DIRS.contains(&name.as_str());

        if !skip_listed && (is_snapshot_name(&name) || looks_like_snapshot_dir(&path)) {
            let mtime = entry.metadata().ok().and_then(|m| m.modified().ok());
            found.push(Snapshot::new(path.clone(), mtime));
        }

        // Keep descending regardless, so nested layouts like
        // `<root>/2026/08/<name>` are reached.
        scan_dir(&path, found);
    }
}

/// Snapshot directories in the canonical `YYYY/MM/<dashed-name>` layout,
/// newest first. Smart backup and restore-time chain walks assume this
/// fixed three-level shape.
pub fn canonical_chain(root: &Path) -> Vec<PathBuf> {
    let mut chain = Vec::new();

    for year in sorted_dir_names_desc(root, |n| n.len() == 4 && all_digits(n)) {
        let year_path = root.join(&year);
        for month in sorted_dir_names_desc(&year_path, |n| n.len() == 2 && all_digits(n)) {
            let month_path = year_path.join(&month);
            for name in sorted_dir_names_desc(&month_path, |n| is_dashed_snapshot_name(n)) {
                chain.push(month_path.join(name));
            }
        }
    }
    chain
}

fn all_digits(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

fn sorted_dir_names_desc(dir: &Path, accept: impl Fn(&str) -> bool) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| accept(n))
        .collect();
    names.sort_by(|a, b| b.cmp(a));
    names
}
