//! Custom error types for the time machine core.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeMachineError {
    /// A user-supplied relative path was empty or escaped its allowed root.
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Directory not found: {0}")]
    DirNotFound(PathBuf),

    #[error("Failed to create backup directory: {path}")]
    BackupDirCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup directory is not writable: {path}")]
    BackupDirUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Item '{0}' not found in backup")]
    ItemNotFoundInBackup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TimeMachineError>;
