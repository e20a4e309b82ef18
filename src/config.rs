use std::path::{Path, PathBuf};

pub const DEFAULT_LIVE_CONFIG_PATH: &str = "/config";
pub const DEFAULT_BACKUP_ROOT: &str = "/media/timemachine";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Persistent state directory (settings, credentials, schedule file).
    pub data_dir: PathBuf,
    /// Set only when `LIVE_CONFIG_PATH` is present in the environment.
    pub live_config_path: Option<PathBuf>,
    /// Set only when `BACKUP_ROOT` is present in the environment.
    pub backup_root: Option<PathBuf>,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: data_dir_from_env(),
            live_config_path: std::env::var("LIVE_CONFIG_PATH").ok().map(PathBuf::from),
            backup_root: std::env::var("BACKUP_ROOT").ok().map(PathBuf::from),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        }
    }
}

/// Pick the effective directory: an environment override wins even when it
/// spells out the default value, stored settings beat the compiled-in
/// default, and the default is last.
pub fn effective_path(env_override: Option<&Path>, stored: &str, default: &str) -> PathBuf {
    match env_override {
        Some(path) => path.to_path_buf(),
        None if !stored.is_empty() => PathBuf::from(stored),
        None => PathBuf::from(default),
    }
}

/// Addon installs mount a persistent `/data` volume; anything else falls
/// back to a `data` directory next to the working directory.
fn data_dir_from_env() -> PathBuf {
    if let Ok(dir) = std::env::var("TIMEMACHINE_DATA_DIR") {
        return PathBuf::from(dir);
    }
    let addon_root = PathBuf::from("/data");
    if addon_root.is_dir() {
        addon_root.join("ha-timemachine")
    } else {
        PathBuf::from("data")
    }
}
