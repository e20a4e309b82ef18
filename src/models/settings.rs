//! Persisted settings records: app settings, schedule file, HA credentials.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::{DEFAULT_BACKUP_ROOT, DEFAULT_LIVE_CONFIG_PATH};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub live_config_path: String,
    pub backup_folder_path: String,
    pub theme: String,
    pub language: String,
    pub esphome_enabled: bool,
    pub packages_enabled: bool,
    pub smart_backup_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            live_config_path: DEFAULT_LIVE_CONFIG_PATH.into(),
            backup_folder_path: DEFAULT_BACKUP_ROOT.into(),
            theme: "dark".into(),
            language: "en".into(),
            esphome_enabled: false,
            packages_enabled: false,
            smart_backup_enabled: false,
        }
    }
}

/// One scheduled backup job as stored in `scheduled-jobs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledJob {
    pub cron_expression: String,
    pub enabled: bool,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub live_config_path: Option<String>,
    #[serde(default)]
    pub backup_folder_path: Option<String>,
    #[serde(default)]
    pub max_backups_enabled: bool,
    #[serde(default)]
    pub max_backups_count: usize,
    #[serde(default)]
    pub smart_backup_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleFile {
    #[serde(default)]
    pub jobs: HashMap<String, ScheduledJob>,
}

/// Home Assistant credentials saved outside supervisor mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaCredentials {
    #[serde(default)]
    pub home_assistant_url: Option<String>,
    #[serde(default)]
    pub long_lived_access_token: Option<String>,
}
