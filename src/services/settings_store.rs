//! JSON-file persistence for settings, scheduled jobs and credentials.
//!
//! Three small files live under the data directory. File names are a
//! compatibility contract with earlier releases and must not change.

use crate::error::Result;
use crate::models::settings::{AppSettings, HaCredentials, ScheduleFile};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const SETTINGS_FILE: &str = "docker-app-settings.json";
const SCHEDULE_FILE: &str = "scheduled-jobs.json";
const CREDENTIALS_FILE: &str = "docker-ha-credentials.json";

pub struct SettingsStore {
    data_dir: PathBuf,
    cache: Mutex<Option<AppSettings>>,
}

impl SettingsStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            cache: Mutex::new(None),
        }
    }

    /// Current settings. Missing or unreadable files yield the defaults;
    /// partial files are merged over them via serde defaults.
    pub async fn load(&self) -> AppSettings {
        let mut cache = self.cache.lock().await;
        if let Some(settings) = cache.as_ref() {
            return settings.clone();
        }
        let settings: AppSettings = read_json(&self.data_dir.join(SETTINGS_FILE))
            .await
            .unwrap_or_default();
        *cache = Some(settings.clone());
        settings
    }

    pub async fn save(&self, settings: &AppSettings) -> Result<()> {
        write_json(&self.data_dir, SETTINGS_FILE, settings).await?;
        *self.cache.lock().await = Some(settings.clone());
        Ok(())
    }

    pub async fn load_jobs(&self) -> ScheduleFile {
        read_json(&self.data_dir.join(SCHEDULE_FILE))
            .await
            .unwrap_or_default()
    }

    pub async fn save_jobs(&self, jobs: &ScheduleFile) -> Result<()> {
        write_json(&self.data_dir, SCHEDULE_FILE, jobs).await
    }

    pub async fn load_credentials(&self) -> Option<HaCredentials> {
        read_json(&self.data_dir.join(CREDENTIALS_FILE)).await
    }

    pub async fn save_credentials(&self, credentials: &HaCredentials) -> Result<()> {
        write_json(&self.data_dir, CREDENTIALS_FILE, credentials).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt settings file");
            None
        }
    }
}

async fn write_json<T: serde::Serialize>(data_dir: &Path, name: &str, value: &T) -> Result<()> {
    tokio::fs::create_dir_all(data_dir).await?;
    let raw = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(data_dir.join(name), raw).await?;
    Ok(())
}
