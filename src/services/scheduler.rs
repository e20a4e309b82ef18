//! Cron-driven scheduled backups.
//!
//! Each job from the schedule file becomes one cron entry. Job settings
//! override the global settings per field, so a job can point at its own
//! backup root or force smart mode without touching the global config.

use crate::models::settings::{AppSettings, ScheduleFile, ScheduledJob};
use crate::services::backup::{perform_backup, BackupRequest};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    registered: Mutex<HashMap<String, Uuid>>,
}

impl BackupScheduler {
    pub async fn new() -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            registered: Mutex::new(HashMap::new()),
        })
    }

    /// Register (or re-register) one job. Disabled jobs are unregistered
    /// and skipped.
    pub async fn schedule_job(
        &self,
        job_id: &str,
        job: &ScheduledJob,
        settings: &AppSettings,
    ) -> anyhow::Result<()> {
        self.unschedule_job(job_id).await;
        if !job.enabled {
            tracing::info!(job_id = %job_id, "Job disabled, not scheduling");
            return Ok(());
        }

        let request = request_for(job, settings);
        let timezone = job
            .timezone
            .as_deref()
            .and_then(|name| match chrono_tz::Tz::from_str(name) {
                Ok(tz) => Some(tz),
                Err(_) => {
                    tracing::warn!(job_id = %job_id, timezone = name, "Unknown timezone, scheduling in UTC");
                    None
                }
            });

        let jid = job_id.to_string();
        let run = move |_uuid, _lock| {
            let request = request.clone();
            let jid = jid.clone();
            Box::pin(async move {
                tracing::info!(job_id = %jid, "Starting scheduled backup");
                match perform_backup(&request).await {
                    Ok(dir) => {
                        tracing::info!(job_id = %jid, snapshot = %dir.display(), "Scheduled backup complete");
                    }
                    Err(e) => {
                        tracing::error!(job_id = %jid, error = %e, "Scheduled backup failed");
                    }
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        };

        let cron_job = match timezone {
            Some(tz) => Job::new_async_tz(job.cron_expression.as_str(), tz, run)?,
            None => Job::new_async(job.cron_expression.as_str(), run)?,
        };

        let uuid = self.scheduler.lock().await.add(cron_job).await?;
        self.registered.lock().await.insert(job_id.to_string(), uuid);
        tracing::info!(job_id = %job_id, cron = %job.cron_expression, "Job scheduled");
        Ok(())
    }

    pub async fn unschedule_job(&self, job_id: &str) {
        if let Some(uuid) = self.registered.lock().await.remove(job_id) {
            if let Err(e) = self.scheduler.lock().await.remove(&uuid).await {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to remove scheduled job");
            }
        }
    }

    /// Register everything in the schedule file. Per-job failures (bad cron
    /// expressions above all) are logged and do not block the others.
    pub async fn init_schedules(
        &self,
        schedule: &ScheduleFile,
        settings: &AppSettings,
    ) -> anyhow::Result<usize> {
        let mut count = 0;
        for (job_id, job) in &schedule.jobs {
            if !job.enabled || job.cron_expression.is_empty() {
                continue;
            }
            match self.schedule_job(job_id, job, settings).await {
                Ok(()) => count += 1,
                Err(e) => {
                    tracing::error!(job_id = %job_id, cron = %job.cron_expression, error = %e, "Failed to schedule job");
                }
            }
        }
        tracing::info!(count, "Cron schedules initialized");
        Ok(count)
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        Ok(())
    }
}

/// Merge a job's overrides over the global settings into a backup request.
fn request_for(job: &ScheduledJob, settings: &AppSettings) -> BackupRequest {
    BackupRequest {
        live_config_path: PathBuf::from(
            job.live_config_path
                .as_deref()
                .unwrap_or(&settings.live_config_path),
        ),
        backup_root: PathBuf::from(
            job.backup_folder_path
                .as_deref()
                .unwrap_or(&settings.backup_folder_path),
        ),
        source: "scheduled".into(),
        max_backups: job.max_backups_enabled.then_some(job.max_backups_count),
        timezone: job
            .timezone
            .as_deref()
            .and_then(|name| chrono_tz::Tz::from_str(name).ok()),
        smart_backup: job.smart_backup_enabled || settings.smart_backup_enabled,
        esphome_enabled: settings.esphome_enabled,
        packages_enabled: settings.packages_enabled,
    }
}
