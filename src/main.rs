use clap::{Parser, Subcommand, ValueEnum};
use ha_timemachine::config::{
    effective_path, AppConfig, DEFAULT_BACKUP_ROOT, DEFAULT_LIVE_CONFIG_PATH,
};
use ha_timemachine::models::snapshot::SnapshotKind;
use ha_timemachine::services::backup::{perform_backup, BackupRequest};
use ha_timemachine::services::changes::{Category, ChangeDetector};
use ha_timemachine::services::reload::{call_service, HaAuth};
use ha_timemachine::services::restore;
use ha_timemachine::services::retention;
use ha_timemachine::services::scheduler::BackupScheduler;
use ha_timemachine::services::settings_store::SettingsStore;
use ha_timemachine::services::snapshot_index::list_snapshots;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::signal;

#[derive(Parser)]
#[command(name = "ha-timemachine", version, about = "Backup time machine for Home Assistant configurations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler daemon, executing jobs from the schedule file
    Serve,
    /// Take one backup now
    Backup {
        /// Only store files that changed since the previous snapshot
        #[arg(long)]
        smart: bool,
        /// Delete all but the newest N snapshots afterwards
        #[arg(long, value_name = "N")]
        max_backups: Option<usize>,
        /// IANA timezone for the snapshot name (e.g. Europe/Berlin)
        #[arg(long)]
        timezone: Option<String>,
    },
    /// Delete all but the newest N snapshots
    Prune {
        #[arg(value_name = "N")]
        max: usize,
    },
    /// List snapshots, newest first
    List,
    /// Show which snapshots differ from the live configuration
    Check {
        #[arg(value_enum)]
        category: CategoryArg,
    },
    /// Restore one automation or script from a snapshot
    RestoreItem {
        #[arg(value_enum)]
        category: ItemCategoryArg,
        /// Snapshot directory name, e.g. 2026-08-01-031500
        snapshot: String,
        /// The item's id (or alias for automations)
        id: String,
        /// Skip the full safety backup taken before writing
        #[arg(long)]
        no_safety_backup: bool,
    },
    /// Restore a whole file (dashboard, esphome or package) from a snapshot
    RestoreFile {
        /// Snapshot directory name
        snapshot: String,
        /// Path relative to the configuration root, e.g. esphome/node.yaml
        relative: String,
        #[arg(long)]
        no_safety_backup: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Automations,
    Scripts,
    Lovelace,
    Esphome,
    Packages,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Automations => Category::Automations,
            CategoryArg::Scripts => Category::Scripts,
            CategoryArg::Lovelace => Category::Lovelace,
            CategoryArg::Esphome => Category::Esphome,
            CategoryArg::Packages => Category::Packages,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemCategoryArg {
    Automations,
    Scripts,
}

impl From<ItemCategoryArg> for restore::StructuredKind {
    fn from(value: ItemCategoryArg) -> Self {
        match value {
            ItemCategoryArg::Automations => restore::StructuredKind::Automations,
            ItemCategoryArg::Scripts => restore::StructuredKind::Scripts,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    let store = SettingsStore::new(config.data_dir.clone());
    let settings = store.load().await;

    // Environment overrides beat stored settings; stored settings beat the
    // compiled-in defaults.
    let live_config = effective_path(
        config.live_config_path.as_deref(),
        &settings.live_config_path,
        DEFAULT_LIVE_CONFIG_PATH,
    );
    let backup_root = effective_path(
        config.backup_root.as_deref(),
        &settings.backup_folder_path,
        DEFAULT_BACKUP_ROOT,
    );

    match cli.command {
        Command::Serve => {
            tracing::info!(
                data_dir = %config.data_dir.display(),
                backup_root = %backup_root.display(),
                "Starting scheduler daemon"
            );

            let scheduler = BackupScheduler::new().await?;
            let schedule = store.load_jobs().await;
            if let Err(e) = scheduler.init_schedules(&schedule, &settings).await {
                tracing::warn!(error = %e, "Failed to initialize schedules");
            }
            scheduler.start().await?;

            shutdown_signal().await;
            tracing::info!("Shutting down...");
            if let Err(e) = scheduler.shutdown().await {
                tracing::warn!(error = %e, "Scheduler shutdown error");
            }
        }

        Command::Backup {
            smart,
            max_backups,
            timezone,
        } => {
            let timezone = match timezone {
                Some(name) => Some(
                    chrono_tz::Tz::from_str(&name)
                        .map_err(|_| anyhow::anyhow!("unknown timezone: {name}"))?,
                ),
                None => None,
            };
            let dir = perform_backup(&BackupRequest {
                live_config_path: live_config,
                backup_root,
                source: "manual".into(),
                max_backups,
                timezone,
                smart_backup: smart || settings.smart_backup_enabled,
                esphome_enabled: settings.esphome_enabled,
                packages_enabled: settings.packages_enabled,
            })
            .await?;
            println!("{}", dir.display());
        }

        Command::Prune { max } => {
            let removed = retention::prune(&backup_root, max).await?;
            println!("removed {removed} snapshot(s)");
        }

        Command::List => {
            for snapshot in list_snapshots(&backup_root) {
                let kind = match snapshot.kind().await {
                    SnapshotKind::Full => "full",
                    SnapshotKind::Incremental(_) => "incremental",
                };
                println!("{}  {}", snapshot.name, kind);
            }
        }

        Command::Check { category } => {
            let snapshots = list_snapshots(&backup_root);
            let paths: Vec<PathBuf> = snapshots.iter().map(|s| s.path.clone()).collect();
            let detector = ChangeDetector::new();
            let results = detector
                .check_snapshots_batch(&paths, &live_config, category.into())
                .await;
            for snapshot in &snapshots {
                let marker = if results.get(&snapshot.path).copied().unwrap_or(true) {
                    "changed"
                } else {
                    "unchanged"
                };
                println!("{}  {}", snapshot.name, marker);
            }
        }

        Command::RestoreItem {
            category,
            snapshot,
            id,
            no_safety_backup,
        } => {
            let snapshot_dir = find_snapshot(&backup_root, &snapshot)?;
            if !no_safety_backup {
                let dir = restore::safety_backup(&live_config, &backup_root).await?;
                tracing::info!(snapshot = %dir.display(), "Safety backup created");
            }
            let kind: restore::StructuredKind = category.into();
            restore::restore_structured_item(&live_config, &snapshot_dir, kind, &id).await?;
            trigger_reload(&store, kind).await;
            println!("restored {id}");
        }

        Command::RestoreFile {
            snapshot,
            relative,
            no_safety_backup,
        } => {
            let snapshot_dir = find_snapshot(&backup_root, &snapshot)?;
            if !no_safety_backup {
                let dir = restore::safety_backup(&live_config, &backup_root).await?;
                tracing::info!(snapshot = %dir.display(), "Safety backup created");
            }
            restore::restore_raw_file(&live_config, &snapshot_dir, &relative).await?;
            println!("restored {relative}");
        }
    }

    Ok(())
}

fn find_snapshot(backup_root: &PathBuf, name: &str) -> anyhow::Result<PathBuf> {
    list_snapshots(backup_root)
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.path)
        .ok_or_else(|| anyhow::anyhow!("snapshot not found: {name}"))
}

async fn trigger_reload(store: &SettingsStore, kind: restore::StructuredKind) {
    let stored = store.load_credentials().await;
    let Some(auth) = HaAuth::resolve(stored.as_ref()) else {
        tracing::info!("No Home Assistant credentials, skipping reload");
        return;
    };
    let service = match kind {
        restore::StructuredKind::Automations => "automation.reload",
        restore::StructuredKind::Scripts => "script.reload",
    };
    call_service(&auth, service);
    // Give the spawned request a moment before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
