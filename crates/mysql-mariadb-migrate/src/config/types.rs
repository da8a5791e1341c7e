//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_gb = sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (MariaDB).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory for per-table `.log` / `.err` files.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory where create-table scripts are written (disabled if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ddl_dir: Option<PathBuf>,

    /// JSON progress file for resumable runs (progress is not persisted if unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Rows per batch (one execute + commit unit).
    #[serde(default = "default_transaction_size")]
    pub transaction_size: u64,

    /// Committed batches between throughput/ETA recalculations.
    #[serde(default = "default_batch_recalc_interval")]
    pub batch_recalc_interval: u64,

    /// Replay a failed batch row by row.
    #[serde(default = "default_true")]
    pub retry_on_errors: bool,

    /// Truncate every target table before inserting.
    #[serde(default)]
    pub overwrite_tables: bool,

    /// Truncate partially migrated tables instead of continuing them.
    #[serde(default)]
    pub overwrite_partially_migrated: bool,

    /// Number of tables migrated concurrently. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Plan only: every table is skipped.
    #[serde(default)]
    pub dry_run: bool,

    /// Move rows (when false every table is skipped).
    #[serde(default = "default_true")]
    pub migrate_data: bool,

    /// What a batch failure that cannot be retried does to the job.
    #[serde(default)]
    pub on_batch_failure: BatchFailurePolicy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            ddl_dir: None,
            state_file: None,
            transaction_size: default_transaction_size(),
            batch_recalc_interval: default_batch_recalc_interval(),
            retry_on_errors: true,
            overwrite_tables: false,
            overwrite_partially_migrated: false,
            workers: None,
            dry_run: false,
            migrate_data: true,
            on_batch_failure: BatchFailurePolicy::default(),
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Each worker holds two connections for its whole table, keep it modest
        if self.workers.is_none() {
            let workers = resources.cpu_cores.saturating_sub(2).clamp(1, 16);
            self.workers = Some(workers);
        }

        info!(
            "Auto-tuned config: workers={}, transaction_size={}",
            self.get_workers(),
            self.transaction_size
        );

        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(1)
    }

    /// Whether rows are actually moved in this run.
    pub fn moves_data(&self) -> bool {
        self.migrate_data && !self.dry_run
    }

    /// Progress is mirrored to the terminal only for single-worker runs.
    pub fn is_multi_threaded(&self) -> bool {
        self.get_workers() > 1
    }
}

/// Handling of a batch failure that is not (or no longer) retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFailurePolicy {
    /// Roll back, log and continue with the next row. The failed rows are lost.
    #[default]
    Continue,

    /// Roll back and abort the table.
    Abort,
}

// Default value functions for serde
fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_transaction_size() -> u64 {
    10_000
}

fn default_batch_recalc_interval() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
