//! Migration orchestrator - runs one engine per table, bounded by the worker count.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::audit::{AuditLog, FileAuditLog};
use crate::config::Config;
use crate::core::{ConnectionProvider, TableDescriptor};
use crate::drivers::mysql::MysqlConnectionProvider;
use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::state::{FileProgressStore, NoOpStateBackend, ProgressStore};
use crate::transfer::{
    BatchMigrationEngine, EngineConfig, JobMode, MigrationOutcome, OutcomeStatus,
};

/// Migration orchestrator.
///
/// Owns no mutable migration state: every table job gets its own engine and
/// connections, and shares only the config, the provider, the progress store
/// and the audit log.
pub struct Orchestrator {
    config: Arc<Config>,
    provider: Arc<dyn ConnectionProvider>,
    store: Arc<dyn ProgressStore>,
    audit: Arc<dyn AuditLog>,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: String,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total tables processed.
    pub tables_total: usize,

    /// Tables migrated in this run.
    pub tables_migrated: usize,

    /// Tables skipped.
    pub tables_skipped: usize,

    /// Tables that failed.
    pub tables_failed: usize,

    /// Total rows migrated.
    pub rows_migrated: u64,

    /// Rows of failed batches that were not written.
    pub rows_lost: u64,

    /// Average throughput (rows/second).
    pub rows_per_second: u64,

    /// List of failed table names.
    pub failed_tables: Vec<String>,

    /// Per-table outcomes, in catalog order.
    pub tables: Vec<MigrationOutcome>,
}

impl MigrationSummary {
    fn new(
        run_id: String,
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        tables: Vec<MigrationOutcome>,
    ) -> Self {
        let count = |status: OutcomeStatus| tables.iter().filter(|o| o.status == status).count();
        let rows_migrated: u64 = tables.iter().map(|o| o.rows_migrated).sum();
        let rows_lost: u64 = tables.iter().map(|o| o.rows_lost).sum();
        let failed_tables: Vec<String> = tables
            .iter()
            .filter(|o| o.is_failed())
            .map(|o| o.table.clone())
            .collect();

        let rows_per_second = if duration_seconds > 0.0 {
            (rows_migrated as f64 / duration_seconds) as u64
        } else {
            rows_migrated
        };

        Self {
            run_id,
            status: if failed_tables.is_empty() {
                "completed".to_string()
            } else {
                "failed".to_string()
            },
            duration_seconds,
            started_at,
            completed_at: Utc::now(),
            tables_total: tables.len(),
            tables_migrated: count(OutcomeStatus::Completed),
            tables_skipped: count(OutcomeStatus::Skipped),
            tables_failed: failed_tables.len(),
            rows_migrated,
            rows_lost,
            rows_per_second,
            failed_tables,
            tables,
        }
    }

    /// Whether every table completed or was skipped.
    pub fn is_success(&self) -> bool {
        self.failed_tables.is_empty()
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Table job either decided up front or running on a task.
enum Slot {
    Decided(MigrationOutcome),
    Running(String, JoinHandle<MigrationOutcome>),
}

impl Orchestrator {
    pub fn new(
        config: Config,
        provider: Arc<dyn ConnectionProvider>,
        store: Arc<dyn ProgressStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            store,
            audit,
        }
    }

    /// Build an orchestrator with the MySQL/MariaDB drivers, file audit log
    /// and the configured progress store.
    pub fn from_config(config: Config) -> Result<Self> {
        let provider: Arc<dyn ConnectionProvider> = Arc::new(MysqlConnectionProvider::new(
            config.source.clone(),
            config.target.clone(),
        ));

        let store: Arc<dyn ProgressStore> = match &config.migration.state_file {
            Some(path) => Arc::new(FileProgressStore::open(path, &config.fingerprint())?),
            None => Arc::new(NoOpStateBackend::new()),
        };
        info!("Using {} progress store", store.backend_type());

        let audit: Arc<dyn AuditLog> = Arc::new(FileAuditLog::new(
            &config.migration.log_dir,
            config.migration.ddl_dir.clone(),
        )?);

        Ok(Self::new(config, provider, store, audit))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Migrate every table. Per-table failures are reported in the summary.
    pub async fn run(&self, tables: Vec<TableDescriptor>) -> MigrationSummary {
        let started_at = Utc::now();
        let start = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        let workers = self.config.migration.get_workers();
        info!(
            "Starting migration run {}: {} tables, {} workers, {}",
            run_id,
            tables.len(),
            workers,
            self.provider.describe()
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let engine_config = EngineConfig::from(&self.config.migration);
        let mut slots = Vec::with_capacity(tables.len());

        for table in tables {
            let name = table.full_name();

            if let Some(outcome) = self.pre_check(&name).await {
                slots.push(Slot::Decided(outcome));
                continue;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    slots.push(Slot::Decided(MigrationOutcome::aborted(
                        name,
                        JobMode::Full,
                        e.to_string(),
                    )));
                    continue;
                }
            };

            let engine = BatchMigrationEngine::new(
                table,
                self.provider.clone(),
                ProgressTracker::new(self.store.clone(), name.clone()),
                self.audit.clone(),
                engine_config.clone(),
            );

            let handle = tokio::spawn(async move {
                let outcome = engine.run().await;
                drop(permit);
                outcome
            });
            slots.push(Slot::Running(name, handle));
        }

        let mut outcomes = Vec::with_capacity(slots.len());
        for slot in slots {
            let outcome = match slot {
                Slot::Decided(outcome) => outcome,
                Slot::Running(name, handle) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("{}: task panicked - {}", name, e);
                        self.audit
                            .global_error(&format!("{}: task panicked - {}", name, e));
                        MigrationOutcome::aborted(name, JobMode::Full, format!("Task panicked: {}", e))
                    }
                },
            };

            match outcome.status {
                OutcomeStatus::Completed => info!(
                    "{}: completed ({} rows, {:?})",
                    outcome.table, outcome.rows_migrated, outcome.mode
                ),
                OutcomeStatus::Skipped => info!("{}: skipped", outcome.table),
                OutcomeStatus::Aborted => error!(
                    "{}: failed - {}",
                    outcome.table,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            }
            outcomes.push(outcome);
        }

        let summary = MigrationSummary::new(
            run_id,
            started_at,
            start.elapsed().as_secs_f64(),
            outcomes,
        );
        info!(
            "Migration run {} {}: {} migrated, {} skipped, {} failed, {} rows in {:.1}s",
            summary.run_id,
            summary.status,
            summary.tables_migrated,
            summary.tables_skipped,
            summary.tables_failed,
            summary.rows_migrated,
            summary.duration_seconds
        );
        summary
    }

    /// Decide tables that need no engine. `None` means migrate.
    async fn pre_check(&self, name: &str) -> Option<MigrationOutcome> {
        let migration = &self.config.migration;
        // Engines skip on their own when no data moves
        if !migration.moves_data() || migration.overwrite_tables {
            return None;
        }

        match self.store.prior_migration(name).await {
            Ok(prior) if prior.is_completed() => {
                let line = format!("Processing Table {:<63}--> Already Migrated, SKIPPED!", name);
                info!("{}", line);
                self.audit.log(name, &line);
                Some(MigrationOutcome::skipped(name))
            }
            Ok(_) => None,
            Err(e) => {
                warn!("{}: cannot read prior progress: {}", name, e);
                self.audit
                    .global_error(&format!("{}: cannot read prior progress: {}", name, e));
                Some(MigrationOutcome::aborted(name, JobMode::Skip, e.to_string()))
            }
        }
    }

    /// Open and close one source and one target connection.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let (source_connected, source_error) = match self.provider.open_source().await {
            Ok(mut source) => {
                source.close().await;
                (true, None)
            }
            Err(e) => (false, Some(e.to_string())),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let (target_connected, target_error) = match self.provider.open_target().await {
            Ok(mut target) => {
                target.close().await;
                (true, None)
            }
            Err(e) => (false, Some(e.to_string())),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy: source_connected && target_connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};
    use crate::core::ColumnMeta;
    use crate::state::PriorMigration;
    use crate::testing::{descriptor, int_rows, MemoryAuditLog, MemoryProgressStore, MemoryProvider};

    fn config(workers: usize) -> Config {
        Config {
            source: SourceConfig {
                host: "mysql.internal".into(),
                port: 3306,
                database: "shop".into(),
                user: "exodus".into(),
                password: String::new(),
                ssl_mode: "disable".into(),
            },
            target: TargetConfig {
                host: "mariadb.internal".into(),
                port: 3306,
                database: "shop".into(),
                user: "exodus".into(),
                password: String::new(),
                ssl_mode: "disable".into(),
            },
            migration: MigrationConfig {
                workers: Some(workers),
                transaction_size: 4,
                ..MigrationConfig::default()
            },
        }
    }

    fn provider_with(tables: &[(&str, i64)]) -> (MemoryProvider, Vec<TableDescriptor>) {
        let provider = MemoryProvider::default();
        let descriptors = tables
            .iter()
            .map(|(name, rows)| {
                let table = descriptor(name);
                provider.source.add_dataset(
                    &table.select_script,
                    vec![ColumnMeta::new("id", "INTEGER")],
                    int_rows(1..=*rows),
                );
                table
            })
            .collect();
        (provider, descriptors)
    }

    #[tokio::test]
    async fn test_runs_every_table_concurrently() {
        let (provider, tables) = provider_with(&[("orders", 10), ("customers", 3), ("items", 0)]);
        let audit = Arc::new(MemoryAuditLog::default());
        let store = Arc::new(MemoryProgressStore::default());
        let orchestrator = Orchestrator::new(
            config(2),
            Arc::new(provider.clone()),
            store.clone(),
            audit.clone(),
        );

        let summary = orchestrator.run(tables.clone()).await;

        assert!(summary.is_success());
        assert_eq!(summary.tables_total, 3);
        assert_eq!(summary.tables_migrated, 3);
        assert_eq!(summary.rows_migrated, 13);
        let names: Vec<_> = summary.tables.iter().map(|o| o.table.as_str()).collect();
        assert_eq!(names, vec!["shop.orders", "shop.customers", "shop.items"]);

        for table in &tables {
            assert_eq!(
                provider.target.committed_ids(&table.insert_script).len() as u64,
                summary
                    .tables
                    .iter()
                    .find(|o| o.table == table.full_name())
                    .map(|o| o.rows_migrated)
                    .unwrap()
            );
        }
        assert_eq!(store.finalized().len(), 3);
    }

    #[tokio::test]
    async fn test_completed_table_skipped_without_connections() {
        let (provider, tables) = provider_with(&[("orders", 10)]);
        let audit = Arc::new(MemoryAuditLog::default());
        let store = Arc::new(
            MemoryProgressStore::default()
                .with_prior("shop.orders", PriorMigration::Completed { rows: 10 }),
        );
        let orchestrator =
            Orchestrator::new(config(1), Arc::new(provider.clone()), store.clone(), audit.clone());

        let summary = orchestrator.run(tables).await;

        assert_eq!(summary.tables_skipped, 1);
        assert_eq!(summary.rows_migrated, 0);
        assert_eq!(provider.opened(), 0);
        assert!(provider.target.scripts().is_empty());
        assert!(store.finalized().is_empty());

        let lines = audit.lines("shop.orders");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Processing Table shop.orders "));
        assert!(lines[0].ends_with("--> Already Migrated, SKIPPED!"));
        assert_eq!(lines[0].len(), "Processing Table ".len() + 63 + "--> Already Migrated, SKIPPED!".len());
    }

    #[tokio::test]
    async fn test_overwrite_reruns_completed_table() {
        let (provider, tables) = provider_with(&[("orders", 5)]);
        let store = Arc::new(
            MemoryProgressStore::default()
                .with_prior("shop.orders", PriorMigration::Completed { rows: 5 }),
        );
        let mut cfg = config(1);
        cfg.migration.overwrite_tables = true;
        let orchestrator = Orchestrator::new(
            cfg,
            Arc::new(provider.clone()),
            store,
            Arc::new(MemoryAuditLog::default()),
        );

        let summary = orchestrator.run(tables).await;

        assert_eq!(summary.tables_migrated, 1);
        assert_eq!(provider.target.truncated(), vec!["shop.orders".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_table_does_not_stop_others() {
        let (provider, mut tables) = provider_with(&[("orders", 6), ("places", 0)]);
        provider.source.add_dataset(
            &tables[1].select_script,
            vec![ColumnMeta::new("shape", "GEOMETRY")],
            vec![],
        );
        tables[1].record_count = Some(0);
        let orchestrator = Orchestrator::new(
            config(2),
            Arc::new(provider.clone()),
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryAuditLog::default()),
        );

        let summary = orchestrator.run(tables).await;

        assert!(!summary.is_success());
        assert_eq!(summary.status, "failed");
        assert_eq!(summary.failed_tables, vec!["shop.places".to_string()]);
        assert_eq!(summary.tables_migrated, 1);
        assert_eq!(summary.rows_migrated, 6);
    }

    #[tokio::test]
    async fn test_dry_run_skips_everything() {
        let (provider, tables) = provider_with(&[("orders", 6), ("customers", 2)]);
        let mut cfg = config(2);
        cfg.migration.dry_run = true;
        let audit = Arc::new(MemoryAuditLog::default());
        let orchestrator = Orchestrator::new(
            cfg,
            Arc::new(provider.clone()),
            Arc::new(MemoryProgressStore::default()),
            audit.clone(),
        );

        let summary = orchestrator.run(tables).await;

        assert_eq!(summary.tables_skipped, 2);
        assert_eq!(provider.opened(), 0);
        assert_eq!(audit.lines("shop.customers"), vec!["Table shop.customers Skipped".to_string()]);
    }

    #[tokio::test]
    async fn test_health_check() {
        let provider = MemoryProvider::default();
        let orchestrator = Orchestrator::new(
            config(1),
            Arc::new(provider),
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryAuditLog::default()),
        );
        let result = orchestrator.health_check().await;
        assert!(result.healthy);

        let mut failing = MemoryProvider::default();
        failing.fail_source = true;
        let orchestrator = Orchestrator::new(
            config(1),
            Arc::new(failing),
            Arc::new(MemoryProgressStore::default()),
            Arc::new(MemoryAuditLog::default()),
        );
        let result = orchestrator.health_check().await;
        assert!(!result.healthy);
        assert!(result.source_error.is_some());
        assert!(result.target_connected);
    }

    #[test]
    fn test_summary_json() {
        let summary = MigrationSummary::new(
            "run-1".into(),
            Utc::now(),
            2.0,
            vec![
                MigrationOutcome::skipped("shop.a"),
                MigrationOutcome::aborted("shop.b", JobMode::Full, "boom"),
            ],
        );
        let json = summary.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["tables"][0]["mode"], "SKIP");
        assert_eq!(value["tables"][1]["error"], "boom");
        assert_eq!(value["failed_tables"][0], "shop.b");
    }
}
