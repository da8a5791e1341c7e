//! Batch migration engine: moves one table from the source to the target.
//!
//! Rows are streamed in source order, coerced column by column, and written in
//! batches that each commit in their own target transaction. A failed batch can
//! be replayed one row at a time so that a single bad row does not cost its
//! whole batch.

mod cursor;
mod window;

pub use cursor::SourceCursor;
pub use window::BatchWindow;

use std::io::Write;
use std::sync::Arc;

use chrono::{Local, NaiveTime};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::audit::AuditLog;
use crate::config::{BatchFailurePolicy, MigrationConfig};
use crate::core::{BoundRow, ConnectionProvider, SourceReader, TableDescriptor, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::progress::{
    format_completed_line, format_progress_line, group_thousands, ProgressSnapshot,
    ProgressTracker, ThroughputEstimator,
};
use crate::typemap::TypeCoercionDispatcher;

/// How a table is migrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobMode {
    /// Create the target table and copy every row.
    Full,
    /// Continue after the rows an earlier run committed.
    Delta,
    /// Touch nothing.
    Skip,
}

/// Terminal state of a table job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Aborted,
    Skipped,
}

/// Result of one table job.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    /// Fully qualified table name.
    pub table: String,

    pub mode: JobMode,

    pub status: OutcomeStatus,

    /// Rows committed by this run.
    pub rows_migrated: u64,

    /// Rows of failed batches that were not written.
    pub rows_lost: u64,

    /// Error message if the job aborted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationOutcome {
    pub fn skipped(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mode: JobMode::Skip,
            status: OutcomeStatus::Skipped,
            rows_migrated: 0,
            rows_lost: 0,
            error: None,
        }
    }

    pub fn aborted(table: impl Into<String>, mode: JobMode, error: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            mode,
            status: OutcomeStatus::Aborted,
            rows_migrated: 0,
            rows_lost: 0,
            error: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Aborted
    }
}

/// Mutable state of the table being migrated. Owned by its engine.
#[derive(Debug, Clone)]
pub struct MigrationJob {
    /// Fully qualified table name.
    pub table: String,

    pub mode: JobMode,

    /// Rows this run expects to move, fixed at setup.
    pub total: u64,

    /// Rows committed by this run.
    pub committed: u64,

    /// Rows of failed batches that were not written.
    pub lost: u64,
}

/// Engine settings taken from the migration config.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Rows per batch.
    pub batch_size: u64,
    /// Committed batches between throughput/ETA refreshes.
    pub recalc_interval: u64,
    pub retry_on_errors: bool,
    pub overwrite_tables: bool,
    pub overwrite_partially_migrated: bool,
    pub on_batch_failure: BatchFailurePolicy,
    /// When false every table is skipped.
    pub moves_data: bool,
    /// Mirror progress to stdout.
    pub echo_progress: bool,
}

impl From<&MigrationConfig> for EngineConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.transaction_size,
            recalc_interval: config.batch_recalc_interval,
            retry_on_errors: config.retry_on_errors,
            overwrite_tables: config.overwrite_tables,
            overwrite_partially_migrated: config.overwrite_partially_migrated,
            on_batch_failure: config.on_batch_failure,
            moves_data: config.moves_data(),
            echo_progress: !config.is_multi_threaded(),
        }
    }
}

/// Connections a job owns until it returns.
#[derive(Default)]
struct Connections {
    source: Option<Box<dyn SourceReader>>,
    target: Option<Box<dyn TargetWriter>>,
}

impl Connections {
    async fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close().await;
        }
        if let Some(mut target) = self.target.take() {
            target.close().await;
        }
    }
}

/// Batch bookkeeping of the streaming loop.
struct BatchCounters {
    /// Batches concluded, committed or lost.
    batches: u64,
    /// Full batches that fit in the total.
    full_batches: u64,
    /// Rows concluded, committed or lost.
    processed: u64,
}

/// Migrates one table.
pub struct BatchMigrationEngine {
    table: TableDescriptor,
    provider: Arc<dyn ConnectionProvider>,
    tracker: ProgressTracker,
    audit: Arc<dyn AuditLog>,
    config: EngineConfig,
    job: MigrationJob,
    started: NaiveTime,
}

impl BatchMigrationEngine {
    pub fn new(
        table: TableDescriptor,
        provider: Arc<dyn ConnectionProvider>,
        tracker: ProgressTracker,
        audit: Arc<dyn AuditLog>,
        config: EngineConfig,
    ) -> Self {
        let job = MigrationJob {
            table: table.full_name(),
            mode: JobMode::Full,
            total: 0,
            committed: 0,
            lost: 0,
        };
        Self {
            table,
            provider,
            tracker,
            audit,
            config,
            job,
            started: Local::now().time(),
        }
    }

    /// Run the job to completion. Connections are closed and the tracker is
    /// finalized whatever the outcome.
    pub async fn run(mut self) -> MigrationOutcome {
        self.started = Local::now().time();
        let mut conns = Connections::default();

        let result = self.execute(&mut conns).await;

        if result.is_err() {
            if let Some(target) = conns.target.as_mut() {
                if let Err(e) = target.rollback().await {
                    debug!("{}: rollback during cleanup failed: {}", self.job.table, e);
                }
            }
        }
        conns.close().await;

        let outcome = match result {
            Ok(status) => MigrationOutcome {
                table: self.job.table.clone(),
                mode: self.job.mode,
                status,
                rows_migrated: self.job.committed,
                rows_lost: self.job.lost,
                error: None,
            },
            Err(e) => {
                error!("{}: {}", self.job.table, e);
                self.audit.error(&self.job.table, &e.to_string());
                self.log(&format!("Process aborted: {}", e));
                MigrationOutcome {
                    table: self.job.table.clone(),
                    mode: self.job.mode,
                    status: OutcomeStatus::Aborted,
                    rows_migrated: self.job.committed,
                    rows_lost: self.job.lost,
                    error: Some(e.to_string()),
                }
            }
        };

        if let Err(e) = self.tracker.finalize(&outcome).await {
            warn!("{}: failed to record outcome: {}", self.job.table, e);
            self.audit
                .error(&self.job.table, &format!("Failed to record outcome: {}", e));
        }

        outcome
    }

    async fn execute(&mut self, conns: &mut Connections) -> Result<OutcomeStatus> {
        let name = self.job.table.clone();

        if !self.config.moves_data {
            return Ok(self.skip());
        }

        let prior = self.tracker.prior_migration().await?;
        if prior.is_completed() && !self.config.overwrite_tables {
            return Ok(self.skip());
        }

        let source = match self.provider.open_source().await {
            Ok(source) => conns.source.insert(source),
            Err(e) => {
                self.audit
                    .global_error(&format!("{}: cannot open source connection: {}", name, e));
                return Err(e);
            }
        };
        let target = match self.provider.open_target().await {
            Ok(target) => conns.target.insert(target),
            Err(e) => {
                self.audit
                    .global_error(&format!("{}: cannot open target connection: {}", name, e));
                return Err(e);
            }
        };

        // Setup
        let mut delta = false;
        if self.config.overwrite_tables {
            self.truncate(target).await;
        } else if prior.is_partial() {
            if self.config.overwrite_partially_migrated {
                info!("Overwriting the partially migrated table {}", name);
                self.echo(&format!("Overwriting the Partially Migrated Table {}\n", name));
                self.truncate(target).await;
            } else {
                delta = true;
            }
        }

        let record_count = match self.table.record_count {
            Some(count) => count,
            None => source.count_rows(&self.table.select_script).await?,
        };

        let (query, start) = if delta {
            let done = prior.committed();
            // A delta script selects every uncommitted row, lost ones included
            let position = match self.table.delta_select_script {
                Some(_) => done,
                None => prior.processed(),
            };
            self.job.mode = JobMode::Delta;
            self.job.total = record_count.saturating_sub(position);
            self.tracker.resume_from(done, position);
            info!(
                "{}: delta run, {} of {} rows already migrated, resuming at source row {}",
                name, done, record_count, position
            );
            self.log(&format!(
                "Delta Processing Started for - {} Previously Migrated {}/{}",
                self.table.name, done, record_count
            ));
            match &self.table.delta_select_script {
                Some(script) => (script.clone(), 0),
                None => (self.table.select_script.clone(), position),
            }
        } else {
            self.job.mode = JobMode::Full;
            self.job.total = record_count;
            info!("{}: full run, {} rows", name, record_count);
            self.log(&format!(
                "Processing Started for - {} Total Records to Migrate {}",
                self.table.name,
                group_thousands(record_count)
            ));

            // Not retried: a partially applied create is not safe to repeat
            if let Err(e) = target.execute_script(&self.table.create_script).await {
                self.log("Failed to create target table, Process aborted!");
                return Err(MigrateError::setup(&name, e));
            }
            self.audit.ddl(&name, &self.table.create_script);
            (self.table.select_script.clone(), 0)
        };

        let total = self.job.total;
        let mut batch_size = self.config.batch_size.max(1);
        if batch_size > total {
            batch_size = total.max(1);
        }

        // Resolve every column before the first row is read
        let columns = source.describe(&query).await?;
        let dispatcher = TypeCoercionDispatcher::for_columns(&name, &columns)?;

        self.tracker.record_progress(total, 0, 0).await?;
        self.echo(&format!("Fetching Resultset for {}...", name));

        let mut cursor = SourceCursor::new(source, query, batch_size, start);
        let mut window = BatchWindow::new(batch_size);
        let mut estimator = ThroughputEstimator::new(self.config.recalc_interval, batch_size);
        let mut counters = BatchCounters {
            batches: 0,
            full_batches: total / batch_size,
            processed: 0,
        };

        loop {
            match cursor.next().await? {
                Some(raw) => {
                    window.push(dispatcher.bind_row(raw)?);
                    if window.is_full() {
                        self.flush(target, &mut cursor, &mut window, &mut estimator, &mut counters)
                            .await?;
                    }
                }
                // The source returned fewer rows than the snapshot counted
                None if !window.is_empty() => {
                    self.flush(target, &mut cursor, &mut window, &mut estimator, &mut counters)
                        .await?;
                }
                None => break,
            }
        }

        let snapshot = estimator.snapshot(total, self.job.committed);
        let line = format_completed_line(self.started, Local::now().time(), &name, &snapshot);
        self.log(&line);
        self.echo(&format!("\r{}\n", line));

        if self.job.lost > 0 {
            warn!(
                "{}: {} rows from failed batches were not migrated",
                name, self.job.lost
            );
        }
        info!(
            "{}: migrated {} of {} rows",
            name, self.job.committed, total
        );
        self.log("- EOF -");

        Ok(OutcomeStatus::Completed)
    }

    /// Execute, commit and account for the rows in the window.
    async fn flush(
        &mut self,
        target: &mut Box<dyn TargetWriter>,
        cursor: &mut SourceCursor<'_>,
        window: &mut BatchWindow,
        estimator: &mut ThroughputEstimator,
        counters: &mut BatchCounters,
    ) -> Result<()> {
        let rows = window.take();
        let count = rows.len() as u64;

        match write_and_commit(target, &self.table.insert_script, &rows).await {
            Ok(()) => {
                self.job.committed += count;
                if self.conclude(window, counters, count) {
                    estimator.on_batch_committed(counters.batches, self.job.total, self.job.committed);
                }
                self.tracker
                    .record_progress(self.job.total, self.job.committed, counters.processed)
                    .await?;

                let snapshot = estimator.snapshot(self.job.total, self.job.committed);
                self.report(&snapshot);
            }
            Err(e) => {
                if let Err(rb) = target.rollback().await {
                    warn!("{}: rollback failed: {}", self.job.table, rb);
                }

                let message = format!(
                    "Batch of {} rows ending at source row {} failed: {}",
                    count,
                    cursor.position(),
                    e
                );
                warn!("{}: {}", self.job.table, message);
                self.audit.error(&self.job.table, &message);

                if self.config.retry_on_errors && !window.in_retry() {
                    cursor.rewind(count);
                    window.begin_retry(count);
                    estimator.reset_eta();
                    self.log(&format!("Retrying {} rows one at a time", count));
                } else {
                    if self.config.on_batch_failure == BatchFailurePolicy::Abort {
                        return Err(MigrateError::batch(&self.job.table, e));
                    }
                    self.job.lost += count;
                    self.conclude(window, counters, count);
                    // Lost rows still advance the resume position
                    self.tracker
                        .record_progress(self.job.total, self.job.committed, counters.processed)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Count `rows` as concluded. Returns `true` if a whole batch is now done.
    fn conclude(&self, window: &mut BatchWindow, counters: &mut BatchCounters, rows: u64) -> bool {
        counters.processed += rows;

        let batch_done = if window.in_retry() {
            window.record_replayed(rows)
        } else {
            true
        };
        if !batch_done {
            return false;
        }

        counters.batches += 1;
        if counters.batches == counters.full_batches {
            // Only the remainder is left
            let remaining = self.job.total.saturating_sub(counters.processed).max(1);
            debug!("{}: last batch, size {}", self.job.table, remaining);
            window.set_size(remaining);
        }
        true
    }

    fn skip(&mut self) -> OutcomeStatus {
        self.job.mode = JobMode::Skip;
        info!("Table {} skipped", self.job.table);
        self.log(&format!("Table {} Skipped", self.job.table));
        self.echo(&format!("\nTable {} Skipped\n", self.job.table));
        OutcomeStatus::Skipped
    }

    async fn truncate(&self, target: &mut Box<dyn TargetWriter>) {
        if let Err(e) = target.truncate_table(&self.job.table).await {
            // The table may not exist yet; the create script decides
            warn!("{}: truncate failed: {}", self.job.table, e);
            self.audit
                .error(&self.job.table, &format!("Truncate failed: {}", e));
        }
    }

    fn report(&self, snapshot: &ProgressSnapshot) {
        let line = format_progress_line(Local::now().time(), &self.job.table, snapshot);
        debug!(
            "{}: {}/{} rows committed",
            self.job.table, snapshot.committed, snapshot.total
        );
        self.log(&line);
        self.echo(&format!("\r{}", line));
    }

    fn log(&self, line: &str) {
        self.audit.log(&self.job.table, line);
    }

    /// Interactive output, single-worker runs only.
    fn echo(&self, text: &str) {
        if !self.config.echo_progress {
            return;
        }
        let mut out = std::io::stdout().lock();
        if let Err(e) = write_progress(&mut out, text) {
            debug!("{}: progress output failed: {}", self.job.table, e);
        }
    }
}

fn write_progress(out: &mut impl Write, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

async fn write_and_commit(
    target: &mut Box<dyn TargetWriter>,
    insert_sql: &str,
    rows: &[BoundRow],
) -> Result<()> {
    target.write_batch(insert_sql, rows).await?;
    target.commit().await
}
