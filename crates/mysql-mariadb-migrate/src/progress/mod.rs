//! Progress tracking, throughput estimation and the fixed-width progress line.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveTime;

use crate::error::Result;
use crate::state::{PriorMigration, ProgressStore};
use crate::transfer::MigrationOutcome;

/// Progress of one job at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub committed: u64,
    pub percent: f64,
    pub rows_per_sec: u64,
    pub eta_secs: u64,
}

/// Percent complete, clamped to 100. An empty table is complete.
pub fn percent(committed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (committed as f64 / total as f64 * 100.0).min(100.0)
}

/// Rate and ETA, refreshed every `interval` committed batches.
///
/// Between refreshes the last computed values are reported unchanged.
#[derive(Debug, Clone)]
pub struct ThroughputEstimator {
    started: Instant,
    interval: u64,
    rows_per_sec: u64,
    eta_secs: u64,
}

impl ThroughputEstimator {
    /// `initial_rate` is reported until the first refresh.
    pub fn new(interval: u64, initial_rate: u64) -> Self {
        Self {
            started: Instant::now(),
            interval: interval.max(1),
            rows_per_sec: initial_rate,
            eta_secs: 0,
        }
    }

    /// Called after every committed batch.
    pub fn on_batch_committed(&mut self, batches: u64, total: u64, committed: u64) {
        if batches > 0 && batches % self.interval == 0 {
            self.recompute(self.started.elapsed(), total, committed);
        }
    }

    /// Recompute from an elapsed time. Elapsed seconds floor at 1.
    pub fn recompute(&mut self, elapsed: Duration, total: u64, committed: u64) {
        if committed == 0 {
            return;
        }
        let elapsed = elapsed.as_secs_f64().max(1.0);
        let secs_per_row = elapsed / committed as f64;
        self.rows_per_sec = (committed as f64 / elapsed) as u64;
        self.eta_secs = (total.saturating_sub(committed) as f64 * secs_per_row).round() as u64;
    }

    /// Entering single-row replay invalidates the estimate.
    pub fn reset_eta(&mut self) {
        self.eta_secs = 1;
    }

    pub fn rows_per_sec(&self) -> u64 {
        self.rows_per_sec
    }

    pub fn eta_secs(&self) -> u64 {
        self.eta_secs
    }

    pub fn snapshot(&self, total: u64, committed: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            total,
            committed,
            percent: percent(committed, total),
            rows_per_sec: self.rows_per_sec,
            eta_secs: self.eta_secs,
        }
    }
}

/// Records and reports progress of one table to the shared [`ProgressStore`].
///
/// Counts passed in are relative to the current run; the tracker adds what an
/// earlier partial run already committed and consumed before persisting them.
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    table: String,
    base_committed: u64,
    base_processed: u64,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            base_committed: 0,
            base_processed: 0,
        }
    }

    /// What an earlier run left for this table. Queried once at job setup.
    pub async fn prior_migration(&self) -> Result<PriorMigration> {
        self.store.prior_migration(&self.table).await
    }

    /// Continue counting on top of an earlier partial run that committed
    /// `committed` rows and stopped at source position `processed`.
    pub fn resume_from(&mut self, committed: u64, processed: u64) {
        self.base_committed = committed;
        self.base_processed = processed;
    }

    /// Called after every batch, committed or lost.
    pub async fn record_progress(&self, total: u64, committed: u64, processed: u64) -> Result<()> {
        self.store
            .record_progress(
                &self.table,
                self.base_processed + total,
                self.base_committed + committed,
                self.base_processed + processed,
            )
            .await
    }

    /// Always called when the job exits.
    pub async fn finalize(&self, outcome: &MigrationOutcome) -> Result<()> {
        self.store.finalize(&self.table, outcome).await
    }
}

/// Width the `time - Processing table` prefix is padded to.
const LABEL_WIDTH: usize = 79;

/// Width of the `committed / total @ rate/s` block.
const COUNTS_WIDTH: usize = 36;

/// `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_hms(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Decimal digits grouped by thousands with commas.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn counts(snapshot: &ProgressSnapshot) -> String {
    format!(
        "{} / {} @ {}/s",
        group_thousands(snapshot.committed),
        group_thousands(snapshot.total),
        group_thousands(snapshot.rows_per_sec)
    )
}

/// Line emitted after every committed batch.
pub fn format_progress_line(now: NaiveTime, table: &str, snapshot: &ProgressSnapshot) -> String {
    let label = format!("{} - Processing {}", now.format("%H:%M:%S"), table);
    format!(
        "{:<lw$} --> {:>7} [{:>cw$}]  - ETA       [{}]",
        label,
        format!("{:.2}%", snapshot.percent),
        counts(snapshot),
        format_hms(snapshot.eta_secs),
        lw = LABEL_WIDTH,
        cw = COUNTS_WIDTH,
    )
}

/// Line emitted once when the job completes.
pub fn format_completed_line(
    started: NaiveTime,
    finished: NaiveTime,
    table: &str,
    snapshot: &ProgressSnapshot,
) -> String {
    let label = format!("{} - Processing {}", started.format("%H:%M:%S"), table);
    format!(
        "{:<lw$} --> 100.00% [{:>cw$}]  - COMPLETED [{}]",
        label,
        counts(snapshot),
        finished.format("%H:%M:%S"),
        lw = LABEL_WIDTH,
        cw = COUNTS_WIDTH,
    )
}
