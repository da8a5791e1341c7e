//! Progress store trait for resumable migrations.
//!
//! The [`ProgressStore`] trait defines where per-table progress is persisted:
//!
//! - **File**: JSON state file, [`FileProgressStore`](super::FileProgressStore)
//! - **None**: [`NoOpStateBackend`](super::NoOpStateBackend), nothing survives the run
//!
//! The orchestrator and every engine share one `Arc<dyn ProgressStore>`.

use async_trait::async_trait;

use crate::error::Result;
use crate::transfer::MigrationOutcome;

/// What an earlier run left behind for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorMigration {
    /// No earlier run touched the table.
    NotStarted,

    /// An earlier run started but did not complete. `committed` rows are in the
    /// target; `processed` source rows were consumed, lost rows included.
    Partial { committed: u64, processed: u64 },

    /// An earlier run completed with `rows` rows.
    Completed { rows: u64 },
}

impl PriorMigration {
    pub fn is_partial(&self) -> bool {
        matches!(self, PriorMigration::Partial { .. })
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PriorMigration::Completed { .. })
    }

    /// Rows an earlier run left committed in the target.
    pub fn committed(&self) -> u64 {
        match self {
            PriorMigration::NotStarted => 0,
            PriorMigration::Partial { committed, .. } => *committed,
            PriorMigration::Completed { rows } => *rows,
        }
    }

    /// Source position an earlier run reached. Never behind `committed()`.
    pub fn processed(&self) -> u64 {
        match self {
            PriorMigration::NotStarted => 0,
            PriorMigration::Partial {
                committed,
                processed,
            } => (*processed).max(*committed),
            PriorMigration::Completed { rows } => *rows,
        }
    }
}

/// Trait for progress persistence backends.
///
/// Implementations must be `Send + Sync`; tables record progress concurrently.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// State an earlier run left for `table`.
    async fn prior_migration(&self, table: &str) -> Result<PriorMigration>;

    /// Record cumulative progress. `processed` counts source rows consumed,
    /// committed and lost alike. Neither count decreases within one run.
    async fn record_progress(
        &self,
        table: &str,
        total: u64,
        committed: u64,
        processed: u64,
    ) -> Result<()>;

    /// Record how the job ended.
    async fn finalize(&self, table: &str, outcome: &MigrationOutcome) -> Result<()>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_committed() {
        assert_eq!(PriorMigration::NotStarted.committed(), 0);
        let partial = PriorMigration::Partial {
            committed: 40,
            processed: 50,
        };
        assert_eq!(partial.committed(), 40);
        assert_eq!(partial.processed(), 50);
        assert_eq!(PriorMigration::Completed { rows: 7 }.committed(), 7);
        assert!(partial.is_partial());
        assert!(!PriorMigration::NotStarted.is_completed());
    }

    #[test]
    fn test_prior_processed_never_behind_committed() {
        let legacy = PriorMigration::Partial {
            committed: 30,
            processed: 0,
        };
        assert_eq!(legacy.processed(), 30);
        assert_eq!(PriorMigration::NotStarted.processed(), 0);
    }
}
