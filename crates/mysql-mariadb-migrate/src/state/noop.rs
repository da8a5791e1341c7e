//! No-op progress store for runs without a state file.
//!
//! Migrations complete but cannot be resumed if interrupted.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::state::backend::{PriorMigration, ProgressStore};
use crate::transfer::MigrationOutcome;

/// Progress store that doesn't persist anything.
///
/// Logs a warning on first use.
pub struct NoOpStateBackend {
    warned: std::sync::atomic::AtomicBool,
}

impl NoOpStateBackend {
    /// Create a new no-op progress store.
    pub fn new() -> Self {
        Self {
            warned: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn warn_once(&self) {
        if !self
            .warned
            .swap(true, std::sync::atomic::Ordering::SeqCst)
        {
            warn!(
                "No state_file configured: progress will not be persisted. \
                 Interrupted tables cannot be resumed in delta mode."
            );
        }
    }
}

impl Default for NoOpStateBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressStore for NoOpStateBackend {
    async fn prior_migration(&self, _table: &str) -> Result<PriorMigration> {
        self.warn_once();
        Ok(PriorMigration::NotStarted)
    }

    async fn record_progress(
        &self,
        _table: &str,
        _total: u64,
        _committed: u64,
        _processed: u64,
    ) -> Result<()> {
        Ok(())
    }

    async fn finalize(&self, _table: &str, _outcome: &MigrationOutcome) -> Result<()> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}
