//! File-based progress state for resume capability.

mod backend;
mod noop;

pub use backend::{PriorMigration, ProgressStore};
pub use noop::NoOpStateBackend;

use crate::error::{MigrateError, Result};
use crate::transfer::{MigrationOutcome, OutcomeStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Persisted progress of every table seen by any run against one source/target pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationState {
    /// SHA256 fingerprint of the source/target identity.
    pub config_hash: String,

    /// When the state was last written.
    pub updated_at: DateTime<Utc>,

    /// Per-table state, keyed by `schema.table`.
    pub tables: HashMap<String, TableState>,

    /// HMAC-SHA256 signature for integrity validation.
    /// Computed over serialized state (excluding this field) using config_hash as key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
}

/// Per-table state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableState {
    /// Task status.
    pub status: TaskStatus,

    /// Rows the table held when its migration started.
    pub rows_total: u64,

    /// Rows committed to the target so far, across runs.
    pub rows_committed: u64,

    /// Source rows consumed so far, lost rows included. Resume position.
    #[serde(default)]
    pub rows_processed: u64,

    /// When the table migration completed.
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if failed.
    pub error: Option<String>,
}

impl MigrationState {
    /// Create an empty state.
    pub fn new(config_hash: String) -> Self {
        Self {
            config_hash,
            updated_at: Utc::now(),
            tables: HashMap::new(),
            hmac: None, // Computed on save
        }
    }

    /// Compute HMAC-SHA256 signature for state integrity validation.
    fn compute_hmac(&self) -> Result<String> {
        let mut state_for_signing = self.clone();
        state_for_signing.hmac = None;

        let content = serde_json::to_string(&state_for_signing)
            .map_err(|e| MigrateError::State(format!("Failed to serialize state for HMAC: {}", e)))?;

        let mut mac = HmacSha256::new_from_slice(self.config_hash.as_bytes())
            .map_err(|e| MigrateError::State(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Load state from a file with integrity validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&content)?;

        match &state.hmac {
            Some(stored_hmac) => {
                if stored_hmac != &state.compute_hmac()? {
                    return Err(MigrateError::State(
                        "integrity check failed: HMAC mismatch (possible tampering)".to_string(),
                    ));
                }
            }
            None => {
                warn!("State file has no HMAC signature, integrity cannot be verified");
            }
        }

        Ok(state)
    }

    /// Save state to a file (atomic write with HMAC).
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();

        self.updated_at = Utc::now();
        self.hmac = Some(self.compute_hmac()?);

        let content = serde_json::to_string_pretty(self)?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Validate that the state was written for the same databases.
    pub fn validate_config(&self, config_hash: &str) -> Result<()> {
        if self.config_hash != config_hash {
            return Err(MigrateError::ConfigChanged);
        }
        Ok(())
    }

    /// What an earlier run left for `table_name`.
    pub fn prior(&self, table_name: &str) -> PriorMigration {
        match self.tables.get(table_name) {
            None => PriorMigration::NotStarted,
            Some(t) if t.status == TaskStatus::Completed => PriorMigration::Completed {
                rows: t.rows_committed,
            },
            Some(t) => PriorMigration::Partial {
                committed: t.rows_committed,
                processed: t.rows_processed,
            },
        }
    }

    /// Record progress for a table, creating its entry on first use.
    pub fn update_progress(
        &mut self,
        table_name: &str,
        total: u64,
        committed: u64,
        processed: u64,
    ) {
        let table = self
            .tables
            .entry(table_name.to_string())
            .or_insert_with(|| TableState::new(total));
        table.status = TaskStatus::InProgress;
        table.rows_total = total;
        table.rows_committed = committed;
        table.rows_processed = processed;
        table.completed_at = None;
        table.error = None;
    }

    /// Apply a job outcome. Skipped jobs leave the state untouched.
    pub fn apply_outcome(&mut self, table_name: &str, outcome: &MigrationOutcome) {
        match outcome.status {
            OutcomeStatus::Skipped => {}
            OutcomeStatus::Completed => {
                let table = self
                    .tables
                    .entry(table_name.to_string())
                    .or_insert_with(|| TableState::new(outcome.rows_migrated));
                table.mark_completed();
            }
            OutcomeStatus::Aborted => {
                // A job that never recorded progress did not touch the target
                if let Some(table) = self.tables.get_mut(table_name) {
                    table.mark_failed(outcome.error.as_deref().unwrap_or("aborted"));
                }
            }
        }
    }
}

impl TableState {
    /// Create a new table state.
    pub fn new(rows_total: u64) -> Self {
        Self {
            status: TaskStatus::InProgress,
            rows_total,
            rows_committed: 0,
            rows_processed: 0,
            completed_at: None,
            error: None,
        }
    }

    /// Mark the table as completed.
    pub fn mark_completed(&mut self) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.error = None;
    }

    /// Mark the table as failed.
    pub fn mark_failed(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.to_string());
    }
}

/// Progress store backed by a JSON state file.
///
/// The whole state is rewritten on every update; updates from concurrent
/// tables are serialized by a mutex.
pub struct FileProgressStore {
    path: PathBuf,
    state: Mutex<MigrationState>,
}

impl FileProgressStore {
    /// Open the state file at `path`, or start empty if it does not exist.
    ///
    /// Fails with [`MigrateError::ConfigChanged`] if the file belongs to other databases.
    pub fn open<P: Into<PathBuf>>(path: P, config_hash: &str) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let state = MigrationState::load(&path)?;
            state.validate_config(config_hash)?;
            debug!(
                "Loaded progress for {} tables from {}",
                state.tables.len(),
                path.display()
            );
            state
        } else {
            MigrationState::new(config_hash.to_string())
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state.
    pub async fn snapshot(&self) -> MigrationState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn prior_migration(&self, table: &str) -> Result<PriorMigration> {
        Ok(self.state.lock().await.prior(table))
    }

    async fn record_progress(
        &self,
        table: &str,
        total: u64,
        committed: u64,
        processed: u64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.update_progress(table, total, committed, processed);
        state.save(&self.path)
    }

    async fn finalize(&self, table: &str, outcome: &MigrationOutcome) -> Result<()> {
        if outcome.status == OutcomeStatus::Skipped {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        state.apply_outcome(table, outcome);
        state.save(&self.path)
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
