//! # mysql-mariadb-migrate
//!
//! Batch table migration from MySQL to MariaDB.
//!
//! This library moves the rows of a catalog of tables with support for:
//!
//! - **Batched inserts** committed in explicit transactions
//! - **Retry degradation** replaying a failed batch one row at a time
//! - **Resume capability** continuing partially migrated tables in delta mode
//! - **Parallel tables** bounded by a configurable worker count
//! - **Progress and ETA** reporting per table
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_mariadb_migrate::{Catalog, Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?.with_auto_tuning();
//!     let catalog = Catalog::load("tables.yaml")?;
//!     let orchestrator = Orchestrator::from_config(config)?;
//!     let summary = orchestrator.run(catalog.into_tables()).await;
//!     println!("Migrated {} rows", summary.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod state;
pub mod transfer;
pub mod typemap;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use audit::{AuditLog, FileAuditLog};
pub use config::{BatchFailurePolicy, Config, MigrationConfig, SourceConfig, TargetConfig};
pub use crate::core::{Catalog, ColumnMeta, ConnectionProvider, TableDescriptor};
pub use error::{MigrateError, Result};
pub use orchestrator::{HealthCheckResult, MigrationSummary, Orchestrator};
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use state::{FileProgressStore, MigrationState, NoOpStateBackend, ProgressStore};
pub use transfer::{BatchMigrationEngine, JobMode, MigrationOutcome, OutcomeStatus};
pub use typemap::TypeCoercionDispatcher;
