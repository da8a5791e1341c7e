//! Core traits for the source and target sides of a table migration.
//!
//! - [`SourceReader`]: Describes and pages through a source select
//! - [`TargetWriter`]: Executes scripts and batched inserts inside an explicit transaction
//! - [`ConnectionProvider`]: Opens one exclusive reader/writer pair per table job
//!
//! Each table job owns its connections for its whole lifetime, so both sides
//! take `&mut self` and need only be `Send`.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::ColumnMeta;
use super::value::BoundRow;

/// Raw source value as delivered by the source driver.
pub type RawValue = mysql_async::Value;

/// One raw source row, in column order.
pub type RawRow = Vec<RawValue>;

/// Read rows from the source database.
#[async_trait]
pub trait SourceReader: Send {
    /// Column names and declared type names of a select, without reading rows.
    async fn describe(&mut self, query: &str) -> Result<Vec<ColumnMeta>>;

    /// Number of rows a select returns.
    async fn count_rows(&mut self, query: &str) -> Result<u64>;

    /// Read at most `limit` rows of a select, skipping the first `offset`.
    ///
    /// The select must be deterministically ordered for pages to line up.
    async fn fetch_rows(&mut self, query: &str, offset: u64, limit: u64) -> Result<Vec<RawRow>>;

    /// Release the connection. Errors are swallowed.
    async fn close(&mut self);
}

/// Write rows to the target database.
///
/// Autocommit is off: nothing written by [`TargetWriter::write_batch`] is
/// visible until [`TargetWriter::commit`].
#[async_trait]
pub trait TargetWriter: Send {
    /// Execute a DDL or utility script.
    async fn execute_script(&mut self, sql: &str) -> Result<()>;

    /// Remove every row from a table.
    async fn truncate_table(&mut self, full_name: &str) -> Result<()>;

    /// Execute the parameterized insert once per row as a single batch.
    async fn write_batch(&mut self, insert_sql: &str, rows: &[BoundRow]) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Release the connection. Errors are swallowed.
    async fn close(&mut self);
}

/// Opens the connections a table job owns.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn open_source(&self) -> Result<Box<dyn SourceReader>>;

    async fn open_target(&self) -> Result<Box<dyn TargetWriter>>;

    /// Short label for logs, e.g. `mysql://host:3306/db`.
    fn describe(&self) -> String;
}
