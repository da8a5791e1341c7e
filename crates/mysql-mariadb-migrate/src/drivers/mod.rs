//! Database driver implementations.
//!
//! Each driver module implements the core traits for one database family:
//! - `SourceReader`: For paging through a source select
//! - `TargetWriter`: For writing batches inside explicit transactions
//! - `ConnectionProvider`: For opening a dedicated pair per table job
//!
//! - [`mysql`]: MySQL source and MariaDB target

pub mod mysql;

pub use mysql::{MariaDbWriter, MysqlConnectionProvider, MysqlReader, SslMode};
