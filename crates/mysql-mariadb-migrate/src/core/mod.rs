//! Core abstractions shared by the engine, the drivers and the orchestrator.
//!
//! - [`schema`]: Table descriptors and column metadata
//! - [`value`]: Typed bind values, including typed NULLs
//! - [`traits`]: Source, target and connection provider traits
//! - [`catalog`]: The YAML manifest listing the tables of a run

pub mod catalog;
pub mod schema;
pub mod traits;
pub mod value;

pub use catalog::Catalog;
pub use schema::{ColumnMeta, TableDescriptor};
pub use traits::{ConnectionProvider, RawRow, RawValue, SourceReader, TargetWriter};
pub use value::{BoundRow, SqlNullType, SqlValue};
