//! Table and column metadata consumed by the migration engine.

use serde::{Deserialize, Serialize};

/// Everything the engine needs to move one table.
///
/// Scripts are produced by external DDL tooling. The select scripts must
/// return rows in a stable order (an `ORDER BY` on the primary key) and must
/// not carry their own `LIMIT`, since the source cursor pages through them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema (database) name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Row count snapshot. Counted from the full-select script when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,

    /// Select returning every row.
    pub select_script: String,

    /// Select returning only rows not yet migrated.
    /// When absent a delta run resumes `select_script` at the committed offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta_select_script: Option<String>,

    /// Parameterized single-row insert into the target.
    pub insert_script: String,

    /// Target create-table script.
    pub create_script: String,
}

impl TableDescriptor {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Result column of a source select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Column name.
    pub name: String,

    /// Declared type name as reported by the source driver, e.g. `INTEGER UNSIGNED`.
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}
