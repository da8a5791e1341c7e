//! Table catalog loaded from a YAML manifest.
//!
//! The manifest is produced by the DDL tooling that introspects the source
//! schema. This module only reads it and checks it is usable.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::schema::TableDescriptor;
use crate::error::{MigrateError, Result};

/// The set of tables a run migrates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub tables: Vec<TableDescriptor>,
}

impl Catalog {
    /// Load a catalog manifest from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog manifest from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let catalog: Catalog = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in &self.tables {
            let name = table.full_name();
            if table.schema.is_empty() || table.name.is_empty() {
                return Err(MigrateError::Config(format!(
                    "catalog entry '{}' needs both schema and name",
                    name
                )));
            }
            if table.select_script.trim().is_empty() || table.insert_script.trim().is_empty() {
                return Err(MigrateError::Config(format!(
                    "catalog entry '{}' is missing its select or insert script",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(MigrateError::Config(format!(
                    "catalog lists '{}' more than once",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn into_tables(self) -> Vec<TableDescriptor> {
        self.tables
    }
}
