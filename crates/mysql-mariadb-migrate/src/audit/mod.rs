//! Per-table audit trail: progress lines, errors and create scripts.
//!
//! Audit output is separate from `tracing` diagnostics. It is the operator's
//! record of what happened to each table and is always written to files, never
//! interleaved between tables.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use crate::error::Result;

/// File name of the run-wide error log.
pub const GLOBAL_ERROR_FILE: &str = "migration.err";

/// Sink for the audit trail of a run.
///
/// Writes never fail the migration; implementations report their own I/O
/// problems through `tracing`.
pub trait AuditLog: Send + Sync {
    /// Append a line to the table's log.
    fn log(&self, table: &str, line: &str);

    /// Append a line to the table's error log.
    fn error(&self, table: &str, line: &str);

    /// Append a line to the run-wide error log.
    fn global_error(&self, line: &str);

    /// Keep the create script used for a table.
    fn ddl(&self, table: &str, script: &str);
}

/// Audit log writing `<log_dir>/<table>.log`, `<log_dir>/<table>.err`,
/// `<log_dir>/migration.err` and optionally `<ddl_dir>/<table>.sql`.
pub struct FileAuditLog {
    log_dir: PathBuf,
    ddl_dir: Option<PathBuf>,
    global: Mutex<()>,
}

impl FileAuditLog {
    /// Create the log (and DDL) directories if missing.
    pub fn new(log_dir: impl Into<PathBuf>, ddl_dir: Option<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        fs::create_dir_all(&log_dir)?;
        if let Some(dir) = &ddl_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Self {
            log_dir,
            ddl_dir,
            global: Mutex::new(()),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn append(path: &Path, line: &str) {
        let stamped = format!("{} {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), line);
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(stamped.as_bytes()));
        if let Err(e) = result {
            warn!("Failed to write audit line to {}: {}", path.display(), e);
        }
    }
}

impl AuditLog for FileAuditLog {
    fn log(&self, table: &str, line: &str) {
        Self::append(&self.log_dir.join(format!("{}.log", table)), line);
    }

    fn error(&self, table: &str, line: &str) {
        Self::append(&self.log_dir.join(format!("{}.err", table)), line);
    }

    fn global_error(&self, line: &str) {
        // Shared by every table task
        let _guard = self.global.lock().unwrap_or_else(|p| p.into_inner());
        Self::append(&self.log_dir.join(GLOBAL_ERROR_FILE), line);
    }

    fn ddl(&self, table: &str, script: &str) {
        let Some(dir) = &self.ddl_dir else {
            return;
        };
        let path = dir.join(format!("{}.sql", table));
        if let Err(e) = fs::write(&path, format!("{};\n", script.trim_end())) {
            warn!("Failed to write create script to {}: {}", path.display(), e);
        }
    }
}
