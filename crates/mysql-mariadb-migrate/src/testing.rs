//! In-memory sources, targets and audit logs for unit tests.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::audit::AuditLog;
use crate::core::{
    BoundRow, ColumnMeta, ConnectionProvider, RawRow, RawValue, SourceReader, SqlValue,
    TableDescriptor, TargetWriter,
};
use crate::error::{MigrateError, Result};
use crate::state::{PriorMigration, ProgressStore};
use crate::transfer::MigrationOutcome;

/// Rows with a single `INTEGER` column holding each value of `ids`.
pub fn int_rows(ids: RangeInclusive<i64>) -> Vec<RawRow> {
    ids.map(|i| vec![RawValue::Int(i)]).collect()
}

/// Descriptor for `shop.<name>` with a single `id` column.
pub fn descriptor(name: &str) -> TableDescriptor {
    TableDescriptor {
        schema: "shop".into(),
        name: name.into(),
        record_count: None,
        select_script: format!("SELECT id FROM shop.{} ORDER BY id", name),
        delta_select_script: None,
        insert_script: format!("INSERT INTO shop.{} (id) VALUES (?)", name),
        create_script: format!("CREATE TABLE shop.{} (id INT)", name),
    }
}

struct Dataset {
    columns: Vec<ColumnMeta>,
    rows: Vec<RawRow>,
}

#[derive(Default)]
struct SourceInner {
    datasets: HashMap<String, Dataset>,
    fetches: Vec<(String, u64, u64)>,
    fail_fetch_at: Option<u64>,
    closed: usize,
}

/// Shared handle to what every [`MemorySource`] reads from.
#[derive(Clone, Default)]
pub struct SourceState {
    inner: Arc<Mutex<SourceInner>>,
}

impl SourceState {
    pub fn add_dataset(&self, query: &str, columns: Vec<ColumnMeta>, rows: Vec<RawRow>) {
        self.inner
            .lock()
            .unwrap()
            .datasets
            .insert(query.to_string(), Dataset { columns, rows });
    }

    /// The next fetch starting at `offset` fails, as a dropped connection would.
    pub fn fail_fetch_at(&self, offset: u64) {
        self.inner.lock().unwrap().fail_fetch_at = Some(offset);
    }

    /// `(offset, limit)` of every fetch, in order.
    pub fn fetches(&self) -> Vec<(u64, u64)> {
        self.inner
            .lock()
            .unwrap()
            .fetches
            .iter()
            .map(|(_, offset, limit)| (*offset, *limit))
            .collect()
    }

    pub fn fetched_queries(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .fetches
            .iter()
            .map(|(q, _, _)| q.clone())
            .collect()
    }

    pub fn closed(&self) -> usize {
        self.inner.lock().unwrap().closed
    }
}

pub struct MemorySource {
    state: SourceState,
}

impl MemorySource {
    pub fn new(state: SourceState) -> Self {
        Self { state }
    }
}

fn unknown_query(query: &str) -> MigrateError {
    MigrateError::transfer("memory", format!("no dataset for query: {}", query))
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn describe(&mut self, query: &str) -> Result<Vec<ColumnMeta>> {
        let inner = self.state.inner.lock().unwrap();
        let dataset = inner.datasets.get(query).ok_or_else(|| unknown_query(query))?;
        Ok(dataset.columns.clone())
    }

    async fn count_rows(&mut self, query: &str) -> Result<u64> {
        let inner = self.state.inner.lock().unwrap();
        let dataset = inner.datasets.get(query).ok_or_else(|| unknown_query(query))?;
        Ok(dataset.rows.len() as u64)
    }

    async fn fetch_rows(&mut self, query: &str, offset: u64, limit: u64) -> Result<Vec<RawRow>> {
        let mut inner = self.state.inner.lock().unwrap();
        inner.fetches.push((query.to_string(), offset, limit));
        if inner.fail_fetch_at == Some(offset) {
            inner.fail_fetch_at = None;
            return Err(MigrateError::transfer("memory", "lost connection to source"));
        }
        let dataset = inner.datasets.get(query).ok_or_else(|| unknown_query(query))?;
        Ok(dataset
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn close(&mut self) {
        self.state.inner.lock().unwrap().closed += 1;
    }
}

#[derive(Default)]
struct TargetInner {
    committed: HashMap<String, Vec<BoundRow>>,
    pending: Vec<(String, BoundRow)>,
    scripts: Vec<String>,
    truncated: Vec<String>,
    commits: usize,
    rollbacks: usize,
    closed: usize,
    poison: HashSet<i64>,
    fail_once: HashSet<i64>,
    fail_scripts: bool,
}

/// Shared handle to what every [`MemoryTarget`] writes to.
#[derive(Clone, Default)]
pub struct TargetState {
    inner: Arc<Mutex<TargetInner>>,
}

impl TargetState {
    /// Any batch containing a row whose first value is `id` fails.
    pub fn poison(&self, id: i64) {
        self.inner.lock().unwrap().poison.insert(id);
    }

    /// The first batch containing `id` fails; later writes of it succeed.
    pub fn fail_once(&self, id: i64) {
        self.inner.lock().unwrap().fail_once.insert(id);
    }

    /// Every script execution fails, as a create on an existing table would.
    pub fn fail_scripts(&self) {
        self.inner.lock().unwrap().fail_scripts = true;
    }

    /// First column of every committed row for an insert statement, in commit order.
    pub fn committed_ids(&self, insert_sql: &str) -> Vec<i64> {
        self.inner
            .lock()
            .unwrap()
            .committed
            .get(insert_sql)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| match row.first() {
                        Some(SqlValue::I64(i)) => Some(*i),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn committed_rows(&self, insert_sql: &str) -> Vec<BoundRow> {
        self.inner
            .lock()
            .unwrap()
            .committed
            .get(insert_sql)
            .cloned()
            .unwrap_or_default()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.inner.lock().unwrap().scripts.clone()
    }

    pub fn truncated(&self) -> Vec<String> {
        self.inner.lock().unwrap().truncated.clone()
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.lock().unwrap().rollbacks
    }

    pub fn closed(&self) -> usize {
        self.inner.lock().unwrap().closed
    }
}

pub struct MemoryTarget {
    state: TargetState,
}

impl MemoryTarget {
    pub fn new(state: TargetState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        let mut inner = self.state.inner.lock().unwrap();
        if inner.fail_scripts {
            return Err(MigrateError::transfer("memory", "table already exists"));
        }
        inner.scripts.push(sql.to_string());
        Ok(())
    }

    async fn truncate_table(&mut self, full_name: &str) -> Result<()> {
        self.state
            .inner
            .lock()
            .unwrap()
            .truncated
            .push(full_name.to_string());
        Ok(())
    }

    async fn write_batch(&mut self, insert_sql: &str, rows: &[BoundRow]) -> Result<()> {
        let mut inner = self.state.inner.lock().unwrap();
        let poisoned = rows.iter().any(|row| match row.first() {
            Some(SqlValue::I64(i)) => inner.poison.contains(i),
            _ => false,
        });
        if poisoned {
            return Err(MigrateError::transfer("memory", "duplicate key"));
        }
        let flaky: Vec<i64> = rows
            .iter()
            .filter_map(|row| match row.first() {
                Some(SqlValue::I64(i)) if inner.fail_once.contains(i) => Some(*i),
                _ => None,
            })
            .collect();
        if !flaky.is_empty() {
            for id in flaky {
                inner.fail_once.remove(&id);
            }
            return Err(MigrateError::transfer("memory", "lock wait timeout exceeded"));
        }
        inner
            .pending
            .extend(rows.iter().map(|row| (insert_sql.to_string(), row.clone())));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut inner = self.state.inner.lock().unwrap();
        let pending = std::mem::take(&mut inner.pending);
        for (sql, row) in pending {
            inner.committed.entry(sql).or_default().push(row);
        }
        inner.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut inner = self.state.inner.lock().unwrap();
        inner.pending.clear();
        inner.rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.state.inner.lock().unwrap().closed += 1;
    }
}

/// Provider handing out memory connections over shared state.
#[derive(Clone, Default)]
pub struct MemoryProvider {
    pub source: SourceState,
    pub target: TargetState,
    pub fail_source: bool,
    opened: Arc<AtomicUsize>,
}

impl MemoryProvider {
    /// Number of connections opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for MemoryProvider {
    async fn open_source(&self) -> Result<Box<dyn SourceReader>> {
        if self.fail_source {
            return Err(MigrateError::pool("connection refused", "opening source connection"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySource::new(self.source.clone())))
    }

    async fn open_target(&self) -> Result<Box<dyn TargetWriter>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTarget::new(self.target.clone())))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEntry {
    Log(String, String),
    Error(String, String),
    Global(String),
    Ddl(String, String),
}

/// Audit log keeping every line in memory.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn lines(&self, table: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                AuditEntry::Log(t, line) if t == table => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, table: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                AuditEntry::Error(t, line) if t == table => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn global_errors(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                AuditEntry::Global(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    pub fn ddl_written(&self, table: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| matches!(e, AuditEntry::Ddl(t, _) if t == table))
    }
}

impl AuditLog for MemoryAuditLog {
    fn log(&self, table: &str, line: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(AuditEntry::Log(table.into(), line.into()));
    }

    fn error(&self, table: &str, line: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(AuditEntry::Error(table.into(), line.into()));
    }

    fn global_error(&self, line: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(AuditEntry::Global(line.into()));
    }

    fn ddl(&self, table: &str, script: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(AuditEntry::Ddl(table.into(), script.into()));
    }
}

/// Progress store keeping everything in memory.
#[derive(Default)]
pub struct MemoryProgressStore {
    prior: Mutex<HashMap<String, PriorMigration>>,
    recorded: Mutex<Vec<(String, u64, u64, u64)>>,
    finalized: Mutex<Vec<MigrationOutcome>>,
}

impl MemoryProgressStore {
    pub fn with_prior(self, table: &str, prior: PriorMigration) -> Self {
        self.prior.lock().unwrap().insert(table.to_string(), prior);
        self
    }

    /// `(total, committed, processed)` of every progress record for a table.
    pub fn recorded(&self, table: &str) -> Vec<(u64, u64, u64)> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, ..)| t == table)
            .map(|(_, total, committed, processed)| (*total, *committed, *processed))
            .collect()
    }

    pub fn finalized(&self) -> Vec<MigrationOutcome> {
        self.finalized.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn prior_migration(&self, table: &str) -> Result<PriorMigration> {
        Ok(self
            .prior
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .unwrap_or(PriorMigration::NotStarted))
    }

    async fn record_progress(
        &self,
        table: &str,
        total: u64,
        committed: u64,
        processed: u64,
    ) -> Result<()> {
        self.recorded
            .lock()
            .unwrap()
            .push((table.to_string(), total, committed, processed));
        Ok(())
    }

    async fn finalize(&self, _table: &str, outcome: &MigrationOutcome) -> Result<()> {
        self.finalized.lock().unwrap().push(outcome.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
