use crate::{
    config::BackendConfig,
    db::{
        backend::{
            Backend, Catalog, ReadWriteContext, Row, TableSchema, TransactionWork, WorkOutcome,
        },
        mutation::{Key, KeySet, Mutation, MutationKind},
    },
    error::InternalError,
    types::Timestamp,
};
use log::{debug, warn};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

///
/// MemoryBackend
///
/// Process-local backend with optimistic concurrency.
///
/// Each attempt remembers the key sets it read; at commit, any row in those
/// sets written or deleted by a later commit aborts the attempt with a
/// conflict and the closure is re-run.
///

#[derive(Debug, Default)]
pub struct MemoryBackend {
    config: BackendConfig,
    state: Mutex<MemoryState>,
    injected_conflicts: AtomicU32,
    attempts: AtomicU64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MemoryState::default()),
            injected_conflicts: AtomicU32::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    /// Force the next `count` commit attempts to abort with a conflict.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub(crate) fn tombstone_count(&self, table: &str) -> usize {
        let state = self.state.lock();
        state.tables.get(table).map_or(0, |t| t.tombstones.len())
    }

    /// Total transaction closure invocations since construction.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Committed row at `key`, if any.
    #[must_use]
    pub fn get(&self, table: &str, key: &Key) -> Option<Row> {
        let state = self.state.lock();
        state
            .tables
            .get(table)
            .and_then(|t| t.rows.get(key))
            .map(|row| row.values.clone())
    }

    /// All committed rows of `table` in key order; empty for unknown tables.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let state = self.state.lock();
        state
            .tables
            .get(table)
            .map(|t| t.rows.values().map(|row| row.values.clone()).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock();
        state.tables.get(table).map_or(0, |t| t.rows.len())
    }

    #[must_use]
    pub fn last_commit_timestamp(&self) -> Option<Timestamp> {
        self.state.lock().last_commit
    }

    // Consume one injected conflict, if any remain.
    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn try_commit(&self, attempt: AttemptState) -> Result<Timestamp, InternalError> {
        if self.take_injected_conflict() {
            return Err(InternalError::backend_conflict("injected commit conflict"));
        }

        let mut state = self.state.lock();

        // Phase 1: validate the read set against commits since the attempt began.
        for (table, key_set) in &attempt.reads {
            if let Some(t) = state.tables.get(table)
                && t.changed_since(key_set, attempt.start_version)
            {
                return Err(InternalError::backend_conflict(format!(
                    "rows of '{table}' in {key_set} changed since the transaction began"
                )));
            }
        }

        // Phase 2: apply in place, keeping an undo log so a failing mutation leaves no trace.
        let version = state.version + 1;
        let mut undo = Vec::new();
        if let Err(err) = apply_writes(&mut state.tables, &attempt.writes, version, &mut undo) {
            for entry in undo.into_iter().rev() {
                if let Some(table) = state.tables.get_mut(&entry.table) {
                    table.restore(entry);
                }
            }
            return Err(err);
        }

        // Phase 3: publish, then drop tombstones no open attempt can observe.
        let timestamp = match state.last_commit {
            Some(last) => Timestamp::now().max(last.successor()),
            None => Timestamp::now(),
        };
        state.version = version;
        state.last_commit = Some(timestamp);

        let horizon = state.horizon();
        let touched = attempt
            .writes
            .iter()
            .map(Mutation::table)
            .collect::<BTreeSet<_>>();
        for name in touched {
            if let Some(table) = state.tables.get_mut(name) {
                table.prune_tombstones(horizon);
            }
        }

        Ok(timestamp)
    }

    // Register an attempt's start version until the returned guard drops.
    fn begin_attempt(&self) -> AttemptGuard<'_> {
        let mut state = self.state.lock();
        let start_version = state.version;
        *state.open_attempts.entry(start_version).or_default() += 1;

        AttemptGuard {
            backend: self,
            start_version,
        }
    }
}

fn apply_writes(
    tables: &mut BTreeMap<String, MemoryTable>,
    writes: &[Mutation],
    version: u64,
    undo: &mut Vec<UndoEntry>,
) -> Result<(), InternalError> {
    for mutation in writes {
        let table = tables.get_mut(mutation.table()).ok_or_else(|| {
            InternalError::backend_not_found(format!("table '{}' not found", mutation.table()))
        })?;
        table.apply(mutation, version, undo)?;
    }

    Ok(())
}

impl Catalog for MemoryBackend {
    fn table(&self, name: &str) -> Option<TableSchema> {
        self.state.lock().tables.get(name).map(|t| t.schema.clone())
    }
}

impl Backend for MemoryBackend {
    fn run_read_write(
        &self,
        work: &mut TransactionWork<'_>,
    ) -> Result<Option<Timestamp>, InternalError> {
        let max_attempts = self.config.max_commit_attempts.max(1);
        let mut last_conflict = None;

        for attempt in 1..=max_attempts {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let guard = self.begin_attempt();
            let mut ctx = MemoryContext {
                backend: self,
                attempt: AttemptState::new(guard.start_version),
            };

            let result = match work(&mut ctx) {
                Ok(WorkOutcome::Rollback) => return Ok(None),
                Ok(WorkOutcome::Commit) => self.try_commit(ctx.attempt),
                Err(err) => Err(err),
            };

            match result {
                Ok(timestamp) => return Ok(Some(timestamp)),
                Err(err) if err.is_retryable() => {
                    debug!("memory backend: attempt {attempt}/{max_attempts} aborted: {err}");
                    last_conflict = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let reason = last_conflict.map_or_else(String::new, |err| format!(": {err}"));
        warn!("memory backend: transaction gave up after {max_attempts} attempts{reason}");

        Err(InternalError::backend_transaction_failed(format!(
            "transaction aborted after {max_attempts} attempts{reason}"
        )))
    }

    fn create_table_if_missing(&self, schema: &TableSchema) -> Result<(), InternalError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.tables.get(schema.name()) {
            if existing.schema.primary_key() != schema.primary_key() {
                return Err(InternalError::backend_already_exists(format!(
                    "table '{}' exists with a different primary key",
                    schema.name()
                )));
            }

            return Ok(());
        }

        debug!("memory backend: created table '{}'", schema.name());
        state
            .tables
            .insert(schema.name().to_string(), MemoryTable::new(schema.clone()));

        Ok(())
    }
}

///
/// MemoryState
///

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    version: u64,
    last_commit: Option<Timestamp>,

    // start version -> attempts still running from it
    open_attempts: BTreeMap<u64, usize>,
}

impl MemoryState {
    // Oldest version an open attempt may still validate against.
    fn horizon(&self) -> u64 {
        self.open_attempts
            .keys()
            .next()
            .copied()
            .unwrap_or(self.version)
    }
}

///
/// AttemptGuard
///

struct AttemptGuard<'a> {
    backend: &'a MemoryBackend,
    start_version: u64,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.backend.state.lock();
        if let Some(count) = state.open_attempts.get_mut(&self.start_version) {
            *count -= 1;
            if *count == 0 {
                state.open_attempts.remove(&self.start_version);
            }
        }
    }
}

///
/// UndoEntry
///
/// Prior contents of one key, restored if a later write in the same commit fails.
///

#[derive(Debug)]
struct UndoEntry {
    table: String,
    key: Key,
    row: Option<StoredRow>,
    tombstone: Option<u64>,
}

///
/// MemoryTable
///

#[derive(Debug)]
struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<Key, StoredRow>,
    tombstones: BTreeMap<Key, u64>,
}

#[derive(Clone, Debug)]
struct StoredRow {
    values: Row,
    version: u64,
}

impl MemoryTable {
    const fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }

    fn read(&self, key_set: &KeySet) -> Vec<Row> {
        match key_set {
            KeySet::Key(key) => self.rows.get(key).map(|r| r.values.clone()).into_iter().collect(),
            _ => self
                .rows
                .iter()
                .filter(|(key, _)| key_set.contains(key))
                .map(|(_, row)| row.values.clone())
                .collect(),
        }
    }

    fn changed_since(&self, key_set: &KeySet, version: u64) -> bool {
        let rows = self
            .rows
            .iter()
            .any(|(key, row)| row.version > version && key_set.contains(key));
        let deletes = self
            .tombstones
            .iter()
            .any(|(key, deleted)| *deleted > version && key_set.contains(key));

        rows || deletes
    }

    fn apply(
        &mut self,
        mutation: &Mutation,
        version: u64,
        undo: &mut Vec<UndoEntry>,
    ) -> Result<(), InternalError> {
        if let Some(key_set) = mutation.key_set() {
            self.delete(key_set, version, undo);
            return Ok(());
        }

        let table = self.schema.name();
        for (column, _) in mutation.columns().iter() {
            if !self.schema.has_column(column) {
                return Err(InternalError::backend_validation(format!(
                    "column '{column}' not found in table '{table}'"
                )));
            }
        }
        let key = mutation
            .columns()
            .key_for(self.schema.primary_key())
            .ok_or_else(|| {
                InternalError::backend_validation(format!(
                    "{} on '{table}' does not bind every key column",
                    mutation.kind()
                ))
            })?;

        let existing = self.rows.get(&key).map(|row| row.values.clone());
        let values = match (mutation.kind(), existing) {
            (MutationKind::Insert, Some(_)) => {
                return Err(InternalError::backend_already_exists(format!(
                    "row {key} already exists in '{table}'"
                )));
            }
            (MutationKind::Update, None) => {
                return Err(InternalError::backend_not_found(format!(
                    "row {key} not found in '{table}'"
                )));
            }
            (MutationKind::Update | MutationKind::InsertOrUpdate, Some(current)) => mutation
                .columns()
                .iter()
                .fold(current, |row, (column, value)| row.with(column, value.clone())),
            _ => mutation.columns().clone(),
        };

        undo.push(self.replace(key, Some(StoredRow { values, version }), None));

        Ok(())
    }

    fn delete(&mut self, key_set: &KeySet, version: u64, undo: &mut Vec<UndoEntry>) {
        let doomed: Vec<Key> = match key_set {
            KeySet::Key(key) => self.rows.contains_key(key).then(|| key.clone()).into_iter().collect(),
            _ => self
                .rows
                .keys()
                .filter(|key| key_set.contains(key))
                .cloned()
                .collect(),
        };

        for key in doomed {
            undo.push(self.replace(key, None, Some(version)));
        }
    }

    // Overwrite both the row and the tombstone at `key`, returning what was there.
    fn replace(&mut self, key: Key, row: Option<StoredRow>, tombstone: Option<u64>) -> UndoEntry {
        let row = match row {
            Some(row) => self.rows.insert(key.clone(), row),
            None => self.rows.remove(&key),
        };
        let tombstone = match tombstone {
            Some(version) => self.tombstones.insert(key.clone(), version),
            None => self.tombstones.remove(&key),
        };

        UndoEntry {
            table: self.schema.name().to_string(),
            key,
            row,
            tombstone,
        }
    }

    fn restore(&mut self, entry: UndoEntry) {
        self.replace(entry.key, entry.row, entry.tombstone);
    }

    fn prune_tombstones(&mut self, horizon: u64) {
        self.tombstones.retain(|_, deleted| *deleted > horizon);
    }
}

///
/// AttemptState
///

#[derive(Debug)]
struct AttemptState {
    start_version: u64,
    reads: Vec<(String, KeySet)>,
    writes: Vec<Mutation>,
}

impl AttemptState {
    const fn new(start_version: u64) -> Self {
        Self {
            start_version,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }
}

///
/// MemoryContext
///

struct MemoryContext<'a> {
    backend: &'a MemoryBackend,
    attempt: AttemptState,
}

impl ReadWriteContext for MemoryContext<'_> {
    fn read(&mut self, table: &str, key_set: &KeySet) -> Result<Vec<Row>, InternalError> {
        let state = self.backend.state.lock();
        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| InternalError::backend_not_found(format!("table '{table}' not found")))?
            .read(key_set);
        drop(state);

        self.attempt.reads.push((table.to_string(), key_set.clone()));

        Ok(rows)
    }

    fn buffer(&mut self, mutation: Mutation) -> Result<(), InternalError> {
        mutation.validate()?;
        self.attempt.writes.push(mutation);

        Ok(())
    }
}
