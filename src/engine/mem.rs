//! In-memory clustered-index engine.
//!
//! Tables are ordered maps keyed by the encoded primary key; every secondary
//! index is an ordered map from `secondary key ++ primary key` to the primary
//! key. Transactions copy a table on first touch and publish the copies they
//! wrote to on commit; there is no lock manager, so concurrent writers to the
//! same table resolve as last-commit-wins.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{
    Cursor, Database, Direction, Encoded, LockMode, ResourceLedger, SearchMode, Transaction,
    TransactionLevel, TransactionState, Tuple, TupleLayout,
};
use crate::schema::{ColumnDef, IndexDef, TableDef};
use crate::types::{EngineStatus, Result, TrawlError};

type Key = Vec<Encoded>;

/// Operation recorded in a transaction's event log.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub enum EngineOp {
    Open { table: String, index: Option<String> },
    SetLockMode(LockMode),
    Lock(LockMode),
    Search { mode: SearchMode, found: bool },
    Insert,
    Update,
    Delete,
    Close,
}

/// One entry of [`MemTransaction::events`].
#[derive(Clone, Debug, PartialEq)]
pub struct EngineEvent {
    /// Transaction-local cursor id.
    pub cursor: u64,
    /// What the cursor did.
    pub op: EngineOp,
}

#[derive(Clone, Debug)]
struct TableData {
    def: TableDef,
    rows: BTreeMap<Key, Vec<Encoded>>,
    indexes: BTreeMap<String, BTreeMap<Key, Key>>,
}

impl TableData {
    fn new(def: &TableDef) -> Self {
        let indexes = def
            .secondary_indexes()
            .map(|index| (index.name().to_owned(), BTreeMap::new()))
            .collect();
        Self {
            def: def.clone(),
            rows: BTreeMap::new(),
            indexes,
        }
    }

    fn project(columns: &[ColumnDef], row: &[Encoded]) -> Key {
        columns
            .iter()
            .map(|col| row.get(col.index()).cloned().unwrap_or(Encoded::Null))
            .collect()
    }

    fn primary_key(&self, row: &[Encoded]) -> Key {
        Self::project(self.def.primary_index().columns(), row)
    }

    fn check_row(&self, row: &[Encoded]) -> Result<()> {
        let columns = self.def.columns();
        if row.len() != columns.len() {
            return Err(EngineStatus::DataMismatch.into());
        }
        if columns
            .iter()
            .zip(row)
            .any(|(col, value)| col.is_not_null() && value.is_null())
        {
            return Err(EngineStatus::DataMismatch.into());
        }
        Ok(())
    }

    fn insert(&mut self, row: Vec<Encoded>) -> Result<()> {
        self.check_row(&row)?;
        let pk = self.primary_key(&row);
        if self.rows.contains_key(&pk) {
            return Err(EngineStatus::DuplicateKey.into());
        }
        let mut entries = Vec::new();
        for index in self.def.secondary_indexes() {
            let secondary = Self::project(index.columns(), &row);
            let map = self
                .indexes
                .get(index.name())
                .ok_or(TrawlError::Engine(EngineStatus::IndexNotFound))?;
            if index.is_unique()
                && !secondary.iter().any(Encoded::is_null)
                && seek(map, &secondary, SearchMode::GreaterOrEqual)
                    .is_some_and(|entry| prefix_cmp(&entry, &secondary) == CmpOrdering::Equal)
            {
                return Err(EngineStatus::DuplicateKey.into());
            }
            let mut entry = secondary;
            entry.extend(pk.iter().cloned());
            entries.push((index.name().to_owned(), entry));
        }
        for (name, entry) in entries {
            if let Some(map) = self.indexes.get_mut(&name) {
                map.insert(entry, pk.clone());
            }
        }
        self.rows.insert(pk, row);
        Ok(())
    }

    fn remove(&mut self, pk: &[Encoded]) -> Option<Vec<Encoded>> {
        let row = self.rows.remove(pk)?;
        for index in self.def.secondary_indexes() {
            let mut entry = Self::project(index.columns(), &row);
            entry.extend(pk.iter().cloned());
            if let Some(map) = self.indexes.get_mut(index.name()) {
                map.remove(&entry);
            }
        }
        Some(row)
    }

    fn replace(&mut self, pk: &[Encoded], row: Vec<Encoded>) -> Result<()> {
        self.check_row(&row)?;
        let old = self
            .remove(pk)
            .ok_or(TrawlError::Engine(EngineStatus::RecordNotFound))?;
        if let Err(err) = self.insert(row) {
            self.insert(old)?;
            return Err(err);
        }
        Ok(())
    }
}

/// Compares the leading `key.len()` components of `entry` with `key`.
fn prefix_cmp(entry: &[Encoded], key: &[Encoded]) -> CmpOrdering {
    let len = key.len().min(entry.len());
    entry[..len].cmp(&key[..len])
}

fn seek<V>(map: &BTreeMap<Key, V>, key: &[Encoded], mode: SearchMode) -> Option<Key> {
    let at_or_after = || map.range::<[Encoded], _>((Bound::Included(key), Bound::Unbounded));
    let before = || map.range::<[Encoded], _>((Bound::Unbounded, Bound::Excluded(key)));
    let found = match mode {
        SearchMode::GreaterOrEqual => at_or_after().next(),
        SearchMode::Greater => at_or_after().find(|(e, _)| prefix_cmp(e, key) == CmpOrdering::Greater),
        SearchMode::Less => before().next_back(),
        SearchMode::LessOrEqual => at_or_after()
            .take_while(|(e, _)| prefix_cmp(e, key) == CmpOrdering::Equal)
            .last()
            .or_else(|| before().next_back()),
    };
    found.map(|(entry, _)| entry.clone())
}

fn step<V>(map: &BTreeMap<Key, V>, from: &[Encoded], direction: Direction) -> Option<Key> {
    let found = match direction {
        Direction::Asc => map
            .range::<[Encoded], _>((Bound::Excluded(from), Bound::Unbounded))
            .next(),
        Direction::Desc => map
            .range::<[Encoded], _>((Bound::Unbounded, Bound::Excluded(from)))
            .next_back(),
    };
    found.map(|(entry, _)| entry.clone())
}

struct Inner {
    tables: Mutex<BTreeMap<String, TableData>>,
    ledger: Arc<ResourceLedger>,
    next_txn: AtomicU64,
}

/// Handle on an in-memory database. Clones share the same tables.
#[derive(Clone)]
pub struct MemDatabase {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDatabase")
            .field("tables", &self.inner.tables.lock().len())
            .finish()
    }
}

impl Default for MemDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(BTreeMap::new()),
                ledger: Arc::new(ResourceLedger::default()),
                next_txn: AtomicU64::new(1),
            }),
        }
    }

    /// Creates `table`. Fails with `TableExists` if the name is taken.
    pub fn create_table(&self, table: &TableDef) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        if tables.contains_key(table.name()) {
            return Err(EngineStatus::TableExists.into());
        }
        tables.insert(table.name().to_owned(), TableData::new(table));
        debug!(table = table.name(), "mem.table.create");
        Ok(())
    }

    /// Drops the table called `name`.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.inner
            .tables
            .lock()
            .remove(name)
            .ok_or(TrawlError::Engine(EngineStatus::TableNotFound))?;
        debug!(table = name, "mem.table.drop");
        Ok(())
    }

    /// Removes every row of `name`, keeping its definition.
    pub fn truncate_table(&self, name: &str) -> Result<()> {
        let mut tables = self.inner.tables.lock();
        let data = tables
            .get_mut(name)
            .ok_or(TrawlError::Engine(EngineStatus::TableNotFound))?;
        *data = TableData::new(&data.def);
        debug!(table = name, "mem.table.truncate");
        Ok(())
    }

    /// Whether a table called `name` has been created.
    pub fn table_exists(&self, name: &str) -> bool {
        self.inner.tables.lock().contains_key(name)
    }

    /// Committed row count of `name`.
    pub fn row_count(&self, name: &str) -> Result<usize> {
        self.inner
            .tables
            .lock()
            .get(name)
            .map(|data| data.rows.len())
            .ok_or(TrawlError::Engine(EngineStatus::TableNotFound))
    }

    /// Tuple and cursor counters for every transaction of this database.
    pub fn ledger(&self) -> &ResourceLedger {
        &self.inner.ledger
    }
}

impl Database for MemDatabase {
    type Txn = MemTransaction;

    fn begin(&self, level: TransactionLevel) -> Result<MemTransaction> {
        let id = self.inner.next_txn.fetch_add(1, Ordering::Relaxed);
        debug!(txn = id, ?level, "mem.txn.begin");
        Ok(MemTransaction {
            shared: Arc::new(TxnShared {
                id,
                db: self.inner.clone(),
                state: Mutex::new(TxnState {
                    status: TransactionState::Active,
                    workspace: BTreeMap::new(),
                    dirty: BTreeSet::new(),
                    events: Vec::new(),
                    next_cursor: 1,
                }),
            }),
            level,
        })
    }
}

struct TxnState {
    status: TransactionState,
    workspace: BTreeMap<String, TableData>,
    dirty: BTreeSet<String>,
    events: Vec<EngineEvent>,
    next_cursor: u64,
}

struct TxnShared {
    id: u64,
    db: Arc<Inner>,
    state: Mutex<TxnState>,
}

impl TxnShared {
    /// Runs `f` against this transaction's copy of `table`.
    fn with_table<R>(
        &self,
        table: &str,
        write: bool,
        f: impl FnOnce(&mut TableData) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock();
        if state.status != TransactionState::Active {
            return Err(EngineStatus::TransactionClosed.into());
        }
        if !state.workspace.contains_key(table) {
            let copy = self
                .db
                .tables
                .lock()
                .get(table)
                .cloned()
                .ok_or(TrawlError::Engine(EngineStatus::TableNotFound))?;
            state.workspace.insert(table.to_owned(), copy);
        }
        if write {
            state.dirty.insert(table.to_owned());
        }
        let data = state
            .workspace
            .get_mut(table)
            .ok_or(TrawlError::Engine(EngineStatus::TableNotFound))?;
        f(data)
    }

    fn record(&self, cursor: u64, op: EngineOp) {
        self.state.lock().events.push(EngineEvent { cursor, op });
    }

    fn finish(&self, commit: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != TransactionState::Active {
            return Err(EngineStatus::TransactionClosed.into());
        }
        let workspace = std::mem::take(&mut state.workspace);
        let dirty = std::mem::take(&mut state.dirty);
        if commit {
            let mut tables = self.db.tables.lock();
            for (name, data) in workspace {
                if dirty.contains(&name) && tables.contains_key(&name) {
                    tables.insert(name, data);
                }
            }
            state.status = TransactionState::Committed;
            debug!(txn = self.id, tables = dirty.len(), "mem.txn.commit");
        } else {
            state.status = TransactionState::RolledBack;
            debug!(txn = self.id, tables = dirty.len(), "mem.txn.rollback");
        }
        Ok(())
    }
}

/// Transaction on a [`MemDatabase`].
pub struct MemTransaction {
    shared: Arc<TxnShared>,
    level: TransactionLevel,
}

impl std::fmt::Debug for MemTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTransaction")
            .field("id", &self.shared.id)
            .field("level", &self.level)
            .field("state", &self.state())
            .finish()
    }
}

impl MemTransaction {
    /// Monotonic id assigned at [`Database::begin`].
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Isolation level requested at begin.
    pub fn level(&self) -> TransactionLevel {
        self.level
    }

    /// Cursor operations performed so far, in order.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.shared.state.lock().events.clone()
    }

    fn new_cursor(&self, table: &TableDef, index: Option<IndexDef>) -> Result<MemCursor> {
        self.shared.with_table(table.name(), false, |_| Ok(()))?;
        let id = {
            let mut state = self.shared.state.lock();
            let id = state.next_cursor;
            state.next_cursor += 1;
            id
        };
        let ledger = self.shared.db.ledger.clone();
        ledger.cursor_opened();
        self.shared.record(
            id,
            EngineOp::Open {
                table: table.name().to_owned(),
                index: index.as_ref().map(|index| index.name().to_owned()),
            },
        );
        trace!(
            txn = self.shared.id,
            cursor = id,
            table = table.name(),
            index = index.as_ref().map(IndexDef::name),
            "mem.cursor.open"
        );
        Ok(MemCursor {
            id,
            txn: self.shared.clone(),
            table: table.clone(),
            index,
            cluster_access: false,
            lock_mode: LockMode::None,
            exclusive: false,
            positioned: false,
            pos: None,
            closed: false,
            ledger,
        })
    }
}

impl Transaction for MemTransaction {
    type Cursor = MemCursor;

    fn open_table(&self, table: &TableDef) -> Result<MemCursor> {
        self.new_cursor(table, None)
    }

    fn open_index(&self, table_cursor: &MemCursor, index: &IndexDef) -> Result<MemCursor> {
        table_cursor.ensure_open()?;
        let index = table_cursor
            .table
            .secondary_index(index.name())
            .cloned()
            .ok_or(TrawlError::Engine(EngineStatus::IndexNotFound))?;
        self.new_cursor(&table_cursor.table, Some(index))
    }

    fn state(&self) -> TransactionState {
        self.shared.state.lock().status
    }

    fn commit(self) -> Result<()> {
        self.shared.finish(true)
    }

    fn rollback(self) -> Result<()> {
        self.shared.finish(false)
    }
}

impl Drop for MemTransaction {
    fn drop(&mut self) {
        if self.state() == TransactionState::Active {
            warn!(txn = self.shared.id, "mem.txn.dropped_active");
            if let Err(err) = self.shared.finish(false) {
                warn!(txn = self.shared.id, error = %err, "mem.txn.rollback_failed");
            }
        }
    }
}

/// Cursor on a clustered or secondary index of a [`MemDatabase`] table.
pub struct MemCursor {
    id: u64,
    txn: Arc<TxnShared>,
    table: TableDef,
    index: Option<IndexDef>,
    cluster_access: bool,
    lock_mode: LockMode,
    exclusive: bool,
    positioned: bool,
    pos: Option<Key>,
    closed: bool,
    ledger: Arc<ResourceLedger>,
}

impl std::fmt::Debug for MemCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemCursor")
            .field("id", &self.id)
            .field("table", &self.table.name())
            .field("index", &self.index.as_ref().map(IndexDef::name))
            .field("pos", &self.pos)
            .field("closed", &self.closed)
            .finish()
    }
}

impl MemCursor {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(EngineStatus::CursorClosed.into());
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.index.is_some() {
            return Err(TrawlError::Misuse("write through a secondary index cursor"));
        }
        if !self.exclusive {
            return Err(TrawlError::Misuse("write without an exclusive lock"));
        }
        Ok(())
    }

    /// Columns making up this cursor's index entries.
    fn key_columns(&self) -> Vec<ColumnDef> {
        let primary = self.table.primary_index().columns();
        match &self.index {
            None => primary.to_vec(),
            Some(index) => index.columns().iter().chain(primary).cloned().collect(),
        }
    }

    fn key_layout(&self) -> TupleLayout {
        match self.index {
            None => TupleLayout::Clustered,
            Some(_) => TupleLayout::Secondary,
        }
    }

    fn read_layout(&self) -> TupleLayout {
        if self.cluster_access {
            TupleLayout::Clustered
        } else {
            self.key_layout()
        }
    }

    fn with_entries<R>(
        &self,
        f: impl FnOnce(&TableData, Option<&BTreeMap<Key, Key>>) -> Result<R>,
    ) -> Result<R> {
        let index = self.index.as_ref().map(IndexDef::name);
        self.txn.with_table(self.table.name(), false, |data| match index {
            None => f(data, None),
            Some(name) => {
                let entries = data
                    .indexes
                    .get(name)
                    .ok_or(TrawlError::Engine(EngineStatus::IndexNotFound))?;
                f(data, Some(entries))
            }
        })
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.pos = None;
            self.ledger.cursor_closed();
            self.txn.record(self.id, EngineOp::Close);
            trace!(txn = self.txn.id, cursor = self.id, "mem.cursor.close");
        }
    }
}

impl Cursor for MemCursor {
    fn set_lock_mode(&mut self, mode: LockMode) -> Result<()> {
        self.ensure_open()?;
        self.lock_mode = mode;
        self.txn.record(self.id, EngineOp::SetLockMode(mode));
        Ok(())
    }

    fn lock(&mut self, mode: LockMode) -> Result<()> {
        self.ensure_open()?;
        if mode == LockMode::Exclusive {
            if self.lock_mode != LockMode::IntentionExclusive {
                return Err(TrawlError::Misuse(
                    "exclusive lock requires intention-exclusive lock mode",
                ));
            }
            self.exclusive = true;
        }
        self.txn.record(self.id, EngineOp::Lock(mode));
        trace!(txn = self.txn.id, cursor = self.id, ?mode, "mem.cursor.lock");
        Ok(())
    }

    fn set_cluster_access(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.cluster_access = self.index.is_some();
        Ok(())
    }

    fn search_tuple(&self, key: Vec<Encoded>) -> Result<Tuple> {
        self.ensure_open()?;
        let mut columns = self.key_columns();
        if key.len() > columns.len() {
            return Err(EngineStatus::DataMismatch.into());
        }
        columns.truncate(key.len());
        Ok(Tuple::new(self.key_layout(), columns, key, self.ledger.clone()))
    }

    fn read_tuple(&self) -> Result<Tuple> {
        self.ensure_open()?;
        let columns = match self.read_layout() {
            TupleLayout::Clustered => self.table.columns().to_vec(),
            TupleLayout::Secondary => self.key_columns(),
        };
        Ok(Tuple::new(self.read_layout(), columns, Vec::new(), self.ledger.clone()))
    }

    fn search(&mut self, key: &Tuple, mode: SearchMode) -> Result<bool> {
        self.ensure_open()?;
        let values = key.values()?;
        let pos = self.with_entries(|data, entries| {
            Ok(match entries {
                None => seek(&data.rows, values, mode),
                Some(entries) => seek(entries, values, mode),
            })
        })?;
        let found = pos.is_some();
        self.pos = pos;
        self.positioned = found;
        self.txn.record(self.id, EngineOp::Search { mode, found });
        trace!(
            txn = self.txn.id,
            cursor = self.id,
            ?mode,
            key_len = values.len(),
            found,
            "mem.cursor.search"
        );
        Ok(found)
    }

    fn is_positioned(&self) -> bool {
        !self.closed && self.positioned
    }

    fn has_next(&self) -> bool {
        !self.closed && self.pos.is_some()
    }

    fn read_row(&mut self, tuple: &mut Tuple) -> Result<()> {
        self.ensure_open()?;
        if tuple.layout() != self.read_layout() {
            return Err(EngineStatus::DataMismatch.into());
        }
        let pos = self
            .pos
            .as_ref()
            .ok_or(TrawlError::Engine(EngineStatus::RecordNotFound))?;
        let cluster_access = self.cluster_access;
        let values = self.with_entries(|data, entries| {
            let missing = || TrawlError::Engine(EngineStatus::RecordNotFound);
            match entries {
                None => data.rows.get(pos).cloned().ok_or_else(missing),
                Some(entries) => {
                    let pk = entries.get(pos).ok_or_else(missing)?;
                    if cluster_access {
                        data.rows.get(pk).cloned().ok_or_else(missing)
                    } else {
                        Ok(pos.clone())
                    }
                }
            }
        })?;
        tuple.set_values(values)
    }

    fn insert_row(&mut self, tuple: &mut Tuple, row: Vec<Encoded>) -> Result<()> {
        self.ensure_writable()?;
        tuple.set_values(row)?;
        let staged = tuple.values()?.to_vec();
        self.txn
            .with_table(self.table.name(), true, |data| data.insert(staged))?;
        self.txn.record(self.id, EngineOp::Insert);
        trace!(txn = self.txn.id, cursor = self.id, "mem.cursor.insert");
        Ok(())
    }

    fn update_row(&mut self, tuple: &mut Tuple, row: Vec<Encoded>) -> Result<()> {
        self.ensure_writable()?;
        let pos = self
            .pos
            .clone()
            .ok_or(TrawlError::Engine(EngineStatus::RecordNotFound))?;
        tuple.set_values(row)?;
        let staged = tuple.values()?.to_vec();
        self.txn
            .with_table(self.table.name(), true, |data| data.replace(&pos, staged))?;
        self.txn.record(self.id, EngineOp::Update);
        trace!(txn = self.txn.id, cursor = self.id, "mem.cursor.update");
        Ok(())
    }

    fn delete_row(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let pos = self
            .pos
            .clone()
            .ok_or(TrawlError::Engine(EngineStatus::RecordNotFound))?;
        self.txn.with_table(self.table.name(), true, |data| {
            data.remove(&pos)
                .map(drop)
                .ok_or(TrawlError::Engine(EngineStatus::RecordNotFound))
        })?;
        self.txn.record(self.id, EngineOp::Delete);
        trace!(txn = self.txn.id, cursor = self.id, "mem.cursor.delete");
        Ok(())
    }

    fn advance(&mut self, direction: Direction) -> Result<()> {
        self.ensure_open()?;
        let from = self
            .pos
            .take()
            .ok_or(TrawlError::Engine(EngineStatus::EndOfIndex))?;
        self.pos = self.with_entries(|data, entries| {
            Ok(match entries {
                None => step(&data.rows, &from, direction),
                Some(entries) => step(entries, &from, direction),
            })
        })?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MemCursor {
    fn drop(&mut self) {
        self.release();
    }
}
