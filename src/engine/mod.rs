#![forbid(unsafe_code)]

//! Storage engine contract consumed by the CRUD and traversal layers.
//!
//! The engine is cursor based: a [`Transaction`] opens [`Cursor`]s on a table's
//! clustered index or on one of its secondary indexes, cursors are positioned
//! with a (possibly partial) search key and a [`SearchMode`], and rows move in
//! and out through [`Tuple`] staging buffers. [`mem::MemDatabase`] is the
//! in-process implementation shipped with the crate.

pub mod mem;
mod tuple;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::schema::{IndexDef, TableDef};
use crate::types::Result;

pub use tuple::{Encoded, Tuple, TupleLayout};

/// Lock modes understood by [`Cursor::set_lock_mode`] and [`Cursor::lock`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LockMode {
    /// Intention to take shared row locks.
    IntentionShared,
    /// Intention to take exclusive row locks.
    IntentionExclusive,
    /// Shared lock.
    Shared,
    /// Exclusive lock.
    Exclusive,
    /// Locking disabled for this cursor.
    NotUsed,
    /// No lock requested yet.
    None,
}

/// Comparison applied when positioning a cursor against a search key.
///
/// Positioning is approximate: the cursor lands on the first entry (in the
/// mode's direction) satisfying the comparison, which is not necessarily an
/// exact match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SearchMode {
    /// First entry strictly after the key.
    Greater,
    /// First entry at or after the key.
    #[default]
    GreaterOrEqual,
    /// Last entry strictly before the key.
    Less,
    /// Last entry at or before the key.
    LessOrEqual,
}

/// Scan direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Asc,
    /// Descending key order.
    Desc,
}

/// Isolation level requested when beginning a transaction.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionLevel {
    ReadUncommitted,
    ReadCommitted,
    #[default]
    RepeatableRead,
    Serializable,
}

/// Lifecycle state of a transaction.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// Counters for engine-owned resources.
///
/// Every tuple and cursor registers here on creation and deregisters exactly
/// once on release, so a snapshot taken after all work is done shows whether
/// any exit path leaked a resource.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    tuples_created: AtomicU64,
    tuples_disposed: AtomicU64,
    cursors_opened: AtomicU64,
    cursors_closed: AtomicU64,
}

/// Point-in-time copy of a [`ResourceLedger`].
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LedgerSnapshot {
    pub tuples_created: u64,
    pub tuples_disposed: u64,
    pub live_tuples: u64,
    pub cursors_opened: u64,
    pub cursors_closed: u64,
    pub open_cursors: u64,
}

impl ResourceLedger {
    pub(crate) fn tuple_created(&self) {
        self.tuples_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tuple_disposed(&self) {
        self.tuples_disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cursor_opened(&self) {
        self.cursors_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cursor_closed(&self) {
        self.cursors_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let tuples_created = self.tuples_created.load(Ordering::Relaxed);
        let tuples_disposed = self.tuples_disposed.load(Ordering::Relaxed);
        let cursors_opened = self.cursors_opened.load(Ordering::Relaxed);
        let cursors_closed = self.cursors_closed.load(Ordering::Relaxed);
        LedgerSnapshot {
            tuples_created,
            tuples_disposed,
            live_tuples: tuples_created.saturating_sub(tuples_disposed),
            cursors_opened,
            cursors_closed,
            open_cursors: cursors_opened.saturating_sub(cursors_closed),
        }
    }
}

/// Entry point of a storage engine.
pub trait Database {
    /// Transaction handle type.
    type Txn: Transaction;

    /// Starts a transaction at `level`.
    fn begin(&self, level: TransactionLevel) -> Result<Self::Txn>;
}

/// An active engine transaction.
///
/// Cursor-opening methods take `&self` so several cursors may be open at once
/// inside one transaction (a write-mode traversal runs CRUD calls while its own
/// cursor stays positioned).
pub trait Transaction {
    /// Cursor handle type.
    type Cursor: Cursor;

    /// Opens a cursor on the clustered index of `table`.
    fn open_table(&self, table: &TableDef) -> Result<Self::Cursor>;

    /// Opens a cursor on secondary `index` of the table `table_cursor` is open on.
    fn open_index(&self, table_cursor: &Self::Cursor, index: &IndexDef) -> Result<Self::Cursor>;

    /// Current lifecycle state.
    fn state(&self) -> TransactionState;

    /// Makes the transaction's writes durable and visible.
    fn commit(self) -> Result<()>;

    /// Discards the transaction's writes.
    fn rollback(self) -> Result<()>;
}

/// A positioned handle on one index of one table.
///
/// After a successful [`Cursor::search`] the cursor is positioned; it stays on
/// an entry until [`Cursor::advance`] steps past either end of the index, at
/// which point [`Cursor::has_next`] turns false. Cursors release themselves on
/// drop; [`Cursor::close`] does so eagerly and is idempotent.
pub trait Cursor {
    /// Sets the lock mode used for subsequent row access.
    fn set_lock_mode(&mut self, mode: LockMode) -> Result<()>;

    /// Acquires a lock on the underlying table in `mode`.
    fn lock(&mut self, mode: LockMode) -> Result<()>;

    /// Makes reads through a secondary-index cursor return full clustered rows.
    fn set_cluster_access(&mut self) -> Result<()>;

    /// Builds a search tuple holding an encoded key prefix for this cursor's index.
    fn search_tuple(&self, key: Vec<Encoded>) -> Result<Tuple>;

    /// Builds an empty tuple shaped like the rows this cursor reads.
    fn read_tuple(&self) -> Result<Tuple>;

    /// Positions the cursor relative to `key`. Returns whether an entry was found.
    fn search(&mut self, key: &Tuple, mode: SearchMode) -> Result<bool>;

    /// Whether the last search positioned the cursor.
    fn is_positioned(&self) -> bool;

    /// Whether the cursor currently rests on an entry.
    fn has_next(&self) -> bool;

    /// Reads the entry under the cursor into `tuple`.
    fn read_row(&mut self, tuple: &mut Tuple) -> Result<()>;

    /// Inserts `row` (a full, table-ordered encoded row) staged through `tuple`.
    fn insert_row(&mut self, tuple: &mut Tuple, row: Vec<Encoded>) -> Result<()>;

    /// Replaces the row under the cursor with `row`, staged through `tuple`.
    fn update_row(&mut self, tuple: &mut Tuple, row: Vec<Encoded>) -> Result<()>;

    /// Deletes the row under the cursor.
    fn delete_row(&mut self) -> Result<()>;

    /// Steps one entry in `direction`.
    fn advance(&mut self, direction: Direction) -> Result<()>;

    /// Releases the cursor.
    fn close(&mut self) -> Result<()>;
}
