use tracing::{debug, trace, warn};

use super::spec::TraversalSpec;
use crate::codec;
use crate::engine::{Cursor, LockMode, SearchMode, Transaction, Tuple};
use crate::types::{Result, TrawlError};
use crate::value::Row;

/// Lifecycle of a [`Scan`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScanState {
    /// Cursors are being opened.
    Open,
    /// The cursor has been positioned; no row consumed yet.
    Positioned,
    /// At least one row has been read.
    Iterating,
    /// Resources released; no further rows.
    Closed,
}

struct Cursors<C> {
    table: C,
    index: Option<C>,
}

impl<C: Cursor> Cursors<C> {
    /// The cursor rows are read through.
    fn active(&mut self) -> &mut C {
        self.index.as_mut().unwrap_or(&mut self.table)
    }

    /// Closes the index cursor, then the table cursor. Both are attempted.
    fn close(mut self) -> Result<()> {
        let index = match self.index.as_mut() {
            Some(index) => index.close(),
            None => Ok(()),
        };
        let table = self.table.close();
        index.and(table)
    }
}

/// Pull-based scan over one index with a one-row lookahead.
///
/// The next matching row is read eagerly when the scan opens and again each
/// time a row is handed out, so by the time the caller sees a row the cursor
/// has already moved past it. A `false` continuation filter, the physical end
/// of the index, or any error closes the scan; closing releases the read
/// tuple and both cursors and is idempotent.
pub struct Scan<'a, C: Cursor> {
    spec: TraversalSpec<'a>,
    cursors: Option<Cursors<C>>,
    read: Option<Tuple>,
    next_item: Option<Row>,
    state: ScanState,
}

impl<'a, C: Cursor> Scan<'a, C> {
    /// Opens cursors for `spec`, positions them, and reads ahead one row.
    ///
    /// With `write` set the reading cursor takes an intention-exclusive mode and
    /// an exclusive lock before it is positioned.
    pub fn open<X>(txn: &X, spec: TraversalSpec<'a>, write: bool) -> Result<Self>
    where
        X: Transaction<Cursor = C>,
    {
        let mut scan = Self {
            spec,
            cursors: None,
            read: None,
            next_item: None,
            state: ScanState::Open,
        };
        if let Err(err) = scan.position(txn, write) {
            scan.close_quietly();
            return Err(err);
        }
        scan.advance()?;
        Ok(scan)
    }

    fn position<X>(&mut self, txn: &X, write: bool) -> Result<()>
    where
        X: Transaction<Cursor = C>,
    {
        let target = self.spec.target();
        let index = target.secondary_index()?;
        let key = codec::encode_prefix(target.key_columns()?, self.spec.key_prefix())?;
        let mode = self.spec.search_mode().unwrap_or(SearchMode::GreaterOrEqual);
        debug!(
            table = target.table_def().name(),
            index = target.index_name(),
            direction = ?self.spec.direction(),
            ?mode,
            key_len = key.len(),
            write,
            "traverse.open"
        );

        let table_cursor = txn.open_table(target.table_def())?;
        let cursors = self.cursors.insert(Cursors {
            table: table_cursor,
            index: None,
        });
        if let Some(index) = index {
            let mut index_cursor = txn.open_index(&cursors.table, index)?;
            index_cursor.set_cluster_access()?;
            cursors.index = Some(index_cursor);
        }

        let cursor = cursors.active();
        if write {
            cursor.set_lock_mode(LockMode::IntentionExclusive)?;
            cursor.lock(LockMode::Exclusive)?;
        }
        let mut search = cursor.search_tuple(key)?;
        let found = cursor.search(&search, mode);
        search.dispose()?;
        let found = found?;
        self.read = Some(cursor.read_tuple()?);
        self.state = ScanState::Positioned;
        trace!(found, "traverse.scan.positioned");
        Ok(())
    }

    /// Computes the lookahead, closing the scan if that fails.
    fn advance(&mut self) -> Result<()> {
        match self.step() {
            Ok(next) => {
                self.next_item = next;
                Ok(())
            }
            Err(err) => {
                self.close_quietly();
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<Option<Row>> {
        loop {
            let Some(cursors) = self.cursors.as_mut() else {
                return Ok(None);
            };
            let cursor = cursors.active();
            if !(cursor.is_positioned() && cursor.has_next()) {
                trace!("traverse.scan.end_of_index");
                self.close()?;
                return Ok(None);
            }
            let read = self
                .read
                .as_mut()
                .ok_or(TrawlError::Misuse("scan has no read tuple"))?;
            cursor.read_row(read)?;
            let row = codec::decode(read, self.spec.target().table_def())?;
            read.clear()?;

            if !self.spec.should_continue(&row) {
                trace!("traverse.scan.stopped");
                self.close()?;
                return Ok(None);
            }
            let selected = self.spec.is_selected(&row);
            cursor.advance(self.spec.direction())?;
            self.state = ScanState::Iterating;
            if selected {
                return Ok(Some(row));
            }
            trace!("traverse.scan.skipped");
        }
    }

    /// Whether another row is ready.
    pub fn has_next(&self) -> bool {
        self.next_item.is_some()
    }

    /// Hands out the lookahead row and reads the next one.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.next_item.take() else {
            return Ok(None);
        };
        self.advance()?;
        Ok(Some(row))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Spec the scan was opened with.
    pub fn spec(&self) -> &TraversalSpec<'a> {
        &self.spec
    }

    /// Releases the read tuple and the cursors. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ScanState::Closed {
            return Ok(());
        }
        self.state = ScanState::Closed;
        self.next_item = None;
        let tuple = match self.read.take() {
            Some(mut read) => read.dispose(),
            None => Ok(()),
        };
        let cursors = match self.cursors.take() {
            Some(cursors) => cursors.close(),
            None => Ok(()),
        };
        trace!("traverse.scan.closed");
        tuple.and(cursors)
    }

    fn close_quietly(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "traverse.scan.close_failed");
        }
    }
}

impl<C: Cursor> Drop for Scan<'_, C> {
    fn drop(&mut self) {
        self.close_quietly();
    }
}
