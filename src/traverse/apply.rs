use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::scan::{Scan, ScanState};
use crate::crud;
use crate::engine::Transaction;
use crate::schema::TableDef;
use crate::types::Result;
use crate::value::Row;

/// What a write-mode traversal should do with a visited row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Leave the table alone.
    NoOp,
    /// Update the row with this primary key, or insert it.
    Upsert(Row),
    /// Delete the row with this primary key.
    Delete(Row),
}

impl Mutation {
    /// Applies the mutation to the clustered index of `table`.
    ///
    /// Returns whether a row already existed: for an upsert that means it was
    /// updated, for a delete that it was removed. `NoOp` returns `false`.
    pub fn dispatch<X: Transaction>(&self, txn: &X, table: &TableDef) -> Result<bool> {
        match self {
            Mutation::NoOp => Ok(false),
            Mutation::Upsert(row) => crud::insert_or_update(txn, table, row),
            Mutation::Delete(row) => crud::delete(txn, table, row),
        }
    }
}

/// Write-mode traversal returned by [`super::apply`].
///
/// Each step hands the visited row to the mutation function and applies the
/// resulting [`Mutation`] to the target table. The scan's lookahead has
/// already moved the cursor past the row by then, so a mutation that moves
/// or removes the row cannot disturb the scan position.
pub struct Apply<'a, X: Transaction, F> {
    txn: &'a X,
    scan: Scan<'a, X::Cursor>,
    mutate: F,
    done: bool,
}

impl<'a, X, F> Apply<'a, X, F>
where
    X: Transaction,
    F: FnMut(Row) -> Mutation,
{
    pub(crate) fn new(txn: &'a X, scan: Scan<'a, X::Cursor>, mutate: F) -> Self {
        Self {
            txn,
            scan,
            mutate,
            done: false,
        }
    }

    /// Runs the traversal to the end, applying every mutation, then closes it.
    pub fn traverse_all(mut self) -> Result<()> {
        for step in self.by_ref() {
            step?;
        }
        self.scan.close()
    }

    /// Stops the traversal and releases its cursors.
    pub fn close(&mut self) -> Result<()> {
        self.done = true;
        self.scan.close()
    }

    /// State of the underlying scan. [`ScanState::Closed`] once the last
    /// mutation has been applied or one has failed.
    pub fn state(&self) -> ScanState {
        self.scan.state()
    }
}

impl<X, F> Iterator for Apply<'_, X, F>
where
    X: Transaction,
    F: FnMut(Row) -> Mutation,
{
    type Item = Result<Mutation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row = match self.scan.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        let mutation = (self.mutate)(row);
        let table = self.scan.spec().target().table_def();
        match mutation.dispatch(self.txn, table) {
            Ok(existed) => {
                trace!(table = table.name(), existed, "traverse.apply.mutated");
                Some(Ok(mutation))
            }
            Err(err) => {
                self.done = true;
                if let Err(close_err) = self.scan.close() {
                    warn!(error = %close_err, "traverse.scan.close_failed");
                }
                Some(Err(err))
            }
        }
    }
}

impl<X, F> FusedIterator for Apply<'_, X, F>
where
    X: Transaction,
    F: FnMut(Row) -> Mutation,
{
}
