#![forbid(unsafe_code)]

//! Scans over a table's clustered index or one of its secondary indexes.
//!
//! A traversal is described by a [`TraversalSpec`] and driven by the entry
//! points below: [`map`] yields transformed rows lazily, [`foreach`] and
//! [`reduce`] consume a traversal eagerly, and [`apply`] turns each visited
//! row into a [`Mutation`] applied to the table as the scan goes.
//!
//! Rows come out in strict index order for the requested direction. Scans
//! opened by [`apply`] lock their cursor exclusively before positioning it.

mod apply;
mod scan;
mod spec;

use std::iter::FusedIterator;

use crate::engine::{Cursor, Transaction};
use crate::types::{Result, TrawlError};
use crate::value::Row;

pub use apply::{Apply, Mutation};
pub use scan::{Scan, ScanState};
pub use spec::{RowFilter, Target, TraversalSpec};

/// Read-only traversal returned by [`map`].
pub struct Traversal<'a, C: Cursor, F> {
    scan: Scan<'a, C>,
    map: F,
    done: bool,
}

impl<'a, C, F, T> Traversal<'a, C, F>
where
    C: Cursor,
    F: FnMut(Row) -> T,
{
    /// Runs the traversal to the end for the mapping's side effects, then
    /// closes it.
    pub fn traverse_all(mut self) -> Result<()> {
        for item in self.by_ref() {
            item?;
        }
        self.scan.close()
    }

    /// Stops the traversal and releases its cursors.
    pub fn close(&mut self) -> Result<()> {
        self.done = true;
        self.scan.close()
    }

    /// State of the underlying scan.
    pub fn state(&self) -> ScanState {
        self.scan.state()
    }
}

impl<C, F, T> Iterator for Traversal<'_, C, F>
where
    C: Cursor,
    F: FnMut(Row) -> T,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.scan.next_row() {
            Ok(Some(row)) => Some(Ok((self.map)(row))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

impl<C, F, T> FusedIterator for Traversal<'_, C, F>
where
    C: Cursor,
    F: FnMut(Row) -> T,
{
}

/// Lazily maps every selected row of the traversal described by `spec`.
pub fn map<'a, X, F, T>(
    txn: &'a X,
    spec: TraversalSpec<'a>,
    f: F,
) -> Result<Traversal<'a, X::Cursor, F>>
where
    X: Transaction,
    F: FnMut(Row) -> T,
{
    let scan = Scan::open(txn, spec, false)?;
    Ok(Traversal {
        scan,
        map: f,
        done: false,
    })
}

/// Calls `f` on every selected row.
pub fn foreach<'a, X, F>(txn: &'a X, spec: TraversalSpec<'a>, f: F) -> Result<()>
where
    X: Transaction,
    F: FnMut(Row),
{
    map(txn, spec, f)?.traverse_all()
}

/// Folds every selected row into an accumulator.
pub fn reduce<'a, X, T, F>(txn: &'a X, spec: TraversalSpec<'a>, initial: T, mut f: F) -> Result<T>
where
    X: Transaction,
    F: FnMut(T, Row) -> T,
{
    let mut acc = Some(initial);
    map(txn, spec, |row| {
        if let Some(current) = acc.take() {
            acc = Some(f(current, row));
        }
    })?
    .traverse_all()?;
    acc.ok_or(TrawlError::Misuse("reduction accumulator lost"))
}

/// Opens a write-mode traversal applying `f`'s mutations to the target table.
///
/// Mutations always go to the table's clustered index, also when `spec`
/// targets a secondary index. Nothing happens until the returned [`Apply`]
/// is iterated or driven with [`Apply::traverse_all`].
pub fn apply<'a, X, F>(txn: &'a X, spec: TraversalSpec<'a>, f: F) -> Result<Apply<'a, X, F>>
where
    X: Transaction,
    F: FnMut(Row) -> Mutation,
{
    let scan = Scan::open(txn, spec, true)?;
    Ok(Apply::new(txn, scan, f))
}
