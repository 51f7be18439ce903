#![forbid(unsafe_code)]

//! Single-row operations against a table's clustered index.
//!
//! Every call opens one cursor on the table, positions it with a
//! greater-or-equal search on the primary key prefix, and confirms the
//! positioned row with [`crate::key::matches`] before acting on it. Write
//! calls escalate the cursor to an exclusive lock before positioning. Tuples
//! are disposed and the cursor closed on every exit path.

use tracing::{debug, warn};

use crate::codec;
use crate::engine::{Cursor, LockMode, SearchMode, Transaction, Tuple};
use crate::key;
use crate::schema::TableDef;
use crate::types::Result;
use crate::value::Row;

/// Opens a cursor on `table`, runs `body`, and closes the cursor whatever the
/// outcome. A close failure after a successful body is returned; after a
/// failed body it is logged and the body's error wins.
fn with_cursor<X, R>(
    txn: &X,
    table: &TableDef,
    write: bool,
    body: impl FnOnce(&mut X::Cursor) -> Result<R>,
) -> Result<R>
where
    X: Transaction,
{
    let mut cursor = txn.open_table(table)?;
    let result = run(&mut cursor, write, body);
    match result {
        Ok(value) => {
            cursor.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = cursor.close() {
                warn!(table = table.name(), error = %close_err, "crud.cursor.close_failed");
            }
            Err(err)
        }
    }
}

fn run<C: Cursor, R>(
    cursor: &mut C,
    write: bool,
    body: impl FnOnce(&mut C) -> Result<R>,
) -> Result<R> {
    if write {
        cursor.set_lock_mode(LockMode::IntentionExclusive)?;
        cursor.lock(LockMode::Exclusive)?;
    }
    body(cursor)
}

/// Positions on the primary key taken from `key` and returns the row under the
/// cursor, still staged in its read tuple, if it matches exactly.
fn find_exact<C: Cursor>(cursor: &mut C, table: &TableDef, key: &Row) -> Result<Option<(Tuple, Row)>> {
    let primary = table.primary_index();
    let mut search = cursor.search_tuple(codec::encode_prefix(primary.columns(), key)?)?;
    let positioned = cursor.search(&search, SearchMode::GreaterOrEqual);
    search.dispose()?;
    if !(positioned? && cursor.has_next()) {
        return Ok(None);
    }
    let mut read = cursor.read_tuple()?;
    cursor.read_row(&mut read)?;
    let found = codec::decode(&read, table)?;
    if !key::matches(primary.columns(), key, &found) {
        read.dispose()?;
        return Ok(None);
    }
    Ok(Some((read, found)))
}

fn finish(mut tuple: Tuple) -> Result<()> {
    tuple.clear()?;
    tuple.dispose()
}

/// Loads the row whose primary key equals the key columns of `key`.
pub fn load<X: Transaction>(txn: &X, table: &TableDef, key: &Row) -> Result<Option<Row>> {
    let row = with_cursor(txn, table, false, |cursor| {
        match find_exact(cursor, table, key)? {
            Some((read, row)) => {
                finish(read)?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    })?;
    debug!(table = table.name(), hit = row.is_some(), "crud.load");
    Ok(row)
}

/// Inserts `data` as a new row. A duplicate primary or unique secondary key
/// fails with [`crate::types::EngineStatus::DuplicateKey`].
pub fn insert<X: Transaction>(txn: &X, table: &TableDef, data: &Row) -> Result<()> {
    let result = with_cursor(txn, table, true, |cursor| {
        let payload = codec::encode_row(table, data)?;
        let mut tuple = cursor.read_tuple()?;
        cursor.insert_row(&mut tuple, payload)?;
        finish(tuple)
    });
    match &result {
        Ok(()) => debug!(table = table.name(), "crud.insert"),
        Err(err) if err.is_duplicate_key() => {
            debug!(table = table.name(), "crud.insert.duplicate_key")
        }
        Err(_) => {}
    }
    result
}

/// Replaces the row matching the primary key of `data`. Returns `false` when
/// no such row exists.
pub fn update<X: Transaction>(txn: &X, table: &TableDef, data: &Row) -> Result<bool> {
    let hit = with_cursor(txn, table, true, |cursor| {
        let Some((mut read, _)) = find_exact(cursor, table, data)? else {
            return Ok(false);
        };
        let payload = codec::encode_row(table, data)?;
        cursor.update_row(&mut read, payload)?;
        finish(read)?;
        Ok(true)
    })?;
    debug!(table = table.name(), hit, "crud.update");
    Ok(hit)
}

/// Updates the row matching the primary key of `data`, or inserts `data` when
/// there is none. Returns `true` for an update and `false` for an insert.
pub fn insert_or_update<X: Transaction>(txn: &X, table: &TableDef, data: &Row) -> Result<bool> {
    let updated = with_cursor(txn, table, true, |cursor| {
        let payload = codec::encode_row(table, data)?;
        if let Some((mut read, _)) = find_exact(cursor, table, data)? {
            cursor.update_row(&mut read, payload)?;
            finish(read)?;
            return Ok(true);
        }
        let mut tuple = cursor.read_tuple()?;
        cursor.insert_row(&mut tuple, payload)?;
        finish(tuple)?;
        Ok(false)
    })?;
    debug!(table = table.name(), updated, "crud.insert_or_update");
    Ok(updated)
}

/// Deletes the row matching the primary key of `key`. Returns `false` when no
/// such row exists.
pub fn delete<X: Transaction>(txn: &X, table: &TableDef, key: &Row) -> Result<bool> {
    let hit = with_cursor(txn, table, true, |cursor| {
        let Some((read, _)) = find_exact(cursor, table, key)? else {
            return Ok(false);
        };
        cursor.delete_row()?;
        finish(read)?;
        Ok(true)
    })?;
    debug!(table = table.name(), hit, "crud.delete");
    Ok(hit)
}
