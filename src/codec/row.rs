//! Whole-row encoding and decoding.

use super::coerce::{coerce, decode_value};
use crate::engine::{Encoded, Tuple};
use crate::schema::{ColumnDef, TableDef};
use crate::types::Result;
use crate::value::Row;

/// Encodes `data` in the order of `source_columns`, or of every column of
/// `table` when `None`. Columns missing from `data` encode as NULL.
pub fn encode(
    table: &TableDef,
    source_columns: Option<&[ColumnDef]>,
    data: &Row,
) -> Result<Vec<Encoded>> {
    source_columns
        .unwrap_or_else(|| table.columns())
        .iter()
        .map(|column| coerce(data.value(column.name()), column))
        .collect()
}

/// Full-row payload for an insert or update.
pub fn encode_row(table: &TableDef, data: &Row) -> Result<Vec<Encoded>> {
    encode(table, None, data)
}

/// Positioning key for an index: the longest left-to-right run of `columns`
/// with a non-null value in `data`.
pub fn encode_prefix(columns: &[ColumnDef], data: &Row) -> Result<Vec<Encoded>> {
    columns
        .iter()
        .map_while(|column| match data.get(column.name()) {
            Some(value) if !value.is_null() => Some((value, column)),
            _ => None,
        })
        .map(|(value, column)| coerce(value, column))
        .collect()
}

/// Materializes a row holding every column of `table`, in table order.
pub fn decode(tuple: &Tuple, table: &TableDef) -> Result<Row> {
    let mut row = Row::with_capacity(table.columns().len());
    for column in table.columns() {
        row.insert(column.name(), decode_value(tuple, column)?);
    }
    Ok(row)
}
