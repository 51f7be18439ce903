//! Exact-match verification after approximate positioning.
//!
//! Engine searches land on the first entry at or after the key, so a lookup
//! has to re-check the positioned row before trusting it.

use crate::codec::values_equal;
use crate::schema::ColumnDef;
use crate::value::Row;

/// Whether `expected` and `found` agree on every column in `key_columns`,
/// compared with the column type's equality. Missing columns read as NULL.
pub fn matches(key_columns: &[ColumnDef], expected: &Row, found: &Row) -> bool {
    key_columns.iter().all(|column| {
        values_equal(
            expected.value(column.name()),
            found.value(column.name()),
            column.ty(),
        )
    })
}
