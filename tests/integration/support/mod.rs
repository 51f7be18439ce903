#![allow(dead_code)]

use trawl::engine::mem::MemDatabase;
use trawl::engine::{Database, Transaction, TransactionLevel};
use trawl::schema::{ColumnAttr, ColumnType, TableDef};
use trawl::types::Result;
use trawl::value::Row;

pub const A_RANGE: i64 = 6;
pub const B_RANGE: i64 = 2;
pub const C_RANGE: i64 = 6;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `buz(a, b, c, d)` keyed on `(a, b, c)` with a non-unique secondary index
/// `bc` on `(b, c)`.
pub fn buz_table() -> Result<TableDef> {
    TableDef::builder("buz")
        .column("a", ColumnType::Int, 4, &[ColumnAttr::NotNull])
        .column("b", ColumnType::Int, 4, &[ColumnAttr::NotNull])
        .column("c", ColumnType::Int, 4, &[ColumnAttr::NotNull])
        .column("d", ColumnType::Int, 4, &[])
        .index("PRIMARY", "a", true, true)
        .index("PRIMARY", "b", true, true)
        .index("PRIMARY", "c", true, true)
        .index("bc", "b", false, false)
        .index("bc", "c", false, false)
        .build()
}

pub fn buz_row(a: i64, b: i64, c: i64, d: i64) -> Row {
    Row::new().with("a", a).with("b", b).with("c", c).with("d", d)
}

pub fn int(row: &Row, column: &str) -> i64 {
    row.value(column).as_i64().unwrap_or_else(|| panic!("{column} missing in {row}"))
}

/// Empty database holding the `buz` table.
pub fn empty_buz() -> Result<(MemDatabase, TableDef)> {
    init_tracing();
    let db = MemDatabase::new();
    let table = buz_table()?;
    db.create_table(&table)?;
    Ok((db, table))
}

/// `buz` populated with every `(a, b, c)` in range and `d = c`.
pub fn populated_buz() -> Result<(MemDatabase, TableDef)> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    for a in 0..A_RANGE {
        for b in 0..B_RANGE {
            for c in 0..C_RANGE {
                trawl::crud::insert(&txn, &table, &buz_row(a, b, c, c))?;
            }
        }
    }
    txn.commit()?;
    Ok((db, table))
}
