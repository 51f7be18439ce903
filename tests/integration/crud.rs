#![allow(missing_docs)]

mod support;

use proptest::prelude::*;
use trawl::crud;
use trawl::engine::mem::MemDatabase;
use trawl::engine::{Database, Transaction, TransactionLevel};
use trawl::key;
use trawl::schema::{ColumnAttr, ColumnType, TableDef};
use trawl::types::{EngineStatus, Result, TrawlError};
use trawl::value::{Row, Value};

use support::{buz_row, empty_buz, int, populated_buz};

fn kv_table() -> Result<TableDef> {
    TableDef::builder("kv")
        .column("k", ColumnType::Varchar, 16, &[ColumnAttr::NotNull])
        .column("v", ColumnType::Int, 8, &[])
        .column("blob", ColumnType::Blob, 0, &[])
        .index("PRIMARY", "k", true, true)
        .build()
}

#[test]
fn loaded_row_matches_inserted_row() -> Result<()> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let row = buz_row(1, 0, 4, 99);
    crud::insert(&txn, &table, &row)?;

    let loaded = crud::load(&txn, &table, &Row::new().with("a", 1).with("b", 0).with("c", 4))?
        .ok_or(TrawlError::Misuse("row vanished"))?;
    assert!(key::matches(table.columns(), &row, &loaded));
    assert_eq!(int(&loaded, "d"), 99);
    txn.commit()?;
    Ok(())
}

#[test]
fn key_values_compare_numerically() -> Result<()> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    crud::insert(&txn, &table, &buz_row(2, 1, 3, 3))?;

    let key = Row::new()
        .with("a", "2")
        .with("b", Value::UInt(1))
        .with("c", num_bigint::BigInt::from(3));
    assert!(crud::load(&txn, &table, &key)?.is_some());
    Ok(())
}

#[test]
fn duplicate_insert_keeps_first_row() -> Result<()> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    crud::insert(&txn, &table, &buz_row(0, 0, 0, 1))?;

    let err = crud::insert(&txn, &table, &buz_row(0, 0, 0, 2)).unwrap_err();
    assert!(err.is_duplicate_key());
    assert_eq!(err.status().map(EngineStatus::code), Some(18));

    let row = crud::load(&txn, &table, &buz_row(0, 0, 0, 0))?.expect("first row kept");
    assert_eq!(int(&row, "d"), 1);
    Ok(())
}

#[test]
fn update_of_absent_key_changes_nothing() -> Result<()> {
    let (db, table) = populated_buz()?;
    let before = db.row_count("buz")?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;

    assert!(!crud::update(&txn, &table, &buz_row(9, 0, 0, 7))?);
    assert!(crud::load(&txn, &table, &buz_row(9, 0, 0, 0))?.is_none());
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, before);
    Ok(())
}

#[test]
fn update_replaces_non_key_columns() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    assert!(crud::update(&txn, &table, &buz_row(5, 1, 5, -1))?);
    let row = crud::load(&txn, &table, &buz_row(5, 1, 5, 0))?.expect("row present");
    assert_eq!(int(&row, "d"), -1);
    Ok(())
}

#[test]
fn repeated_upsert_leaves_one_row() -> Result<()> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let row = buz_row(3, 1, 2, 8);
    assert!(!crud::insert_or_update(&txn, &table, &row)?);
    assert!(crud::insert_or_update(&txn, &table, &row)?);
    txn.commit()?;

    assert_eq!(db.row_count("buz")?, 1);
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let loaded = crud::load(&txn, &table, &row)?.expect("row present");
    assert!(key::matches(table.columns(), &row, &loaded));
    Ok(())
}

#[test]
fn delete_reports_presence() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let key = Row::new().with("a", 4).with("b", 1).with("c", 0);

    assert!(!crud::delete(&txn, &table, &Row::new().with("a", 40).with("b", 1).with("c", 0))?);
    assert!(crud::delete(&txn, &table, &key)?);
    assert!(crud::load(&txn, &table, &key)?.is_none());
    assert!(!crud::delete(&txn, &table, &key)?);
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, 71);
    Ok(())
}

#[test]
fn string_key_prefix_is_not_a_match() -> Result<()> {
    let db = MemDatabase::new();
    let table = kv_table()?;
    db.create_table(&table)?;
    let txn = db.begin(TransactionLevel::ReadCommitted)?;
    crud::insert(&txn, &table, &Row::new().with("k", "abc").with("v", 1).with("blob", vec![1u8, 2]))?;

    assert!(crud::load(&txn, &table, &Row::new().with("k", "ab"))?.is_none());
    assert!(!crud::delete(&txn, &table, &Row::new().with("k", "abd"))?);
    let row = crud::load(&txn, &table, &Row::new().with("k", "abc"))?.expect("exact key");
    assert_eq!(row.value("blob").as_bytes(), Some(&[1u8, 2][..]));
    Ok(())
}

#[test]
fn rolled_back_writes_disappear() -> Result<()> {
    let (db, table) = empty_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    crud::insert(&txn, &table, &buz_row(1, 1, 1, 1))?;
    txn.rollback()?;

    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    assert!(crud::load(&txn, &table, &buz_row(1, 1, 1, 0))?.is_none());
    Ok(())
}

#[test]
fn oversized_string_is_rejected_before_writing() -> Result<()> {
    let db = MemDatabase::new();
    let table = kv_table()?;
    db.create_table(&table)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let err = crud::insert(&txn, &table, &Row::new().with("k", "x".repeat(17))).unwrap_err();
    assert!(matches!(err, TrawlError::Coercion { ref column, .. } if column == "k"));
    txn.commit()?;
    assert_eq!(db.row_count("kv")?, 0);
    assert_eq!(db.ledger().snapshot().live_tuples, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn inserted_keys_load_back_and_neighbours_miss(keys in proptest::collection::btree_set("[a-c]{1,4}", 1..12)) {
        let db = MemDatabase::new();
        let table = kv_table().unwrap();
        db.create_table(&table).unwrap();
        let txn = db.begin(TransactionLevel::RepeatableRead).unwrap();
        for (v, k) in keys.iter().enumerate() {
            crud::insert(&txn, &table, &Row::new().with("k", k.as_str()).with("v", v as i64)).unwrap();
        }
        for (v, k) in keys.iter().enumerate() {
            let row = crud::load(&txn, &table, &Row::new().with("k", k.as_str())).unwrap();
            prop_assert_eq!(row.and_then(|r| r.value("v").as_i64()), Some(v as i64));

            let longer = format!("{k}z");
            prop_assert!(crud::load(&txn, &table, &Row::new().with("k", longer)).unwrap().is_none());
        }
        txn.rollback().unwrap();
        prop_assert_eq!(db.ledger().snapshot().open_cursors, 0);
    }
}
