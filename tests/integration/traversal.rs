#![allow(missing_docs)]

mod support;

use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use trawl::crud;
use trawl::engine::mem::MemDatabase;
use trawl::engine::{Database, Direction, SearchMode, Transaction, TransactionLevel};
use trawl::schema::{ColumnAttr, ColumnType, TableDef};
use trawl::traverse::{self, Mutation, ScanState, Target, TraversalSpec};
use trawl::types::Result;
use trawl::value::Row;

use support::{int, populated_buz};

/// Prefix `a = 3`, continue while `a < 5`, select odd `b` with even `c`.
fn primary_spec(table: &TableDef) -> TraversalSpec<'static> {
    TraversalSpec::new(Target::table(table))
        .with_key_prefix(Row::new().with("a", 3))
        .with_continuation(|row: &Row| int(row, "a") < 5)
        .with_selection(|row: &Row| int(row, "b") % 2 == 1 && int(row, "c") % 2 == 0)
}

fn sum_d<X: Transaction>(txn: &X, table: &TableDef) -> Result<i64> {
    traverse::reduce(txn, primary_spec(table), 0, |acc, row| acc + int(&row, "d"))
}

fn doubled(mut row: Row) -> Mutation {
    let d = int(&row, "d");
    row.insert("d", d * 2);
    Mutation::Upsert(row)
}

fn numbers_table() -> Result<TableDef> {
    TableDef::builder("numbers")
        .column("n", ColumnType::Int, 8, &[ColumnAttr::NotNull])
        .column("label", ColumnType::Varchar, 24, &[])
        .index("PRIMARY", "n", true, true)
        .build()
}

fn keys_in<X: Transaction>(txn: &X, spec: TraversalSpec<'_>) -> Result<Vec<i64>> {
    traverse::map(txn, spec, |row| int(&row, "n"))?.collect()
}

fn shuffled_numbers(seed: u64, count: i64) -> Result<(MemDatabase, TableDef, Vec<i64>)> {
    let db = MemDatabase::new();
    let table = numbers_table()?;
    db.create_table(&table)?;
    let mut keys: Vec<i64> = (0..count).map(|n| n * 3 - count).collect();
    keys.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    for &n in &keys {
        crud::insert(&txn, &table, &Row::new().with("n", n).with("label", format!("#{n}")))?;
    }
    txn.commit()?;
    keys.sort_unstable();
    Ok((db, table, keys))
}

#[test]
fn primary_prefix_scenario() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;

    let matches: Vec<Row> = traverse::map(&txn, primary_spec(&table), |row| row)?
        .collect::<Result<_>>()?;
    assert_eq!(matches.len(), 6);
    assert!(matches.iter().all(|row| (3..5).contains(&int(row, "a"))));
    assert_eq!(sum_d(&txn, &table)?, 12);

    traverse::apply(&txn, primary_spec(&table), doubled)?.traverse_all()?;
    assert_eq!(sum_d(&txn, &table)?, 24);
    txn.commit()?;

    assert_eq!(db.row_count("buz")?, 72);
    Ok(())
}

#[test]
fn apply_doubling_doubles_the_sum_across_transactions() -> Result<()> {
    let (db, table) = populated_buz()?;
    let before = {
        let txn = db.begin(TransactionLevel::RepeatableRead)?;
        sum_d(&txn, &table)?
    };
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let mutations: Vec<Mutation> = traverse::apply(&txn, primary_spec(&table), doubled)?
        .collect::<Result<_>>()?;
    assert_eq!(mutations.len(), 6);
    assert!(mutations.iter().all(|m| matches!(m, Mutation::Upsert(_))));
    txn.commit()?;

    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    assert_eq!(sum_d(&txn, &table)?, before * 2);
    Ok(())
}

#[test]
fn continuation_failing_on_first_row_yields_nothing() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let stop_at_once = || {
        TraversalSpec::new(Target::table(&table))
            .with_key_prefix(Row::new().with("a", 2))
            .with_continuation(|row: &Row| int(row, "a") != 2)
    };

    let mut visited = 0;
    traverse::foreach(&txn, stop_at_once(), |_| visited += 1)?;
    assert_eq!(visited, 0);

    let mut apply = traverse::apply(&txn, stop_at_once(), Mutation::Delete)?;
    assert_eq!(apply.state(), ScanState::Closed);
    assert!(apply.next().is_none());
    drop(apply);
    txn.commit()?;

    assert_eq!(db.row_count("buz")?, 72);
    Ok(())
}

#[test]
fn apply_delete_removes_the_selected_rows_only() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    traverse::apply(&txn, primary_spec(&table), Mutation::Delete)?.traverse_all()?;
    assert_eq!(sum_d(&txn, &table)?, 0);
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, 66);
    Ok(())
}

#[test]
fn ascending_and_descending_are_reverses() -> Result<()> {
    let (db, table, sorted) = shuffled_numbers(0xC0FFEE, 40)?;
    let txn = db.begin(TransactionLevel::ReadCommitted)?;

    let asc = keys_in(&txn, TraversalSpec::new(Target::table(&table)))?;
    let mut desc = keys_in(
        &txn,
        TraversalSpec::new(Target::table(&table))
            .with_direction(Direction::Desc)
            .with_search_mode(SearchMode::LessOrEqual),
    )?;
    assert_eq!(asc, sorted);
    assert!(desc.windows(2).all(|pair| pair[0] >= pair[1]));
    desc.reverse();
    assert_eq!(asc, desc);
    Ok(())
}

#[test]
fn search_modes_pick_the_boundary_row() -> Result<()> {
    let (db, table, _) = shuffled_numbers(7, 10)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    // keys are -10, -7, ..., 17
    let first = |mode: SearchMode, direction: Direction, n: i64| -> Result<Option<i64>> {
        let spec = TraversalSpec::new(Target::table(&table))
            .with_key_prefix(Row::new().with("n", n))
            .with_search_mode(mode)
            .with_direction(direction);
        keys_in(&txn, spec).map(|keys| keys.first().copied())
    };

    assert_eq!(first(SearchMode::GreaterOrEqual, Direction::Asc, -1)?, Some(-1));
    assert_eq!(first(SearchMode::Greater, Direction::Asc, -1)?, Some(2));
    assert_eq!(first(SearchMode::GreaterOrEqual, Direction::Asc, 0)?, Some(2));
    assert_eq!(first(SearchMode::LessOrEqual, Direction::Desc, 0)?, Some(-1));
    assert_eq!(first(SearchMode::Less, Direction::Desc, -1)?, Some(-4));
    assert_eq!(first(SearchMode::GreaterOrEqual, Direction::Asc, 18)?, None);
    assert_eq!(first(SearchMode::Less, Direction::Desc, -10)?, None);
    Ok(())
}

#[test]
fn dropping_a_traversal_midway_closes_it() -> Result<()> {
    let (db, table, _) = shuffled_numbers(3, 12)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    {
        let mut traversal = traverse::map(&txn, TraversalSpec::new(Target::table(&table)), |row| row)?;
        assert_eq!(traversal.state(), ScanState::Iterating);
        traversal.next().transpose()?;
        traversal.close()?;
        assert_eq!(traversal.state(), ScanState::Closed);
        assert!(traversal.next().is_none());
        traversal.close()?;
    }
    {
        let mut traversal = traverse::map(&txn, TraversalSpec::new(Target::table(&table)), |row| row)?;
        traversal.next().transpose()?;
    }
    let ledger = db.ledger().snapshot();
    assert_eq!(ledger.open_cursors, 0);
    assert_eq!(ledger.live_tuples, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prefix_scans_return_the_sorted_tail(
        keys in proptest::collection::btree_set(-50i64..50, 0..30),
        start in -60i64..60,
    ) {
        let db = MemDatabase::new();
        let table = numbers_table().unwrap();
        db.create_table(&table).unwrap();
        let txn = db.begin(TransactionLevel::RepeatableRead).unwrap();
        for &n in &keys {
            crud::insert(&txn, &table, &Row::new().with("n", n)).unwrap();
        }

        let asc = keys_in(
            &txn,
            TraversalSpec::new(Target::table(&table)).with_key_prefix(Row::new().with("n", start)),
        ).unwrap();
        let expected: Vec<i64> = keys.range(start..).copied().collect();
        prop_assert_eq!(asc, expected);

        let desc = keys_in(
            &txn,
            TraversalSpec::new(Target::table(&table))
                .with_key_prefix(Row::new().with("n", start))
                .with_search_mode(SearchMode::LessOrEqual)
                .with_direction(Direction::Desc),
        ).unwrap();
        let expected: Vec<i64> = keys.range(..=start).rev().copied().collect();
        prop_assert_eq!(desc, expected);
    }
}
