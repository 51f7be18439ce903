#![allow(missing_docs)]

mod support;

use trawl::crud;
use trawl::engine::mem::MemDatabase;
use trawl::engine::{Database, Direction, SearchMode, Transaction, TransactionLevel};
use trawl::schema::{ColumnAttr, ColumnType, TableDef};
use trawl::traverse::{self, Mutation, Target, TraversalSpec};
use trawl::types::{Result, TrawlError};
use trawl::value::Row;

use support::{int, populated_buz, A_RANGE, C_RANGE};

/// Secondary index `bc` from `b = 1`, continuing while `b == 1`.
fn b_is_one(table: &TableDef) -> TraversalSpec<'static> {
    TraversalSpec::new(Target::index(table, "bc"))
        .with_key_prefix(Row::new().with("b", 1))
        .with_continuation(|row: &Row| int(row, "b") == 1)
}

fn odd_b_even_a(table: &TableDef) -> TraversalSpec<'static> {
    b_is_one(table).with_selection(|row: &Row| int(row, "b") % 2 == 1 && int(row, "a") % 2 == 0)
}

fn sum_d<X: Transaction>(txn: &X, spec: TraversalSpec<'_>) -> Result<i64> {
    traverse::reduce(txn, spec, 0, |acc, row| acc + int(&row, "d"))
}

#[test]
fn secondary_prefix_scenario() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;

    let all: Vec<Row> = traverse::map(&txn, b_is_one(&table), |row| row)?.collect::<Result<_>>()?;
    assert_eq!(all.len() as i64, A_RANGE * C_RANGE);
    assert!(all.iter().all(|row| int(row, "b") == 1));

    let selected = traverse::reduce(&txn, odd_b_even_a(&table), 0usize, |n, _| n + 1)?;
    assert_eq!(selected, 18);
    assert_eq!(sum_d(&txn, odd_b_even_a(&table))?, 45);

    traverse::apply(&txn, odd_b_even_a(&table), |mut row| {
        let d = int(&row, "d");
        row.insert("d", d * 2);
        Mutation::Upsert(row)
    })?
    .traverse_all()?;
    assert_eq!(sum_d(&txn, odd_b_even_a(&table))?, 90);
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, 72);
    Ok(())
}

#[test]
fn secondary_rows_follow_index_order() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let keys: Vec<(i64, i64)> = traverse::map(&txn, b_is_one(&table), |row| (int(&row, "c"), int(&row, "a")))?
        .collect::<Result<_>>()?;
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);

    let desc: Vec<(i64, i64)> = traverse::map(
        &txn,
        TraversalSpec::new(Target::index(&table, "bc"))
            .with_key_prefix(Row::new().with("b", 1))
            .with_search_mode(SearchMode::LessOrEqual)
            .with_direction(Direction::Desc),
        |row| (int(&row, "c"), int(&row, "a")),
    )?
    .collect::<Result<_>>()?;
    assert_eq!(desc.len(), 72);
    assert_eq!(desc[..36].iter().rev().copied().collect::<Vec<_>>(), keys);
    Ok(())
}

#[test]
fn secondary_scan_without_continuation_stops_at_the_end() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let spec = TraversalSpec::new(Target::index(&table, "bc")).with_key_prefix(Row::new().with("b", 1));
    let mut visited = 0;
    traverse::foreach(&txn, spec, |_| visited += 1)?;
    assert_eq!(visited, 36);
    Ok(())
}

#[test]
fn noop_mutations_leave_the_table_alone() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let mutations: Vec<Mutation> = traverse::apply(&txn, b_is_one(&table), |_| Mutation::NoOp)?
        .collect::<Result<_>>()?;
    assert_eq!(mutations.len(), 36);
    assert!(mutations.iter().all(|m| *m == Mutation::NoOp));
    assert_eq!(sum_d(&txn, odd_b_even_a(&table))?, 45);
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, 72);
    Ok(())
}

#[test]
fn deletes_go_to_the_clustered_index() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    traverse::apply(&txn, odd_b_even_a(&table), Mutation::Delete)?.traverse_all()?;

    assert_eq!(sum_d(&txn, odd_b_even_a(&table))?, 0);
    let remaining = traverse::reduce(&txn, b_is_one(&table), 0usize, |n, _| n + 1)?;
    assert_eq!(remaining, 18);
    let key = Row::new().with("a", 2).with("b", 1).with("c", 3);
    assert!(crud::load(&txn, &table, &key)?.is_none());
    txn.commit()?;
    assert_eq!(db.row_count("buz")?, 54);
    Ok(())
}

#[test]
fn unknown_index_is_rejected_without_leaking() -> Result<()> {
    let (db, table) = populated_buz()?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let spec = TraversalSpec::new(Target::index(&table, "cb"));
    match traverse::map(&txn, spec, |row| row) {
        Err(TrawlError::UnknownIndex { table, index }) => {
            assert_eq!(table, "buz");
            assert_eq!(index, "cb");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("traversal over a missing index opened"),
    }
    let ledger = db.ledger().snapshot();
    assert_eq!(ledger.open_cursors, 0);
    assert_eq!(ledger.live_tuples, 0);
    Ok(())
}

/// `accounts(id, v)` keyed on `id` with `by_v` on the mutable column `v`.
fn accounts(count: i64) -> Result<(MemDatabase, TableDef)> {
    support::init_tracing();
    let db = MemDatabase::new();
    let table = TableDef::builder("accounts")
        .column("id", ColumnType::Int, 4, &[ColumnAttr::NotNull])
        .column("v", ColumnType::Int, 8, &[])
        .index("PRIMARY", "id", true, true)
        .index("by_v", "v", false, false)
        .build()?;
    db.create_table(&table)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    for id in 0..count {
        crud::insert(&txn, &table, &Row::new().with("id", id).with("v", id))?;
    }
    txn.commit()?;
    Ok((db, table))
}

fn shift_v<X: Transaction>(txn: &X, spec: TraversalSpec<'_>, delta: i64) -> Result<Vec<i64>> {
    let mut seen = Vec::new();
    traverse::apply(txn, spec, |mut row| {
        seen.push(int(&row, "id"));
        let v = int(&row, "v");
        row.insert("v", v + delta);
        Mutation::Upsert(row)
    })?
    .traverse_all()?;
    Ok(seen)
}

#[test]
fn rows_moved_behind_an_ascending_scan_are_visited_once() -> Result<()> {
    let (db, table) = accounts(10)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let seen = shift_v(&txn, TraversalSpec::new(Target::index(&table, "by_v")), -1000)?;
    assert_eq!(seen, (0..10).collect::<Vec<_>>());

    let by_v = TraversalSpec::new(Target::index(&table, "by_v"));
    let values: Vec<i64> = traverse::map(&txn, by_v, |row| int(&row, "v"))?.collect::<Result<_>>()?;
    assert_eq!(values, (-1000..-990).collect::<Vec<_>>());
    txn.commit()?;
    assert_eq!(db.row_count("accounts")?, 10);
    Ok(())
}

#[test]
fn rows_moved_behind_a_descending_scan_are_visited_once() -> Result<()> {
    let (db, table) = accounts(10)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let spec = TraversalSpec::new(Target::index(&table, "by_v"))
        .with_search_mode(SearchMode::LessOrEqual)
        .with_direction(Direction::Desc);
    let seen = shift_v(&txn, spec, 1000)?;
    assert_eq!(seen, (0..10).rev().collect::<Vec<_>>());

    let by_v = TraversalSpec::new(Target::index(&table, "by_v"));
    let values: Vec<i64> = traverse::map(&txn, by_v, |row| int(&row, "v"))?.collect::<Result<_>>()?;
    assert_eq!(values, (1000..1010).collect::<Vec<_>>());
    txn.commit()?;
    assert_eq!(db.row_count("accounts")?, 10);
    Ok(())
}

#[test]
fn deleting_every_scanned_row_visits_each_once() -> Result<()> {
    let (db, table) = accounts(10)?;
    let txn = db.begin(TransactionLevel::RepeatableRead)?;
    let mut seen = Vec::new();
    traverse::apply(&txn, TraversalSpec::new(Target::index(&table, "by_v")), |row| {
        seen.push(int(&row, "id"));
        Mutation::Delete(row)
    })?
    .traverse_all()?;
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    txn.commit()?;
    assert_eq!(db.row_count("accounts")?, 0);
    Ok(())
}
