#![forbid(unsafe_code)]

//! Transaction scoping plus CRUD and traversal entry points bound to one
//! database and one set of [`TemplateOptions`].

use tracing::{debug, warn};

use crate::crud;
use crate::engine::{Database, Transaction, TransactionLevel};
use crate::options::TemplateOptions;
use crate::schema::TableDef;
use crate::traverse::{self, Apply, Mutation, Traversal, TraversalSpec};
use crate::types::{Result, TrawlError};
use crate::value::Row;

type CursorOf<D> = <<D as Database>::Txn as Transaction>::Cursor;

/// Entry point tying a [`Database`] to template options.
///
/// ```
/// use trawl::engine::mem::MemDatabase;
/// use trawl::schema::{ColumnType, TableDef};
/// use trawl::template::Template;
/// use trawl::types::TrawlError;
/// use trawl::value::Row;
///
/// let db = MemDatabase::new();
/// let table = TableDef::builder("kv")
///     .column("k", ColumnType::Varchar, 32, &[])
///     .column("v", ColumnType::Int, 8, &[])
///     .index("PRIMARY", "k", true, true)
///     .build()?;
/// db.create_table(&table)?;
///
/// let template = Template::new(db);
/// template.in_transaction(|txn| template.insert(txn, &table, &Row::new().with("k", "a").with("v", 1)))?;
/// let row = template.in_transaction(|txn| template.load(txn, &table, &Row::new().with("k", "a")))?;
/// assert_eq!(row.and_then(|r| r.value("v").as_i64()), Some(1));
/// # Ok::<(), TrawlError>(())
/// ```
pub struct Template<D: Database> {
    db: D,
    options: TemplateOptions,
}

impl<D: Database> Template<D> {
    /// Template with default options.
    pub fn new(db: D) -> Self {
        Self::with_options(db, TemplateOptions::default())
    }

    /// Template with explicit options.
    pub fn with_options(db: D, options: TemplateOptions) -> Self {
        Self { db, options }
    }

    /// Underlying database.
    pub fn database(&self) -> &D {
        &self.db
    }

    /// Options this template was built with.
    pub fn options(&self) -> &TemplateOptions {
        &self.options
    }

    /// Runs `f` in a transaction at the configured isolation level.
    pub fn in_transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&D::Txn) -> std::result::Result<T, E>,
        E: From<TrawlError>,
    {
        self.in_transaction_at(self.options.isolation, f)
    }

    /// Runs `f` in a transaction at `level`, committing when it returns `Ok`
    /// and rolling back when it returns `Err`. The callback's error is
    /// returned unchanged even if the rollback itself fails.
    pub fn in_transaction_at<T, E, F>(&self, level: TransactionLevel, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&D::Txn) -> std::result::Result<T, E>,
        E: From<TrawlError>,
    {
        let txn = self.db.begin(level)?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                debug!(?level, "template.txn.commit");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    warn!(error = %rollback_err, "template.txn.rollback_failed");
                } else {
                    debug!(?level, "template.txn.rollback");
                }
                Err(err)
            }
        }
    }

    /// See [`crud::load`].
    pub fn load(&self, txn: &D::Txn, table: &TableDef, key: &Row) -> Result<Option<Row>> {
        let row = crud::load(txn, table, key)?;
        self.options.metrics.row_loaded(row.is_some());
        Ok(row)
    }

    /// See [`crud::insert`].
    pub fn insert(&self, txn: &D::Txn, table: &TableDef, data: &Row) -> Result<()> {
        crud::insert(txn, table, data)?;
        self.options.metrics.row_inserted();
        Ok(())
    }

    /// See [`crud::update`].
    pub fn update(&self, txn: &D::Txn, table: &TableDef, data: &Row) -> Result<bool> {
        let hit = crud::update(txn, table, data)?;
        self.options.metrics.row_updated(hit);
        Ok(hit)
    }

    /// See [`crud::insert_or_update`].
    pub fn insert_or_update(&self, txn: &D::Txn, table: &TableDef, data: &Row) -> Result<bool> {
        let updated = crud::insert_or_update(txn, table, data)?;
        self.options.metrics.row_upserted(updated);
        Ok(updated)
    }

    /// See [`crud::delete`].
    pub fn delete(&self, txn: &D::Txn, table: &TableDef, key: &Row) -> Result<bool> {
        let hit = crud::delete(txn, table, key)?;
        self.options.metrics.row_deleted(hit);
        Ok(hit)
    }

    fn prepare<'a>(&self, spec: TraversalSpec<'a>, write: bool) -> TraversalSpec<'a> {
        self.options
            .metrics
            .traversal_opened(spec.target().is_secondary(), write);
        match spec.search_mode() {
            Some(_) => spec,
            None => spec.with_search_mode(self.options.default_search_mode),
        }
    }

    /// See [`traverse::map`]. Unset search modes fall back to
    /// [`TemplateOptions::default_search_mode`].
    pub fn map<'a, F, T>(
        &self,
        txn: &'a D::Txn,
        spec: TraversalSpec<'a>,
        mut f: F,
    ) -> Result<Traversal<'a, CursorOf<D>, impl FnMut(Row) -> T>>
    where
        F: FnMut(Row) -> T,
    {
        let metrics = self.options.metrics.clone();
        traverse::map(txn, self.prepare(spec, false), move |row| {
            metrics.row_visited();
            f(row)
        })
    }

    /// See [`traverse::foreach`].
    pub fn foreach<'a, F>(&self, txn: &'a D::Txn, spec: TraversalSpec<'a>, f: F) -> Result<()>
    where
        F: FnMut(Row),
    {
        self.map(txn, spec, f)?.traverse_all()
    }

    /// See [`traverse::reduce`].
    pub fn reduce<'a, T, F>(
        &self,
        txn: &'a D::Txn,
        spec: TraversalSpec<'a>,
        initial: T,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut(T, Row) -> T,
    {
        let metrics = &self.options.metrics;
        traverse::reduce(txn, self.prepare(spec, false), initial, |acc, row| {
            metrics.row_visited();
            f(acc, row)
        })
    }

    /// See [`traverse::apply`].
    pub fn apply<'a, F>(
        &self,
        txn: &'a D::Txn,
        spec: TraversalSpec<'a>,
        mut f: F,
    ) -> Result<Apply<'a, D::Txn, impl FnMut(Row) -> Mutation>>
    where
        F: FnMut(Row) -> Mutation,
    {
        let metrics = self.options.metrics.clone();
        traverse::apply(txn, self.prepare(spec, true), move |row| {
            metrics.row_visited();
            f(row)
        })
    }
}

impl<D: Database + std::fmt::Debug> std::fmt::Debug for Template<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("db", &self.db)
            .field("options", &self.options)
            .finish()
    }
}
