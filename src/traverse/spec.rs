use std::fmt;

use crate::engine::{Direction, SearchMode};
use crate::schema::{ColumnDef, IndexDef, TableDef};
use crate::types::{Result, TrawlError};
use crate::value::Row;

/// Predicate over a decoded row.
///
/// Used in two places with different meanings: as the continuation filter a
/// `false` ends the scan for good, as the selection filter it only skips the
/// row.
pub trait RowFilter {
    /// Evaluates the predicate.
    fn accept(&self, row: &Row) -> bool;
}

impl<F> RowFilter for F
where
    F: Fn(&Row) -> bool,
{
    fn accept(&self, row: &Row) -> bool {
        self(row)
    }
}

/// Index a traversal runs over.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    table: TableDef,
    index: Option<String>,
}

impl Target {
    /// The clustered index of `table`.
    pub fn table(table: &TableDef) -> Self {
        Self {
            table: table.clone(),
            index: None,
        }
    }

    /// Secondary index `index` of `table`.
    pub fn index(table: &TableDef, index: impl Into<String>) -> Self {
        Self {
            table: table.clone(),
            index: Some(index.into()),
        }
    }

    /// Table whose rows are visited.
    pub fn table_def(&self) -> &TableDef {
        &self.table
    }

    /// Secondary index name, or `None` for the clustered index.
    pub fn index_name(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// True when rows are reached through a secondary index.
    pub fn is_secondary(&self) -> bool {
        self.index.is_some()
    }

    /// Resolves the secondary index definition, if one is named.
    pub fn secondary_index(&self) -> Result<Option<&IndexDef>> {
        let Some(name) = self.index.as_deref() else {
            return Ok(None);
        };
        self.table
            .secondary_index(name)
            .map(Some)
            .ok_or_else(|| TrawlError::UnknownIndex {
                table: self.table.name().to_owned(),
                index: name.to_owned(),
            })
    }

    /// Columns the positioning key is built from.
    pub fn key_columns(&self) -> Result<&[ColumnDef]> {
        Ok(match self.secondary_index()? {
            Some(index) => index.columns(),
            None => self.table.primary_index().columns(),
        })
    }
}

/// Everything a traversal needs besides the transaction: where to start, which
/// way to go, and the two row filters.
///
/// ```
/// use trawl::engine::Direction;
/// use trawl::schema::{ColumnType, TableDef};
/// use trawl::traverse::{Target, TraversalSpec};
/// use trawl::value::{Row, Value};
///
/// let table = TableDef::builder("t")
///     .column("a", ColumnType::Int, 4, &[])
///     .index("PRIMARY", "a", true, true)
///     .build()?;
/// let spec = TraversalSpec::new(Target::table(&table))
///     .with_key_prefix(Row::new().with("a", 3))
///     .with_direction(Direction::Asc)
///     .with_continuation(|row: &Row| row.value("a").as_i64() < Some(5))
///     .with_selection(|row: &Row| row.value("a") != &Value::Int(4));
/// assert!(spec.search_mode().is_none());
/// # Ok::<(), trawl::types::TrawlError>(())
/// ```
pub struct TraversalSpec<'f> {
    target: Target,
    key_prefix: Row,
    direction: Direction,
    search_mode: Option<SearchMode>,
    continuation: Option<Box<dyn RowFilter + 'f>>,
    selection: Option<Box<dyn RowFilter + 'f>>,
}

impl<'f> TraversalSpec<'f> {
    /// Full ascending scan of `target` with no filters.
    pub fn new(target: Target) -> Self {
        Self {
            target,
            key_prefix: Row::new(),
            direction: Direction::Asc,
            search_mode: None,
            continuation: None,
            selection: None,
        }
    }

    /// Row providing the leading key columns to position at.
    pub fn with_key_prefix(mut self, key_prefix: Row) -> Self {
        self.key_prefix = key_prefix;
        self
    }

    /// Scan order. Defaults to [`Direction::Asc`].
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Comparison used to position the cursor. Unset means greater-or-equal
    /// (or the template's configured default).
    pub fn with_search_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode);
        self
    }

    /// Scan continues while this holds; the first `false` ends it.
    pub fn with_continuation(mut self, filter: impl RowFilter + 'f) -> Self {
        self.continuation = Some(Box::new(filter));
        self
    }

    /// Only rows passing this filter are yielded.
    pub fn with_selection(mut self, filter: impl RowFilter + 'f) -> Self {
        self.selection = Some(Box::new(filter));
        self
    }

    /// Table and index being scanned.
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Row the cursor is positioned from; may be empty.
    pub fn key_prefix(&self) -> &Row {
        &self.key_prefix
    }

    /// Scan order.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Explicitly requested search mode, if any.
    pub fn search_mode(&self) -> Option<SearchMode> {
        self.search_mode
    }

    pub(crate) fn should_continue(&self, row: &Row) -> bool {
        self.continuation
            .as_ref()
            .is_none_or(|filter| filter.accept(row))
    }

    pub(crate) fn is_selected(&self, row: &Row) -> bool {
        self.selection
            .as_ref()
            .is_none_or(|filter| filter.accept(row))
    }
}

impl fmt::Debug for TraversalSpec<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalSpec")
            .field("table", &self.target.table.name())
            .field("index", &self.target.index)
            .field("key_prefix", &self.key_prefix)
            .field("direction", &self.direction)
            .field("search_mode", &self.search_mode)
            .field("continuation", &self.continuation.is_some())
            .field("selection", &self.selection.is_some())
            .finish()
    }
}
