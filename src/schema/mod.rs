#![forbid(unsafe_code)]

//! Table, column, and index definitions.
//!
//! Definitions are immutable once built and are passed explicitly into every
//! codec, CRUD, and traversal call; there is no global registry.

mod builder;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builder::TableBuilder;

/// Logical column type as understood by the storage engine.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Varchar,
    Char,
    Binary,
    Varbinary,
    Blob,
    Int,
    Sys,
    Float,
    Double,
    Decimal,
    VarcharAnyCharset,
    CharAnyCharset,
}

impl ColumnType {
    /// Binary, varbinary, and blob columns.
    pub const fn is_byte_array_type(self) -> bool {
        matches!(
            self,
            ColumnType::Binary | ColumnType::Varbinary | ColumnType::Blob
        )
    }

    /// Character columns, regardless of charset.
    pub const fn is_string_type(self) -> bool {
        matches!(
            self,
            ColumnType::Char
                | ColumnType::Varchar
                | ColumnType::CharAnyCharset
                | ColumnType::VarcharAnyCharset
        )
    }

    /// Fixed-width integer columns.
    pub const fn is_integer_type(self) -> bool {
        matches!(self, ColumnType::Int)
    }

    /// Float, double, and decimal columns.
    pub const fn is_decimal_family(self) -> bool {
        matches!(
            self,
            ColumnType::Float | ColumnType::Double | ColumnType::Decimal
        )
    }
}

/// Column attribute flags.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ColumnAttr {
    NotNull,
    Unsigned,
    Custom,
}

/// A single column of a table layout.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ColumnDef {
    name: String,
    ty: ColumnType,
    length: u32,
    attrs: Vec<ColumnAttr>,
    index: usize,
}

impl ColumnDef {
    /// Column name, unique within its table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical type.
    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    /// Declared length; byte width for integer columns.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Attribute set.
    pub fn attrs(&self) -> &[ColumnAttr] {
        &self.attrs
    }

    /// Ordinal position within the table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Declared with [`ColumnAttr::NotNull`].
    pub fn is_not_null(&self) -> bool {
        self.attrs.contains(&ColumnAttr::NotNull)
    }

    /// Declared with [`ColumnAttr::Unsigned`].
    pub fn is_unsigned(&self) -> bool {
        self.attrs.contains(&ColumnAttr::Unsigned)
    }
}

/// Ordered, non-empty list of columns forming a primary or secondary index.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    name: String,
    columns: Vec<ColumnDef>,
    primary: bool,
    unique: bool,
}

impl IndexDef {
    /// Index name as declared; the clustered index is usually `PRIMARY`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key columns in index order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Whether this is the clustered index defining physical row order.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Primary indexes are always unique.
    pub fn is_unique(&self) -> bool {
        self.primary || self.unique
    }
}

#[derive(Debug)]
struct TableInner {
    name: String,
    columns: Vec<ColumnDef>,
    primary: IndexDef,
    secondary: BTreeMap<String, IndexDef>,
}

/// Immutable table definition. Clones share the same underlying definition.
#[derive(Clone, Debug)]
pub struct TableDef {
    inner: Arc<TableInner>,
}

impl TableDef {
    /// Starts a builder for a table called `name`.
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    /// Table name, e.g. `db/table`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Columns in row-layout order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.inner.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.inner.columns.iter().find(|col| col.name == name)
    }

    /// The clustered index.
    pub fn primary_index(&self) -> &IndexDef {
        &self.inner.primary
    }

    /// Looks up a secondary index by name.
    pub fn secondary_index(&self, name: &str) -> Option<&IndexDef> {
        self.inner.secondary.get(name)
    }

    /// All secondary indexes, ordered by name.
    pub fn secondary_indexes(&self) -> impl Iterator<Item = &IndexDef> + '_ {
        self.inner.secondary.values()
    }
}

impl PartialEq for TableDef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.name == other.inner.name
                && self.inner.columns == other.inner.columns
                && self.inner.primary == other.inner.primary
                && self.inner.secondary == other.inner.secondary)
    }
}

impl Eq for TableDef {}
