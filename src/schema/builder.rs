use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ColumnAttr, ColumnDef, ColumnType, IndexDef, TableDef, TableInner};
use crate::types::{Result, TrawlError};

struct PendingIndex {
    columns: Vec<String>,
    primary: bool,
    unique: bool,
}

/// Incremental builder for [`TableDef`].
///
/// Indexes are declared one column at a time: repeated [`TableBuilder::index`]
/// calls with the same index name append key columns in call order.
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnDef>,
    indexes: Vec<(String, PendingIndex)>,
}

impl TableBuilder {
    /// Creates a builder for a table called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Appends a column to the row layout.
    pub fn column(
        mut self,
        name: impl Into<String>,
        ty: ColumnType,
        length: u32,
        attrs: &[ColumnAttr],
    ) -> Self {
        let index = self.columns.len();
        self.columns.push(ColumnDef {
            name: name.into(),
            ty,
            length,
            attrs: attrs.to_vec(),
            index,
        });
        self
    }

    /// Appends `column` to the index called `index_name`, creating the index on first use.
    pub fn index(
        mut self,
        index_name: impl Into<String>,
        column: impl Into<String>,
        primary: bool,
        unique: bool,
    ) -> Self {
        let index_name = index_name.into();
        let column = column.into();
        match self.indexes.iter_mut().find(|(name, _)| *name == index_name) {
            Some((_, pending)) => {
                pending.columns.push(column);
                pending.primary |= primary;
                pending.unique |= unique;
            }
            None => self.indexes.push((
                index_name,
                PendingIndex {
                    columns: vec![column],
                    primary,
                    unique,
                },
            )),
        }
        self
    }

    /// Validates the declarations and freezes them into a [`TableDef`].
    pub fn build(self) -> Result<TableDef> {
        if self.columns.is_empty() {
            return Err(TrawlError::InvalidArgument(format!(
                "table '{}' has no columns",
                self.name
            )));
        }
        for (pos, col) in self.columns.iter().enumerate() {
            if self.columns[..pos].iter().any(|prev| prev.name == col.name) {
                return Err(TrawlError::InvalidArgument(format!(
                    "table '{}' declares column '{}' twice",
                    self.name, col.name
                )));
            }
            if col.ty.is_integer_type() && !matches!(col.length, 1 | 2 | 4 | 8) {
                return Err(TrawlError::InvalidArgument(format!(
                    "column '{}' of table '{}' has integer width {}; expected 1, 2, 4, or 8",
                    col.name, self.name, col.length
                )));
            }
        }

        let mut primary = None;
        let mut secondary = BTreeMap::new();
        for (index_name, pending) in self.indexes {
            let mut columns = Vec::with_capacity(pending.columns.len());
            for column in &pending.columns {
                let def = self
                    .columns
                    .iter()
                    .find(|col| col.name == *column)
                    .ok_or_else(|| {
                        TrawlError::InvalidArgument(format!(
                            "index '{index_name}' references unknown column '{column}'"
                        ))
                    })?;
                columns.push(def.clone());
            }
            let def = IndexDef {
                name: index_name.clone(),
                columns,
                primary: pending.primary,
                unique: pending.unique || pending.primary,
            };
            if def.primary {
                if primary.replace(def).is_some() {
                    return Err(TrawlError::InvalidArgument(format!(
                        "table '{}' declares more than one primary index",
                        self.name
                    )));
                }
            } else {
                secondary.insert(index_name, def);
            }
        }

        let primary = primary.ok_or_else(|| {
            TrawlError::InvalidArgument(format!("table '{}' has no primary index", self.name))
        })?;
        Ok(TableDef {
            inner: Arc::new(TableInner {
                name: self.name,
                columns: self.columns,
                primary,
                secondary,
            }),
        })
    }
}
