use std::cmp::Ordering;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ResourceLedger;
use crate::schema::ColumnDef;
use crate::types::{EngineStatus, Result, TrawlError};
use crate::value::Value;

/// Column value in the engine's physical encoding.
///
/// The total order (NULL first, then by kind, then by value) is the order the
/// engine sorts index entries in.
#[allow(missing_docs)]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Encoded {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
}

impl Encoded {
    fn rank(&self) -> u8 {
        match self {
            Encoded::Null => 0,
            Encoded::Int(_) | Encoded::UInt(_) => 1,
            Encoded::Double(_) => 2,
            Encoded::Decimal(_) => 3,
            Encoded::Text(_) => 4,
            Encoded::Bytes(_) => 5,
        }
    }

    /// True for [`Encoded::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Encoded::Null)
    }
}

impl Ord for Encoded {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Encoded::Null, Encoded::Null) => Ordering::Equal,
            (Encoded::Int(a), Encoded::Int(b)) => a.cmp(b),
            (Encoded::UInt(a), Encoded::UInt(b)) => a.cmp(b),
            (Encoded::Int(a), Encoded::UInt(b)) => i128::from(*a).cmp(&i128::from(*b)),
            (Encoded::UInt(a), Encoded::Int(b)) => i128::from(*a).cmp(&i128::from(*b)),
            (Encoded::Double(a), Encoded::Double(b)) => a.total_cmp(b),
            (Encoded::Decimal(a), Encoded::Decimal(b)) => a.cmp(b),
            (Encoded::Text(a), Encoded::Text(b)) => a.cmp(b),
            (Encoded::Bytes(a), Encoded::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Encoded {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Encoded {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Encoded {}

/// Column layout a tuple is bound to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TupleLayout {
    /// Full table row, in table column order.
    Clustered,
    /// Secondary index entry: index columns followed by primary-key columns.
    Secondary,
}

/// Transient staging buffer for one row's worth of encoded values.
///
/// Created by a cursor, filled by the row codec or by a read, consumed by a
/// search or write, and disposed exactly once. Dropping a live tuple disposes
/// it; any use after [`Tuple::dispose`] fails with [`TrawlError::Misuse`].
#[derive(Debug)]
pub struct Tuple {
    layout: TupleLayout,
    columns: Vec<ColumnDef>,
    values: Vec<Encoded>,
    disposed: bool,
    ledger: Arc<ResourceLedger>,
}

impl Tuple {
    /// Allocates a tuple and registers it with `ledger`.
    pub fn new(
        layout: TupleLayout,
        columns: Vec<ColumnDef>,
        values: Vec<Encoded>,
        ledger: Arc<ResourceLedger>,
    ) -> Self {
        ledger.tuple_created();
        Self {
            layout,
            columns,
            values,
            disposed: false,
            ledger,
        }
    }

    /// Column set the tuple was created for.
    pub fn layout(&self) -> TupleLayout {
        self.layout
    }

    /// Columns this tuple is bound to.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Whether the tuple has been released. A disposed tuple rejects every
    /// operation with [`TrawlError::Misuse`].
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Encoded values currently staged.
    pub fn values(&self) -> Result<&[Encoded]> {
        self.ensure_live()?;
        Ok(&self.values)
    }

    /// Replaces the staged values; used by engines when filling a read tuple.
    pub fn set_values(&mut self, values: Vec<Encoded>) -> Result<()> {
        self.ensure_live()?;
        self.values = values;
        Ok(())
    }

    /// Empties the buffer so it can be reused for another row.
    pub fn clear(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.values.clear();
        Ok(())
    }

    /// Releases the tuple. A second call is a misuse error.
    pub fn dispose(&mut self) -> Result<()> {
        self.ensure_live()?;
        self.release();
        Ok(())
    }

    /// Reads a byte-array column.
    pub fn read_bytes(&self, ordinal: usize) -> Result<Value> {
        match self.slot(ordinal)? {
            Encoded::Null => Ok(Value::Null),
            Encoded::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
            _ => Err(TrawlError::Engine(EngineStatus::DataMismatch)),
        }
    }

    /// Reads a character column.
    pub fn read_string(&self, ordinal: usize) -> Result<Value> {
        match self.slot(ordinal)? {
            Encoded::Null => Ok(Value::Null),
            Encoded::Text(text) => Ok(Value::Text(text.clone())),
            _ => Err(TrawlError::Engine(EngineStatus::DataMismatch)),
        }
    }

    /// Reads an integer column of `length` bytes.
    pub fn read_int(&self, ordinal: usize, length: u32, signed: bool) -> Result<Value> {
        let bits = length.clamp(1, 8) * 8;
        match (self.slot(ordinal)?, signed) {
            (Encoded::Null, _) => Ok(Value::Null),
            (Encoded::Int(v), true) if matches!(*v >> (bits - 1), 0 | -1) => Ok(Value::Int(*v)),
            (Encoded::UInt(v), false) if bits == 64 || (*v >> bits) == 0 => Ok(Value::UInt(*v)),
            _ => Err(TrawlError::Engine(EngineStatus::DataMismatch)),
        }
    }

    fn slot(&self, ordinal: usize) -> Result<&Encoded> {
        self.ensure_live()?;
        self.values
            .get(ordinal)
            .ok_or(TrawlError::Engine(EngineStatus::DataMismatch))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(TrawlError::Misuse("tuple already disposed"));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.disposed = true;
        self.values = Vec::new();
        self.ledger.tuple_disposed();
    }
}

impl Drop for Tuple {
    fn drop(&mut self) {
        if !self.disposed {
            self.release();
        }
    }
}
