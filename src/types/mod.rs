#![forbid(unsafe_code)]

//! Error taxonomy shared by every layer of the crate.

use std::fmt;

use crate::schema::ColumnType;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Non-success status reported by a storage engine call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EngineStatus {
    /// A primary or unique secondary key already exists.
    DuplicateKey,
    /// The cursor position no longer refers to a row.
    RecordNotFound,
    /// The cursor moved past either end of the index.
    EndOfIndex,
    /// The named table is not known to the engine.
    TableNotFound,
    /// A table with the same name already exists.
    TableExists,
    /// The named index is not known to the engine.
    IndexNotFound,
    /// The row payload does not match the table layout.
    DataMismatch,
    /// A lock wait exceeded the transaction's timeout.
    LockWaitTimeout,
    /// The transaction was chosen as a deadlock victim.
    Deadlock,
    /// The cursor was already closed.
    CursorClosed,
    /// The transaction was already committed or rolled back.
    TransactionClosed,
}

impl EngineStatus {
    /// Stable numeric status code.
    pub const fn code(self) -> u32 {
        match self {
            EngineStatus::DuplicateKey => 18,
            EngineStatus::RecordNotFound => 1500,
            EngineStatus::EndOfIndex => 1501,
            EngineStatus::TableNotFound => 31,
            EngineStatus::TableExists => 42,
            EngineStatus::IndexNotFound => 43,
            EngineStatus::DataMismatch => 2000,
            EngineStatus::LockWaitTimeout => 35,
            EngineStatus::Deadlock => 16,
            EngineStatus::CursorClosed => 2001,
            EngineStatus::TransactionClosed => 2002,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            EngineStatus::DuplicateKey => "duplicate key",
            EngineStatus::RecordNotFound => "record not found",
            EngineStatus::EndOfIndex => "end of index",
            EngineStatus::TableNotFound => "table not found",
            EngineStatus::TableExists => "table exists",
            EngineStatus::IndexNotFound => "index not found",
            EngineStatus::DataMismatch => "data mismatch",
            EngineStatus::LockWaitTimeout => "lock wait timeout",
            EngineStatus::Deadlock => "deadlock",
            EngineStatus::CursorClosed => "cursor closed",
            EngineStatus::TransactionClosed => "transaction closed",
        }
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.name(), self.code())
    }
}

/// Errors surfaced by the codec, CRUD, and traversal layers.
#[derive(thiserror::Error, Debug)]
pub enum TrawlError {
    /// The storage engine reported a non-success status.
    #[error("engine: {0}")]
    Engine(EngineStatus),
    /// A tuple or cursor was used after release.
    #[error("resource misuse: {0}")]
    Misuse(&'static str),
    /// The column type falls outside the supported families.
    #[error("unsupported column type: {0:?}")]
    UnsupportedType(ColumnType),
    /// A host value could not be coerced into the column's physical type.
    #[error("cannot coerce value for column '{column}': {reason}")]
    Coercion {
        /// Column being written.
        column: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// The traversal target names an index the table does not define.
    #[error("table '{table}' has no secondary index '{index}'")]
    UnknownIndex {
        /// Table name.
        table: String,
        /// Requested index name.
        index: String,
    },
    /// Malformed definitions or arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl TrawlError {
    /// Returns the engine status carried by this error, if any.
    pub fn status(&self) -> Option<EngineStatus> {
        match self {
            TrawlError::Engine(status) => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a unique-key constraint violation.
    pub fn is_duplicate_key(&self) -> bool {
        self.status() == Some(EngineStatus::DuplicateKey)
    }
}

impl From<EngineStatus> for TrawlError {
    fn from(status: EngineStatus) -> Self {
        TrawlError::Engine(status)
    }
}
