//! Traversal and single-row CRUD over a cursor-based clustered-index
//! storage engine.
//!
//! The engine contract lives in [`engine`]; [`engine::mem::MemDatabase`] is
//! an in-process implementation of it. On top of that contract:
//!
//! - [`crud`] loads, inserts, updates, upserts, and deletes single rows by
//!   primary key, verifying every approximate cursor positioning with
//!   [`key::matches`].
//! - [`traverse`] scans a clustered or secondary index from a key prefix with
//!   continuation and selection filters, mapping, folding, or mutating the
//!   rows it visits.
//! - [`template::Template`] scopes both in transactions and records
//!   [`metrics`].

#![warn(missing_docs)]

pub mod codec;
pub mod crud;
pub mod engine;
pub mod key;
pub mod metrics;
pub mod options;
pub mod schema;
pub mod template;
pub mod traverse;
pub mod types;
pub mod value;

pub use engine::mem::MemDatabase;
pub use engine::{Direction, SearchMode, TransactionLevel};
pub use options::TemplateOptions;
pub use schema::{ColumnAttr, ColumnType, TableDef};
pub use template::Template;
pub use traverse::{Mutation, Target, TraversalSpec};
pub use types::{Result, TrawlError};
pub use value::{Row, Value};
