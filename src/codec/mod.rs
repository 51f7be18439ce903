#![forbid(unsafe_code)]

//! Conversion between host rows and the engine's encoded column values.
//!
//! [`coerce`] handles single values; [`row`] works on whole rows and key
//! prefixes in table or index column order.

pub mod coerce;
pub mod row;

pub use coerce::{coerce, decode_value, values_equal};
pub use row::{decode, encode, encode_prefix, encode_row};
