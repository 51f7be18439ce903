//! Single-value conversion between host [`Value`]s and engine encodings.
//!
//! Integer columns are range-checked against their declared width and
//! signedness. Equality across representations is exact: a text `"7"`, an
//! `Int(7)` and a `Decimal(7.0)` all match an integer column holding 7.

use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::{FromPrimitive, One, ToPrimitive};
use rust_decimal::Decimal;

use crate::engine::{Encoded, Tuple};
use crate::schema::{ColumnDef, ColumnType};
use crate::types::{Result, TrawlError};
use crate::value::Value;

fn rejected(column: &ColumnDef, reason: impl Into<String>) -> TrawlError {
    TrawlError::Coercion {
        column: column.name().to_owned(),
        reason: reason.into(),
    }
}

/// Exact integer view of a value, if it has one.
///
/// Floats and decimals qualify only when integral; text is parsed.
fn to_bigint(value: &Value) -> Option<BigInt> {
    match value {
        Value::Int(v) => Some(BigInt::from(*v)),
        Value::UInt(v) => Some(BigInt::from(*v)),
        Value::BigInt(v) => Some(v.clone()),
        Value::Float(v) if v.is_finite() && v.fract() == 0.0 => BigInt::from_f64(*v),
        Value::Decimal(v) if v.fract().is_zero() => v.trunc().to_i128().map(BigInt::from),
        Value::Text(text) => {
            let text = text.trim();
            BigInt::from_str(text).ok().or_else(|| {
                let dec = Decimal::from_str(text).ok()?;
                to_bigint(&Value::Decimal(dec))
            })
        }
        _ => None,
    }
}

/// Decimal view of a value. Floats go through their shortest round-trip
/// rendering, so `0.1f64` becomes exactly `0.1`.
fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Int(v) => Some(Decimal::from(*v)),
        Value::UInt(v) => Some(Decimal::from(*v)),
        Value::BigInt(v) => Decimal::from_str(&v.to_string()).ok(),
        Value::Float(v) if v.is_finite() => parse_decimal(&v.to_string()),
        Value::Decimal(v) => Some(*v),
        Value::Text(text) => parse_decimal(text.trim()),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(v) => v.to_f64(),
        Value::UInt(v) => v.to_f64(),
        Value::BigInt(v) => v.to_f64(),
        Value::Float(v) => Some(*v),
        Value::Decimal(v) => v.to_f64(),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Text(text) => Some(text.clone()),
        Value::Bytes(bytes) => String::from_utf8(bytes.clone()).ok(),
        other => Some(other.to_string()),
    }
}

fn to_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Some(bytes.clone()),
        Value::Text(text) => Some(text.as_bytes().to_vec()),
        _ => None,
    }
}

fn coerce_integer(value: &Value, column: &ColumnDef) -> Result<Encoded> {
    let int = to_bigint(value)
        .ok_or_else(|| rejected(column, format!("'{value}' is not an integer")))?;
    let bits = column.length().clamp(1, 8) as usize * 8;
    let out_of_range = || {
        rejected(
            column,
            format!("{int} out of range for {bits}-bit {} column", signedness(column)),
        )
    };
    if column.is_unsigned() {
        let max = (BigInt::one() << bits) - BigInt::one();
        if int.sign() == num_bigint::Sign::Minus || int > max {
            return Err(out_of_range());
        }
        int.to_u64().map(Encoded::UInt).ok_or_else(out_of_range)
    } else {
        let half = BigInt::one() << (bits - 1);
        if int < -half.clone() || int >= half {
            return Err(out_of_range());
        }
        int.to_i64().map(Encoded::Int).ok_or_else(out_of_range)
    }
}

fn signedness(column: &ColumnDef) -> &'static str {
    if column.is_unsigned() {
        "unsigned"
    } else {
        "signed"
    }
}

/// Converts `value` into the physical encoding of `column`.
///
/// NULL always passes through; NOT NULL is the engine's to enforce on write.
pub fn coerce(value: &Value, column: &ColumnDef) -> Result<Encoded> {
    if value.is_null() {
        return Ok(Encoded::Null);
    }
    let ty = column.ty();
    if ty.is_integer_type() {
        return coerce_integer(value, column);
    }
    if ty.is_string_type() {
        let text = to_text(value).ok_or_else(|| rejected(column, "value is not valid UTF-8"))?;
        let limit = column.length() as usize;
        if limit > 0 && text.chars().count() > limit {
            return Err(rejected(
                column,
                format!("{} characters exceed declared length {limit}", text.chars().count()),
            ));
        }
        return Ok(Encoded::Text(text));
    }
    if ty.is_byte_array_type() {
        let bytes = to_bytes(value)
            .ok_or_else(|| rejected(column, format!("'{value}' is not a byte sequence")))?;
        let limit = column.length() as usize;
        if ty != ColumnType::Blob && limit > 0 && bytes.len() > limit {
            return Err(rejected(
                column,
                format!("{} bytes exceed declared length {limit}", bytes.len()),
            ));
        }
        return Ok(Encoded::Bytes(bytes));
    }
    match ty {
        ColumnType::Float => to_f64(value)
            .map(|v| Encoded::Double(f64::from(v as f32)))
            .ok_or_else(|| rejected(column, format!("'{value}' is not numeric"))),
        ColumnType::Double => to_f64(value)
            .map(Encoded::Double)
            .ok_or_else(|| rejected(column, format!("'{value}' is not numeric"))),
        ColumnType::Decimal => to_decimal(value)
            .map(Encoded::Decimal)
            .ok_or_else(|| rejected(column, format!("'{value}' is not a decimal"))),
        other => Err(TrawlError::UnsupportedType(other)),
    }
}

/// Type-aware equality of two host values stored in a column of type `ty`.
///
/// NULL equals only NULL. Values that cannot be viewed in the column's type
/// family compare unequal.
pub fn values_equal(a: &Value, b: &Value, ty: ColumnType) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    fn same<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
        matches!((a, b), (Some(a), Some(b)) if a == b)
    }
    if ty.is_integer_type() {
        same(to_bigint(a), to_bigint(b))
    } else if ty.is_decimal_family() {
        same(to_decimal(a), to_decimal(b))
    } else if ty.is_string_type() {
        same(to_text(a), to_text(b))
    } else if ty.is_byte_array_type() {
        same(to_bytes(a), to_bytes(b))
    } else {
        a == b
    }
}

/// Reads one column of `tuple` through the engine accessor for its type family.
///
/// Only byte-array, string, and integer columns can be read back.
pub fn decode_value(tuple: &Tuple, column: &ColumnDef) -> Result<Value> {
    let ordinal = column.index();
    let ty = column.ty();
    if ty.is_byte_array_type() {
        tuple.read_bytes(ordinal)
    } else if ty.is_string_type() {
        tuple.read_string(ordinal)
    } else if ty.is_integer_type() {
        tuple.read_int(ordinal, column.length(), !column.is_unsigned())
    } else {
        Err(TrawlError::UnsupportedType(ty))
    }
}
