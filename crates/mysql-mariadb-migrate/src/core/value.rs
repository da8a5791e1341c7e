//! Bind values handed from the type dispatcher to the target writer.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// SQL type of an explicit NULL bind.
///
/// Each mapped source type binds its NULLs with the target type it would have
/// bound a value with, so a NULL never degrades into a zero or empty sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Double,
    Real,
    Varchar,
    Date,
    Time,
    Timestamp,
    Blob,
    Clob,
}

/// A value bound into the target insert statement.
///
/// Uses `Cow` for string and byte data so callers can bind borrowed buffers.
/// Rows held by a batch are always `'static`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// NULL with the SQL type it is bound as.
    Null(SqlNullType),

    /// 64-bit signed integer.
    I64(i64),

    /// Arbitrary precision decimal.
    Decimal(Decimal),

    /// Double precision float.
    F64(f64),

    /// Single precision float.
    F32(f32),

    /// Character data.
    Text(Cow<'a, str>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Raw bytes (BLOB family, JSON).
    Bytes(Cow<'a, [u8]>),

    /// Character large object (XML).
    Clob(Cow<'a, str>),
}

/// One coerced source row, in column order.
pub type BoundRow = Vec<SqlValue<'static>>;
