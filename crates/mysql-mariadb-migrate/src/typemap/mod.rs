//! Source type name to target bind mapping.
//!
//! Every column of a source select is resolved once, when the job starts, to
//! a [`ColumnTypeMapping`]. A declared type that is not in the table below is
//! a fatal error for the job.

use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mysql_async::{from_value_opt, FromValueError};
use rust_decimal::Decimal;

use crate::core::{BoundRow, ColumnMeta, RawRow, RawValue, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};

/// How a non-null value is bound into the target insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindKind {
    /// 64-bit signed integer.
    Integer,
    /// Arbitrary precision decimal.
    Decimal,
    Double,
    /// Single precision float.
    Float,
    Text,
    Date,
    Time,
    Timestamp,
    /// Raw bytes.
    LargeBinary,
    /// Character large object.
    Xml,
}

/// Target bind kind and NULL type for one source type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnTypeMapping {
    pub kind: BindKind,
    pub null_type: SqlNullType,
}

impl ColumnTypeMapping {
    const fn new(kind: BindKind, null_type: SqlNullType) -> Self {
        Self { kind, null_type }
    }
}

/// Look up a declared source type name (case-insensitive).
pub fn lookup(type_name: &str) -> Option<ColumnTypeMapping> {
    use BindKind as K;
    use SqlNullType as N;

    let mapping = match type_name.trim().to_uppercase().as_str() {
        // Integers that fit in 64 bits
        "BOOL" | "BOOLEAN" | "BIT" | "TINYINT" | "TINYINT UNSIGNED" => {
            ColumnTypeMapping::new(K::Integer, N::TinyInt)
        }
        "SMALLINT" | "SMALLINT UNSIGNED" => ColumnTypeMapping::new(K::Integer, N::SmallInt),
        "INTEGER" | "INTEGER UNSIGNED" => ColumnTypeMapping::new(K::Integer, N::Integer),

        // BIGINT UNSIGNED overflows i64
        "BIGINT" | "BIGINT UNSIGNED" => ColumnTypeMapping::new(K::Decimal, N::BigInt),
        "DECIMAL" => ColumnTypeMapping::new(K::Decimal, N::Decimal),

        // Floating point
        "DOUBLE" => ColumnTypeMapping::new(K::Double, N::Double),
        "REAL" | "FLOAT" => ColumnTypeMapping::new(K::Float, N::Real),

        // Character data
        "CHAR" | "VARCHAR" | "TINYCLOB" | "CLOB" | "MEDIUMCLOB" | "LONGCLOB" => {
            ColumnTypeMapping::new(K::Text, N::Varchar)
        }

        // Date/time
        "DATE" => ColumnTypeMapping::new(K::Date, N::Date),
        "TIME" => ColumnTypeMapping::new(K::Time, N::Time),
        "DATETIME" | "TIMESTAMP" => ColumnTypeMapping::new(K::Timestamp, N::Timestamp),

        // Binary, JSON travels as its raw bytes
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "JSON" => {
            ColumnTypeMapping::new(K::LargeBinary, N::Blob)
        }

        "SQLXML" => ColumnTypeMapping::new(K::Xml, N::Clob),

        _ => return None,
    };
    Some(mapping)
}

#[derive(Debug, Clone)]
struct ResolvedColumn {
    name: String,
    type_name: String,
    mapping: ColumnTypeMapping,
}

/// Per-job binder turning raw source rows into typed target rows.
#[derive(Debug, Clone)]
pub struct TypeCoercionDispatcher {
    table: String,
    columns: Vec<ResolvedColumn>,
}

impl TypeCoercionDispatcher {
    /// Resolve every column up front. Fails on the first unknown type.
    pub fn for_columns(table: impl Into<String>, columns: &[ColumnMeta]) -> Result<Self> {
        let table = table.into();
        let columns = columns
            .iter()
            .map(|col| {
                let mapping = lookup(&col.type_name).ok_or_else(|| MigrateError::TypeMapping {
                    table: table.clone(),
                    column: col.name.clone(),
                    type_name: col.type_name.clone(),
                })?;
                Ok(ResolvedColumn {
                    name: col.name.clone(),
                    type_name: col.type_name.clone(),
                    mapping,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { table, columns })
    }

    /// Bind every value of a source row, in column order.
    pub fn bind_row(&self, row: RawRow) -> Result<BoundRow> {
        if row.len() != self.columns.len() {
            return Err(MigrateError::transfer(
                &self.table,
                format!(
                    "source row has {} values, expected {}",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }

        row.into_iter()
            .zip(&self.columns)
            .map(|(raw, col)| {
                coerce(&col.type_name, col.mapping, raw).map_err(|message| {
                    MigrateError::Coercion {
                        table: self.table.clone(),
                        column: col.name.clone(),
                        message,
                    }
                })
            })
            .collect()
    }
}

/// Bind a single raw value. Pure: same inputs, same output.
pub fn bind_value(
    table: &str,
    column: &str,
    type_name: &str,
    raw: RawValue,
) -> Result<SqlValue<'static>> {
    let mapping = lookup(type_name).ok_or_else(|| MigrateError::TypeMapping {
        table: table.to_string(),
        column: column.to_string(),
        type_name: type_name.to_string(),
    })?;
    coerce(type_name, mapping, raw).map_err(|message| MigrateError::Coercion {
        table: table.to_string(),
        column: column.to_string(),
        message,
    })
}

fn coerce(
    type_name: &str,
    mapping: ColumnTypeMapping,
    raw: RawValue,
) -> std::result::Result<SqlValue<'static>, String> {
    if raw == RawValue::NULL {
        return Ok(SqlValue::Null(mapping.null_type));
    }

    let value = match mapping.kind {
        BindKind::Integer => {
            // BIT columns arrive as big-endian bit strings
            if let RawValue::Bytes(bytes) = &raw {
                if type_name.eq_ignore_ascii_case("BIT") {
                    return bit_value(bytes).map(SqlValue::I64);
                }
            }
            SqlValue::I64(from_value_opt::<i64>(raw).map_err(describe)?)
        }
        BindKind::Decimal => SqlValue::Decimal(from_value_opt::<Decimal>(raw).map_err(describe)?),
        BindKind::Double => SqlValue::F64(from_value_opt::<f64>(raw).map_err(describe)?),
        BindKind::Float => SqlValue::F32(from_value_opt::<f64>(raw).map_err(describe)? as f32),
        BindKind::Text => SqlValue::Text(Cow::Owned(from_value_opt::<String>(raw).map_err(describe)?)),
        BindKind::Xml => SqlValue::Clob(Cow::Owned(from_value_opt::<String>(raw).map_err(describe)?)),
        // Zero dates and out-of-range TIME values have no chrono form, bind them as text
        BindKind::Date => match from_value_opt::<NaiveDate>(raw) {
            Ok(d) => SqlValue::Date(d),
            Err(FromValueError(v)) => SqlValue::Text(Cow::Owned(raw_text(&v))),
        },
        BindKind::Time => match from_value_opt::<NaiveTime>(raw) {
            Ok(t) => SqlValue::Time(t),
            Err(FromValueError(v)) => SqlValue::Text(Cow::Owned(raw_text(&v))),
        },
        BindKind::Timestamp => match from_value_opt::<NaiveDateTime>(raw) {
            Ok(dt) => SqlValue::DateTime(dt),
            Err(FromValueError(v)) => SqlValue::Text(Cow::Owned(raw_text(&v))),
        },
        BindKind::LargeBinary => match raw {
            RawValue::Bytes(bytes) => SqlValue::Bytes(Cow::Owned(bytes)),
            other => SqlValue::Bytes(Cow::Owned(raw_text(&other).into_bytes())),
        },
    };
    Ok(value)
}

fn describe(err: FromValueError) -> String {
    format!("cannot convert value {}", raw_text(&err.0))
}

fn bit_value(bytes: &[u8]) -> std::result::Result<i64, String> {
    if bytes.len() > 8 {
        return Err(format!("BIT value of {} bytes does not fit 64 bits", bytes.len()));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)) as i64)
}

/// Textual form of a raw value, as the server would print it.
fn raw_text(value: &RawValue) -> String {
    match value {
        RawValue::NULL => "NULL".to_string(),
        RawValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        RawValue::Int(i) => i.to_string(),
        RawValue::UInt(u) => u.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Double(d) => d.to_string(),
        RawValue::Date(y, m, d, 0, 0, 0, 0) => format!("{:04}-{:02}-{:02}", y, m, d),
        RawValue::Date(y, m, d, h, mi, s, 0) => {
            format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, mi, s)
        }
        RawValue::Date(y, m, d, h, mi, s, us) => format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            y, m, d, h, mi, s, us
        ),
        RawValue::Time(neg, days, h, mi, s, us) => {
            let hours = u64::from(*days) * 24 + u64::from(*h);
            let sign = if *neg { "-" } else { "" };
            if *us == 0 {
                format!("{}{:02}:{:02}:{:02}", sign, hours, mi, s)
            } else {
                format!("{}{:02}:{:02}:{:02}.{:06}", sign, hours, mi, s, us)
            }
        }
    }
}
