//! MariaDB target writer implementation.
//!
//! The connection runs with autocommit off; each batch is bound as one
//! prepared statement execution per row and made durable by [`TargetWriter::commit`].

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Params, Value};
use tracing::{debug, info, warn};

use crate::core::{BoundRow, SqlValue, TargetWriter};
use crate::error::{MigrateError, Result};

/// MariaDB target writer implementation.
pub struct MariaDbWriter {
    conn: Option<Conn>,
}

impl MariaDbWriter {
    /// Connect and verify the connection.
    pub async fn connect(opts: Opts) -> Result<Self> {
        let mut conn = Conn::new(opts).await?;
        conn.query_drop("SELECT 1").await?;
        info!(
            "Connected to MariaDB target (server {}.{}.{})",
            conn.server_version().0,
            conn.server_version().1,
            conn.server_version().2
        );
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::pool("connection already closed", "MariaDB target"))
    }
}

#[async_trait]
impl TargetWriter for MariaDbWriter {
    async fn execute_script(&mut self, sql: &str) -> Result<()> {
        self.conn()?.query_drop(sql).await?;
        Ok(())
    }

    async fn truncate_table(&mut self, full_name: &str) -> Result<()> {
        self.conn()?
            .query_drop(format!("TRUNCATE TABLE {}", full_name))
            .await?;
        Ok(())
    }

    async fn write_batch(&mut self, insert_sql: &str, rows: &[BoundRow]) -> Result<()> {
        let params = rows
            .iter()
            .map(|row| Params::Positional(row.iter().map(sql_value_to_mysql).collect()));
        self.conn()?.exec_batch(insert_sql, params).await?;
        debug!("MariaDB: wrote {} rows", rows.len());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn()?.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn()?.query_drop("ROLLBACK").await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.disconnect().await {
                warn!("Failed to close MariaDB target connection: {}", e);
            }
        }
    }
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue<'_>) -> Value {
    match value {
        SqlValue::Null(_) => Value::NULL,
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::Text(s) | SqlValue::Clob(s) => Value::from(s.as_ref()),
        SqlValue::Date(d) => Value::from(*d),
        SqlValue::Time(t) => Value::from(*t),
        SqlValue::DateTime(dt) => Value::from(*dt),
        SqlValue::Bytes(b) => Value::from(b.as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlNullType;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_sql_value_to_mysql() {
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Null(SqlNullType::Integer)),
            Value::NULL
        );
        assert_eq!(sql_value_to_mysql(&SqlValue::I64(-7)), Value::Int(-7));
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Decimal(Decimal::from_str("12.50").unwrap())),
            Value::Bytes(b"12.50".to_vec())
        );
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Text("héllo".into())),
            Value::Bytes("héllo".as_bytes().to_vec())
        );
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())),
            Value::Date(2024, 2, 29, 0, 0, 0, 0)
        );
        assert_eq!(
            sql_value_to_mysql(&SqlValue::Bytes(vec![0u8, 1, 2].into())),
            Value::Bytes(vec![0, 1, 2])
        );
    }
}
