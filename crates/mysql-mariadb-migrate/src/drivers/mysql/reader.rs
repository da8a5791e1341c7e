//! MySQL source reader implementation.
//!
//! Implements the `SourceReader` trait over one dedicated connection. Result
//! columns are described by the wire protocol column definitions, which are
//! turned into the declared type names the coercion dispatcher resolves.

use async_trait::async_trait;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Row};
use tracing::{debug, info, warn};

use crate::core::{ColumnMeta, RawRow, SourceReader};
use crate::error::{MigrateError, Result};

/// Character set id of binary strings.
const BINARY_CHARSET: u16 = 63;

/// MySQL source reader implementation.
pub struct MysqlReader {
    conn: Option<Conn>,
}

impl MysqlReader {
    /// Connect and verify the connection.
    pub async fn connect(opts: Opts) -> Result<Self> {
        let mut conn = Conn::new(opts).await?;
        conn.query_drop("SELECT 1").await?;
        info!(
            "Connected to MySQL source (server {}.{}.{})",
            conn.server_version().0,
            conn.server_version().1,
            conn.server_version().2
        );
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| MigrateError::pool("connection already closed", "MySQL source"))
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn describe(&mut self, query: &str) -> Result<Vec<ColumnMeta>> {
        let sql = format!("SELECT * FROM ({}) AS described LIMIT 0", query);
        let conn = self.conn()?;
        let mut result = conn.query_iter(sql).await?;
        let columns: Vec<ColumnMeta> = result
            .columns()
            .map(|cols| {
                cols.iter()
                    .map(|c| {
                        ColumnMeta::new(
                            c.name_str(),
                            declared_type(
                                c.column_type(),
                                c.flags(),
                                c.character_set(),
                                c.column_length(),
                            ),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        result.drop_result().await?;

        debug!("Described {} columns", columns.len());
        Ok(columns)
    }

    async fn count_rows(&mut self, query: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM ({}) AS counted", query);
        let count: Option<u64> = self.conn()?.query_first(sql).await?;
        Ok(count.unwrap_or(0))
    }

    async fn fetch_rows(&mut self, query: &str, offset: u64, limit: u64) -> Result<Vec<RawRow>> {
        let sql = format!("{} LIMIT {} OFFSET {}", query, limit, offset);
        let rows: Vec<Row> = self.conn()?.query(sql).await?;
        Ok(rows.into_iter().map(Row::unwrap).collect())
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.disconnect().await {
                warn!("Failed to close MySQL source connection: {}", e);
            }
        }
    }
}

/// Declared type name of a result column, as resolved by the coercion dispatcher.
pub fn declared_type(
    column_type: ColumnType,
    flags: ColumnFlags,
    charset: u16,
    length: u32,
) -> String {
    let unsigned = |name: &str| {
        if flags.contains(ColumnFlags::UNSIGNED_FLAG) {
            format!("{} UNSIGNED", name)
        } else {
            name.to_string()
        }
    };
    let binary = charset == BINARY_CHARSET;

    match column_type {
        ColumnType::MYSQL_TYPE_BIT => "BIT".to_string(),
        ColumnType::MYSQL_TYPE_TINY => unsigned("TINYINT"),
        ColumnType::MYSQL_TYPE_SHORT => unsigned("SMALLINT"),
        ColumnType::MYSQL_TYPE_YEAR => "SMALLINT".to_string(),
        ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => unsigned("INTEGER"),
        ColumnType::MYSQL_TYPE_LONGLONG => unsigned("BIGINT"),
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            "DECIMAL".to_string()
        }
        ColumnType::MYSQL_TYPE_DOUBLE => "DOUBLE".to_string(),
        ColumnType::MYSQL_TYPE_FLOAT => "REAL".to_string(),
        ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => "DATE".to_string(),
        ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => "TIME".to_string(),
        ColumnType::MYSQL_TYPE_DATETIME | ColumnType::MYSQL_TYPE_DATETIME2 => {
            "DATETIME".to_string()
        }
        ColumnType::MYSQL_TYPE_TIMESTAMP | ColumnType::MYSQL_TYPE_TIMESTAMP2 => {
            "TIMESTAMP".to_string()
        }
        ColumnType::MYSQL_TYPE_JSON => "JSON".to_string(),
        ColumnType::MYSQL_TYPE_STRING if binary => "TINYBLOB".to_string(),
        ColumnType::MYSQL_TYPE_STRING => "CHAR".to_string(),
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING if binary => {
            "BLOB".to_string()
        }
        ColumnType::MYSQL_TYPE_VARCHAR | ColumnType::MYSQL_TYPE_VAR_STRING => {
            "VARCHAR".to_string()
        }
        ColumnType::MYSQL_TYPE_ENUM | ColumnType::MYSQL_TYPE_SET => "VARCHAR".to_string(),
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB => {
            // Blob and text columns share wire types; the length tells the family member
            let size = match length {
                0..=255 => "TINY",
                256..=65_535 => "",
                65_536..=16_777_215 => "MEDIUM",
                _ => "LONG",
            };
            let family = if binary { "BLOB" } else { "CLOB" };
            format!("{}{}", size, family)
        }
        ColumnType::MYSQL_TYPE_GEOMETRY => "GEOMETRY".to_string(),
        ColumnType::MYSQL_TYPE_NULL => "NULL".to_string(),
        other => format!("{:?}", other)
            .trim_start_matches("MYSQL_TYPE_")
            .to_string(),
    }
}
