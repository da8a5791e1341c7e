//! MySQL source and MariaDB target driver.
//!
//! This module provides:
//! - [`MysqlReader`]: pages through a source select
//! - [`MariaDbWriter`]: executes scripts and batched inserts in explicit transactions
//! - [`MysqlConnectionProvider`]: opens one dedicated reader/writer pair per table job
//!
//! Both sides speak the MySQL wire protocol through `mysql_async`.
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+ (source)
//! - MariaDB 10.2+ (target)

mod reader;
mod writer;

pub use reader::{declared_type, MysqlReader};
pub use writer::MariaDbWriter;

use async_trait::async_trait;
use mysql_async::{Opts, OptsBuilder, SslOpts};
use tracing::warn;

use crate::config::{SourceConfig, TargetConfig};
use crate::core::{ConnectionProvider, SourceReader, TargetWriter};
use crate::error::{MigrateError, Result};

/// TLS modes accepted in `ssl_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Plain TCP.
    Disable,
    /// TLS without certificate verification.
    #[default]
    Prefer,
    /// TLS without certificate verification.
    Require,
    /// Verify the server certificate.
    VerifyCa,
    /// Verify the server certificate and hostname.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode, falling back to `Prefer` for unknown values.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "disable" => SslMode::Disable,
            "prefer" | "" => SslMode::Prefer,
            "require" => SslMode::Require,
            "verify-ca" | "verify_ca" => SslMode::VerifyCa,
            "verify-full" | "verify_identity" => SslMode::VerifyFull,
            other => {
                warn!("Unknown ssl_mode '{}', defaulting to prefer", other);
                SslMode::Prefer
            }
        }
    }

    fn ssl_opts(self) -> Option<SslOpts> {
        match self {
            SslMode::Disable => None,
            SslMode::Prefer | SslMode::Require => {
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
            SslMode::VerifyCa => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
            SslMode::VerifyFull => Some(SslOpts::default()),
        }
    }
}

/// Connection settings shared by both ends.
struct Endpoint<'a> {
    role: &'a str,
    host: &'a str,
    port: u16,
    database: &'a str,
    user: &'a str,
    password: &'a str,
    ssl_mode: &'a str,
}

impl Endpoint<'_> {
    fn opts(&self, init: Vec<&str>) -> Opts {
        let ssl_mode = SslMode::parse(self.ssl_mode);
        if ssl_mode == SslMode::Disable {
            warn!(
                "{} TLS is disabled. Credentials will be transmitted in plaintext.",
                self.role
            );
        }

        OptsBuilder::default()
            .ip_or_hostname(self.host)
            .tcp_port(self.port)
            .db_name(Some(self.database))
            .user(Some(self.user))
            .pass(Some(self.password))
            .init(init)
            .ssl_opts(ssl_mode.ssl_opts())
            .into()
    }

    fn url(&self, scheme: &str) -> String {
        format!("{}://{}:{}/{}", scheme, self.host, self.port, self.database)
    }
}

/// Opens MySQL readers and MariaDB writers from the configured endpoints.
///
/// Every call opens a fresh connection; the table job that asked for it owns
/// it until [`SourceReader::close`] / [`TargetWriter::close`].
pub struct MysqlConnectionProvider {
    source: SourceConfig,
    target: TargetConfig,
}

impl MysqlConnectionProvider {
    pub fn new(source: SourceConfig, target: TargetConfig) -> Self {
        Self { source, target }
    }

    fn source_endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            role: "MySQL source",
            host: &self.source.host,
            port: self.source.port,
            database: &self.source.database,
            user: &self.source.user,
            password: &self.source.password,
            ssl_mode: &self.source.ssl_mode,
        }
    }

    fn target_endpoint(&self) -> Endpoint<'_> {
        Endpoint {
            role: "MariaDB target",
            host: &self.target.host,
            port: self.target.port,
            database: &self.target.database,
            user: &self.target.user,
            password: &self.target.password,
            ssl_mode: &self.target.ssl_mode,
        }
    }
}

#[async_trait]
impl ConnectionProvider for MysqlConnectionProvider {
    async fn open_source(&self) -> Result<Box<dyn SourceReader>> {
        let opts = self.source_endpoint().opts(vec!["SET NAMES utf8mb4"]);
        let reader = MysqlReader::connect(opts)
            .await
            .map_err(|e| MigrateError::pool(e, "opening MySQL source connection"))?;
        Ok(Box::new(reader))
    }

    async fn open_target(&self) -> Result<Box<dyn TargetWriter>> {
        // Every batch is committed explicitly
        let opts = self
            .target_endpoint()
            .opts(vec!["SET NAMES utf8mb4", "SET autocommit = 0"]);
        let writer = MariaDbWriter::connect(opts)
            .await
            .map_err(|e| MigrateError::pool(e, "opening MariaDB target connection"))?;
        Ok(Box::new(writer))
    }

    fn describe(&self) -> String {
        format!(
            "{} -> {}",
            self.source_endpoint().url("mysql"),
            self.target_endpoint().url("mariadb")
        )
    }
}
