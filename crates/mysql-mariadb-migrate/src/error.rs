//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target driver error
    #[error("Database error: {0}")]
    Database(#[from] mysql_async::Error),

    /// Connection error with context
    #[error("Connection error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Target table could not be prepared (create script failed)
    #[error("Setup failed for table {table}: {message}")]
    Setup { table: String, message: String },

    /// Source column declares a type the dispatcher does not know
    #[error("Unknown Data Type: {table}({column}({type_name}))")]
    TypeMapping {
        table: String,
        column: String,
        type_name: String,
    },

    /// Source value could not be converted to its declared bind kind
    #[error("Cannot convert {table}.{column}: {message}")]
    Coercion {
        table: String,
        column: String,
        message: String,
    },

    /// Batch execution or commit failed on the target
    #[error("Batch failed for table {table}: {message}")]
    Batch { table: String, message: String },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Progress state error
    #[error("State file error: {0}")]
    State(String),

    /// Progress state belongs to a different source/target pair
    #[error("State file was written for different databases - cannot resume. Remove it to start fresh.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Setup error
    pub fn setup(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Setup {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Batch error
    pub fn batch(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Batch {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Pool { .. } | MigrateError::Database(_) => 3,
            MigrateError::State(_) | MigrateError::ConfigChanged | MigrateError::Json(_) => 4,
            MigrateError::Io(_) => 5,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
