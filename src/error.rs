//! Error types for statement pipelines.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every failure raised inside a pipeline is wrapped with the 0-based index of the
//! statement that produced it, so callers can tell which step of a batch broke.

use crate::cache::CacheError;
use thiserror::Error;

/// Coarse classification of a [`DbError`], independent of pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Preparation,
    Binding,
    NotFound,
    Execution,
    Begin,
    Commit,
    Rollback,
    Connection,
    Config,
    Timeout,
    Cancelled,
    Cache,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Preparation failed: {message}")]
    Preparation {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Binding failed: {message}")]
    Binding { message: String },

    #[error("No rows returned")]
    NotFound,

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Begin transaction failed: {message}")]
    Begin { message: String },

    #[error("Commit failed: {message}")]
    Commit { message: String },

    #[error("Rollback failed: {message} (rolled back after: {original})")]
    Rollback {
        message: String,
        /// The pipeline failure that triggered the rollback.
        original: Box<DbError>,
    },

    #[error("statement {index}: {source}")]
    Statement {
        index: usize,
        #[source]
        source: Box<DbError>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Timeout: {operation} exceeded the deadline")]
    Timeout { operation: String },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Attach the position of the failing statement.
    pub fn statement(index: usize, source: DbError) -> Self {
        Self::Statement {
            index,
            source: Box::new(source),
        }
    }

    /// Classify a failure raised while preparing a query.
    ///
    /// Server-side rejections (syntax errors, unknown relations) become
    /// [`ErrorKind::Preparation`]; transport failures keep their usual mapping.
    pub fn preparation(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => Self::Preparation {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
            },
            other => Self::from(other),
        }
    }

    /// Classify a failure raised while decoding rows into a destination.
    pub fn binding(err: sqlx::Error) -> Self {
        Self::Binding {
            message: err.to_string(),
        }
    }

    pub fn begin(err: sqlx::Error) -> Self {
        Self::Begin {
            message: err.to_string(),
        }
    }

    pub fn commit(err: sqlx::Error) -> Self {
        Self::Commit {
            message: err.to_string(),
        }
    }

    /// Build the composite error returned when rolling back after `original` failed.
    pub fn rollback(err: sqlx::Error, original: DbError) -> Self {
        Self::Rollback {
            message: err.to_string(),
            original: Box::new(original),
        }
    }

    /// The kind of the underlying failure, looking through statement positions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Preparation { .. } => ErrorKind::Preparation,
            Self::Binding { .. } => ErrorKind::Binding,
            Self::NotFound => ErrorKind::NotFound,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Begin { .. } => ErrorKind::Begin,
            Self::Commit { .. } => ErrorKind::Commit,
            Self::Rollback { .. } => ErrorKind::Rollback,
            Self::Statement { source, .. } => source.kind(),
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Config { .. } => ErrorKind::Config,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Cache(_) => ErrorKind::Cache,
        }
    }

    /// Index of the failing statement, if the error was raised inside a pipeline.
    ///
    /// For a rollback failure this is the index carried by the original error.
    pub fn statement_index(&self) -> Option<usize> {
        match self {
            Self::Statement { index, .. } => Some(*index),
            Self::Rollback { original, .. } => original.statement_index(),
            _ => None,
        }
    }

    /// The pipeline failure hidden behind a rollback failure.
    pub fn original(&self) -> Option<&DbError> {
        match self {
            Self::Rollback { original, .. } => Some(original),
            _ => None,
        }
    }

    /// True when a single-row query matched zero rows.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True when a cache lookup missed.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, Self::Cache(CacheError::KeyNotFound { .. }))
    }

    /// SQLSTATE reported by the server, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Preparation { sql_state, .. } | Self::Execution { sql_state, .. } => {
                sql_state.as_deref()
            }
            Self::Statement { source, .. } => source.sql_state(),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::config(msg.to_string()),
            sqlx::Error::Database(db_err) => DbError::Execution {
                message: db_err.message().to_string(),
                sql_state: db_err.code().map(|c| c.to_string()),
            },
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::PoolTimedOut => DbError::timeout("connection pool acquire"),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reopen the database handle")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify the sslMode setting and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            err @ (sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::Encode(_)) => DbError::binding(err),
            other => DbError::Execution {
                message: other.to_string(),
                sql_state: None,
            },
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
