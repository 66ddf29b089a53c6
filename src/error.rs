//! Error types for the pool keeper.
//!
//! Every failure of the lifecycle operations is reported through [`PoolError`].
//! None of them are retried internally; each one is terminal for the call that
//! produced it.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("missing options")]
    MissingOptions,

    #[error("invalid options, the user option is mandatory")]
    MissingUser,

    #[error("unable to locate database configuration in config source (tried: {tried})")]
    ConfigurationNotFound { tried: String },

    #[error("missing database configuration under key '{key}'")]
    MissingDatabaseConfig { key: String },

    #[error("Failed to create connection pool: {message}")]
    PoolCreationFailed { message: String },

    #[error("connection pool was drained or is invalid")]
    InvalidPool,

    #[error("Failed to acquire connection: {message}")]
    ConnectionAcquisitionFailed { message: String },

    #[error("invalid connection handle")]
    InvalidConnectionHandle,

    #[error("unknown connection handle")]
    UnknownConnectionHandle,

    #[error("invalid connection passed to wrap")]
    InvalidConnection,

    #[error("Failed to drain connection pool: {message}")]
    TeardownFailed { message: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42S02" for unknown table
        sql_state: Option<String>,
    },

    #[error("Configuration source error: {message}")]
    ConfigSource { message: String },
}

impl PoolError {
    /// Create a configuration-not-found error listing the keys that were tried.
    pub fn configuration_not_found(tried: &[&str]) -> Self {
        Self::ConfigurationNotFound {
            tried: tried.join(", "),
        }
    }

    /// Create a missing database config error for a matched key.
    pub fn missing_database_config(key: impl Into<String>) -> Self {
        Self::MissingDatabaseConfig { key: key.into() }
    }

    /// Create a pool creation error.
    pub fn pool_creation_failed(message: impl Into<String>) -> Self {
        Self::PoolCreationFailed {
            message: message.into(),
        }
    }

    /// Create a connection acquisition error.
    pub fn acquisition_failed(message: impl Into<String>) -> Self {
        Self::ConnectionAcquisitionFailed {
            message: message.into(),
        }
    }

    /// Create a teardown error.
    pub fn teardown_failed(message: impl Into<String>) -> Self {
        Self::TeardownFailed {
            message: message.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a configuration source error.
    pub fn config_source(message: impl Into<String>) -> Self {
        Self::ConfigSource {
            message: message.into(),
        }
    }

    /// Check if this error can only be fixed by changing configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingOptions
                | Self::MissingUser
                | Self::ConfigurationNotFound { .. }
                | Self::MissingDatabaseConfig { .. }
                | Self::ConfigSource { .. }
        )
    }
}

/// Convert sqlx errors raised while running statements.
///
/// Pool-level failures are mapped explicitly at the call sites in
/// `driver::mysql`, where it is known whether creation, acquisition or
/// teardown failed.
impl From<sqlx::Error> for PoolError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                PoolError::query(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => PoolError::query("No rows returned", None),
            sqlx::Error::Io(io_err) => PoolError::query(format!("I/O error: {}", io_err), None),
            sqlx::Error::Protocol(msg) => {
                PoolError::query(format!("Protocol error: {}", msg), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                PoolError::query(format!("Failed to decode column {}: {}", index, source), None)
            }
            _ => PoolError::query(err.to_string(), None),
        }
    }
}

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
