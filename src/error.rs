//! Error types for the ACS warehouse loader.
//!
//! Run-level errors ([`Error`]) stop the run before or outside the unit loop.
//! Everything that can go wrong inside a single work unit is a [`SkipReason`],
//! which the run driver records and moves past.

use thiserror::Error;

/// Result alias for run-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort the whole run
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Table catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failed call to the Census API or an unusable payload
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("malformed payload from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Transport { url, .. }
            | FetchError::Malformed { url, .. } => url,
        }
    }
}

/// A failed warehouse statement
#[derive(Error, Debug)]
pub enum StoreError {
    /// The table has more columns than the store allows for a normal table.
    /// The loader answers this with the wide-table layout.
    #[error("table {table} has {count} columns, which exceeds the maximum of {max} columns")]
    ColumnLimit {
        table: String,
        count: usize,
        max: usize,
    },

    #[error("statement failed: {message} [{statement}]")]
    Statement { statement: String, message: String },

    #[error("bulk load of {path} failed: {message}")]
    BulkLoad { path: String, message: String },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wrap a rusqlite error with the statement that produced it
    pub fn statement(statement: impl Into<String>, err: rusqlite::Error) -> Self {
        StoreError::Statement {
            statement: statement.into(),
            message: err.to_string(),
        }
    }

    pub fn is_column_limit(&self) -> bool {
        matches!(self, StoreError::ColumnLimit { .. })
    }
}

/// Why a work unit did not reach the warehouse
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("intermediate file error: {0}")]
    Io(#[from] std::io::Error),
}

impl SkipReason {
    /// Short origin tag used in the run report
    pub fn origin(&self) -> &'static str {
        match self {
            SkipReason::Fetch(_) => "api",
            SkipReason::Store(_) | SkipReason::Io(_) => "store",
        }
    }
}
