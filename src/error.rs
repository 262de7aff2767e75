//! Error types for query building, parsing and binding

use thiserror::Error;

/// Errors that can occur while building, parsing or binding queries
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed query text or an unsupported construct
    #[error("Query error: {0}")]
    Query(String),

    /// A placeholder was read before a value was bound to it
    #[error("Parameter not bound: @{0}")]
    UnboundParameter(String),

    /// A query with placeholders was run outside of a prepared statement
    #[error("To run a query with a parameter use a PrepareStatement instead.")]
    ParameterizedQuery,

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// Positional binding ran out of arguments
    #[error("Index out of bounds: index {index}, length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        Self::UnboundParameter(name.into())
    }

    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
