use chrono::{DateTime, Utc};
use thiserror::Error;

/// Malformed extraction request, rejected before any ledger record exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid date range: from {from} is after to {to}")]
    InvertedRange { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("invalid date for '{field}': {value}")]
    InvalidDate { field: String, value: String },

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("payload must be a JSON object")]
    NotAnObject,
}

impl ValidationError {
    pub fn field(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from repository operations (used by trait definitions in memoria-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
