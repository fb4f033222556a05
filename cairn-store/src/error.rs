//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// Every variant is a store fault: the operation did not complete and the
/// caller decides whether to retry it. Conditional writes that lose a race
/// are not errors; they are reported as `Ok(false)` by the repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Duplicate entity (unique key already taken)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Value cannot be represented by the backend
    #[error("Value out of range for {column}: {value}")]
    OutOfRange {
        /// Column or field name
        column: &'static str,
        /// Offending value
        value: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend unreachable, timed out or otherwise unusable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Create an out-of-range error
    pub fn out_of_range(column: &'static str, value: impl ToString) -> Self {
        Self::OutOfRange {
            column,
            value: value.to_string(),
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                // Check for unique constraint violation
                if db_err.code().map(|c| c == "23505").unwrap_or(false) {
                    StoreError::Duplicate {
                        entity_type: db_err.table().unwrap_or("unknown").to_string(),
                        id: db_err.constraint().unwrap_or("unknown").to_string(),
                    }
                } else {
                    StoreError::Database(db_err.to_string())
                }
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Connection(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Serialization(err.to_string())
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}
