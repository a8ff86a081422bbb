//! Error types for dbkit

use thiserror::Error;

/// Result type alias for dbkit operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for mapping, condition building and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// No field of the destination record matched any result column
    #[error("no field of `{record}` matches any result column")]
    MappingEmpty { record: String },

    /// A single-row scan found an empty result set
    #[error("no rows in result set")]
    NoRows,

    /// A field conversion failed
    #[error(
        "cannot convert column '{column}' ({db_type}) value {value} into field `{field}: {field_type}`: {message}"
    )]
    Conversion {
        column: String,
        db_type: String,
        field: String,
        field_type: String,
        value: String,
        message: String,
    },

    /// Placeholder/argument mismatch or an unusable condition shape
    #[error("Malformed condition: {0}")]
    MalformedCondition(String),

    /// UPDATE or DELETE assembled without any predicate
    #[error("refusing to {0} without a WHERE clause (call allow_all() to target every row)")]
    MissingGuardClause(String),

    /// Row cursor returned data in an unexpected shape
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A statement hook stopped execution
    #[error("Statement aborted by hook: {0}")]
    HookAborted(String),

    /// Query execution error
    #[cfg(feature = "postgres")]
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a mapping-empty error for a record type
    pub fn mapping_empty(record: impl Into<String>) -> Self {
        Self::MappingEmpty {
            record: record.into(),
        }
    }

    /// Create a malformed condition error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCondition(message.into())
    }

    /// Create a missing guard clause error for a statement verb
    pub fn missing_guard(verb: impl Into<String>) -> Self {
        Self::MissingGuardClause(verb.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a no-rows error
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// Check if this is a mapping-empty error
    pub fn is_mapping_empty(&self) -> bool {
        matches!(self, Self::MappingEmpty { .. })
    }

    /// Check if this is a conversion error
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion { .. })
    }

    /// Check if this is a malformed condition error
    pub fn is_malformed_condition(&self) -> bool {
        matches!(self, Self::MalformedCondition(_))
    }

    /// Check if this is a missing guard clause error
    pub fn is_missing_guard(&self) -> bool {
        matches!(self, Self::MissingGuardClause(_))
    }
}
