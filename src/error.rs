use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::store::StoreError;

pub type AggregateResult<T> = Result<T, AggregateError>;

/// Failure of an aggregate operation, named by the logical step that failed.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Malformed or missing input, detected before anything is written
    #[error("{0}")]
    ValidationFailed(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    /// Uniqueness violation reported by storage
    #[error("{0}")]
    Conflict(String),

    /// Storage failure inside a unit of work; the unit has been rolled back
    #[error("transaction failed while {step}")]
    TransactionFailed {
        step: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    Conflict,
    TransactionFailed,
}

impl AggregateError {
    pub fn validation(message: impl Into<String>) -> Self {
        AggregateError::ValidationFailed(message.into())
    }

    pub fn not_found(entity: impl fmt::Display, id: impl fmt::Display) -> Self {
        AggregateError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Translate a storage failure raised while performing `step`
    pub fn from_store(step: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(message) => AggregateError::Conflict(message),
            StoreError::ReferenceViolation(message) => AggregateError::ValidationFailed(message),
            other => AggregateError::TransactionFailed {
                step: step.into(),
                source: other,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AggregateError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            AggregateError::NotFound { .. } => ErrorKind::NotFound,
            AggregateError::Conflict(_) => ErrorKind::Conflict,
            AggregateError::TransactionFailed { .. } => ErrorKind::TransactionFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_caller_kinds() {
        let conflict = AggregateError::from_store(
            "inserting assets",
            StoreError::UniqueViolation("assetCode already exists".to_string()),
        );
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let reference = AggregateError::from_store(
            "inserting assets",
            StoreError::ReferenceViolation("unknown department".to_string()),
        );
        assert_eq!(reference.kind(), ErrorKind::ValidationFailed);

        let backend = AggregateError::from_store(
            "updating assets",
            StoreError::Backend(anyhow::anyhow!("connection reset")),
        );
        assert_eq!(backend.kind(), ErrorKind::TransactionFailed);
        assert_eq!(backend.to_string(), "transaction failed while updating assets");
    }

    #[test]
    fn test_not_found_message() {
        let err = AggregateError::not_found("Asset", 12);
        assert_eq!(err.to_string(), "Asset 12 not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
