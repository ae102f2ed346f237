//! Persistent project store errors

use thiserror::Error;

use crate::scene::ProjectId;

#[derive(Error, Debug)]
pub enum StoreError {
    /// No project document with this id
    #[error("Project {0} not found")]
    NotFound(ProjectId),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backing store refused the call
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Serialization(_) => "SERIALIZATION_ERROR",
            StoreError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = StoreError::NotFound(42);
        assert_eq!(err.to_string(), "Project 42 not found");
        assert!(err.is_not_found());
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_database_error_wraps_db_err() {
        let err: StoreError = sea_orm::DbErr::Custom("disk full".to_string()).into();
        assert!(!err.is_not_found());
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.to_string().contains("disk full"));
    }
}
