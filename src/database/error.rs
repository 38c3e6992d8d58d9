use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures, split so callers can tell "no such record" from
/// "the store could not answer".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("conflict: {message}")]
    Conflict { message: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound {
                entity: "row",
                key: String::new(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
                message: db.message().to_string(),
            },
            _ => StoreError::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_helper() {
        let err = StoreError::not_found("payment", "p1");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "payment not found: p1");
    }

    #[test]
    fn test_unavailable_is_retryable() {
        let err = StoreError::Unavailable {
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }
}
