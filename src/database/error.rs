use thiserror::Error;

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;

/// Error type for database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Entity not found with ID: {0}")]
    NotFound(String),

    #[error("Duplicate entity with key: {0}")]
    DuplicateKey(String),

    #[error("Task index {index} out of range for activity {activity_id} ({len} tasks)")]
    TaskIndexOutOfRange {
        activity_id: String,
        index: usize,
        len: usize,
    },

    #[error("Record {0} kept changing during update")]
    WriteConflict(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Database I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Internal database error: {0}")]
    InternalError(String),
}

impl DatabaseError {
    /// Whether the error means the requested record does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Whether the error came from the backing store rather than the request
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::IoError(_)
                | DatabaseError::SerializationError(_)
                | DatabaseError::ConnectionError(_)
                | DatabaseError::WriteConflict(_)
                | DatabaseError::InternalError(_)
        )
    }
}

impl From<mongodb::error::Error> for DatabaseError {
    fn from(e: mongodb::error::Error) -> Self {
        DatabaseError::InternalError(format!("MongoDB error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(DatabaseError::NotFound("x".into()).is_not_found());
        assert!(!DatabaseError::NotFound("x".into()).is_storage_error());

        let io = DatabaseError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_storage_error());
        assert!(!io.is_not_found());

        let dup = DatabaseError::DuplicateKey("a@b.c".into());
        assert!(!dup.is_storage_error());
        assert!(!dup.is_not_found());
    }
}
