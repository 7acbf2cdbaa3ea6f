use domain::PaymentStatus;
use thiserror::Error;

/// Errors that can occur when reading or writing the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent transaction touched the same rows; the operation can be retried.
    #[error("Concurrency conflict: {0}")]
    Conflict(String),

    /// The row the operation targets does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique constraint was violated.
    #[error("{0} already exists")]
    Duplicate(String),

    /// A referenced row does not exist, or the row is still referenced.
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// A stored value could not be decoded into a domain type.
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// The payment moved on between planning and writing a change.
    pub fn payment_status_changed(expected: PaymentStatus, actual: PaymentStatus) -> Self {
        StoreError::Conflict(format!(
            "payment status changed from {expected} to {actual}"
        ))
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Database(_))
    }
}

/// SQLSTATE codes the store reacts to.
mod sqlstate {
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
        {
            match code.as_ref() {
                sqlstate::SERIALIZATION_FAILURE | sqlstate::DEADLOCK_DETECTED => {
                    return StoreError::Conflict(db_err.message().to_string());
                }
                sqlstate::UNIQUE_VIOLATION => {
                    // Another webhook committed the same ticket number first.
                    if db_err.constraint() == Some("unique_ticket_number") {
                        return StoreError::Conflict(db_err.message().to_string());
                    }
                    if db_err.constraint() == Some("unique_payment_method_name") {
                        return StoreError::Duplicate("Payment Method".to_string());
                    }
                }
                sqlstate::FOREIGN_KEY_VIOLATION => {
                    return StoreError::ForeignKey(
                        db_err
                            .constraint()
                            .unwrap_or_else(|| db_err.message())
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
