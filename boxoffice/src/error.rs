//! Error types for inventory, reservation and order operations.

use thiserror::Error;

/// Result type alias for box office operations.
pub type Result<T> = std::result::Result<T, TicketingError>;

/// Error taxonomy for the box office.
///
/// Every variant maps onto one caller-visible [`ErrorKind`] through
/// [`TicketingError::kind`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TicketingError {
    // ═══════════════════════════════════════════════════════════
    // Request Errors
    // ═══════════════════════════════════════════════════════════

    /// Missing or malformed request field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Referenced record does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of record (`ticket`, `order`, ...)
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    // ═══════════════════════════════════════════════════════════
    // State Errors
    // ═══════════════════════════════════════════════════════════

    /// Not enough tickets available to place the hold.
    #[error("not enough tickets available: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Quantity requested
        requested: u32,
        /// Quantity available at lock time
        available: u32,
    },

    /// The record is not in a state that allows the operation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation was already applied or collides with a unique record.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ═══════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════

    /// A ledger or storage invariant would be broken.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A transaction exceeded its execution deadline and was rolled back.
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

/// Caller-visible error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing/malformed input
    InvalidArgument,
    /// Unknown id
    NotFound,
    /// State does not allow the operation
    FailedPrecondition,
    /// Duplicate or already applied
    AlreadyExists,
    /// Storage failure or broken invariant
    Internal,
}

impl ErrorKind {
    /// Stable string code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::Internal => "INTERNAL",
        }
    }
}

impl TicketingError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Caller-visible category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientInventory { .. } | Self::FailedPrecondition(_) => {
                ErrorKind::FailedPrecondition
            }
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::InvariantViolation(_) | Self::Storage(_) | Self::Timeout(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the operation unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal)
    }
}

impl From<sqlx::Error> for TicketingError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::Storage("row not found".to_string()),
            sqlx::Error::PoolTimedOut => Self::Timeout("timed out acquiring a connection".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                Some("23505") => Self::AlreadyExists(db.message().to_string()),
                Some("23514") => Self::InvariantViolation(db.message().to_string()),
                Some("57014") => Self::Timeout(db.message().to_string()),
                _ => Self::Storage(err.to_string()),
            },
            _ => Self::Storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let insufficient = TicketingError::InsufficientInventory {
            requested: 6,
            available: 4,
        };
        assert_eq!(insufficient.kind(), ErrorKind::FailedPrecondition);
        assert!(!insufficient.is_retryable());

        let missing = TicketingError::not_found("ticket", "abc");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing.to_string(), "ticket abc not found");

        for internal in [
            TicketingError::InvariantViolation("reserved < 0".into()),
            TicketingError::Storage("connection reset".into()),
            TicketingError::Timeout("statement timeout".into()),
        ] {
            assert_eq!(internal.kind(), ErrorKind::Internal);
            assert!(internal.is_retryable());
        }
    }

    #[test]
    fn test_row_not_found_is_storage() {
        let err: TicketingError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
