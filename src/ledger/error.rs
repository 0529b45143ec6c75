//! Ledger Error Types
//!
//! Structured errors returned by the data-access layer, the transaction
//! coordinator and the transactional workflows. The core never formats user
//! messages; collaborators map [`ErrorKind`] to their own status codes.

use thiserror::Error;

/// SQLSTATE codes the ledger reacts to
pub mod sqlstate {
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const SERIALIZATION_FAILURE: &str = "40001";
    pub const DEADLOCK_DETECTED: &str = "40P01";
    pub const QUERY_CANCELED: &str = "57014";
    /// Class 08: connection exceptions
    pub const CONNECTION_EXCEPTION_CLASS: &str = "08";
}

/// Coarse error classes used for retry and status decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Referenced row is absent
    NotFound,
    /// Unique or foreign-key constraint violated
    Conflict,
    /// Request rejected before or during the transaction (bad amount, funds, ...)
    Invalid,
    /// Safe to retry the whole transactional call
    Transient,
    /// Unexpected store failure
    Internal,
}

/// Which constraint family a conflict came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    UniqueViolation,
    ForeignKeyViolation,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    // === Lookup ===
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    // === Constraint violations ===
    #[error("{} on {}", conflict_label(.kind), .constraint.as_deref().unwrap_or("unknown constraint"))]
    Conflict {
        kind: ConflictKind,
        constraint: Option<String>,
    },

    // === Validation ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Currency mismatch: account {account_id} is {actual}, expected {expected}")]
    CurrencyMismatch {
        account_id: i64,
        expected: String,
        actual: String,
    },

    #[error("Insufficient balance in account {account_id}: has {balance}, needs {required}")]
    InsufficientBalance {
        account_id: i64,
        balance: i64,
        required: i64,
    },

    #[error("Balance of account {account_id} would overflow")]
    BalanceOverflow { account_id: i64 },

    // === Side-effect hooks ===
    #[error("after-create hook failed: {0}")]
    Hook(String),

    #[error("Invalid task payload: {0}")]
    Payload(#[from] serde_json::Error),

    // === Store ===
    #[error("Transient database error: {0}")]
    Transient(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("{source}; rollback also failed: {rollback}")]
    RollbackFailed {
        source: Box<LedgerError>,
        rollback: sqlx::Error,
    },
}

fn conflict_label(kind: &ConflictKind) -> &'static str {
    match kind {
        ConflictKind::UniqueViolation => "Record already exists",
        ConflictKind::ForeignKeyViolation => "Referenced record does not exist",
    }
}

/// Classify a SQLSTATE code. `None` means no special handling.
pub fn classify_sqlstate(code: &str) -> Option<ErrorKind> {
    match code {
        sqlstate::UNIQUE_VIOLATION | sqlstate::FOREIGN_KEY_VIOLATION => Some(ErrorKind::Conflict),
        sqlstate::SERIALIZATION_FAILURE | sqlstate::DEADLOCK_DETECTED | sqlstate::QUERY_CANCELED => {
            Some(ErrorKind::Transient)
        }
        c if c.starts_with(sqlstate::CONNECTION_EXCEPTION_CLASS) => Some(ErrorKind::Transient),
        _ => None,
    }
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::InvalidAmount
            | LedgerError::SameAccount
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::BalanceOverflow { .. }
            | LedgerError::Hook(_) => ErrorKind::Invalid,
            LedgerError::Transient(_) => ErrorKind::Transient,
            LedgerError::Payload(_) | LedgerError::Database(_) => ErrorKind::Internal,
            LedgerError::RollbackFailed { source, .. } => source.kind(),
        }
    }

    /// Only transient errors should be retried, and only as a whole call
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// True for a unique-constraint violation ("already exists")
    pub fn is_unique_violation(&self) -> bool {
        match self {
            LedgerError::Conflict { kind, .. } => *kind == ConflictKind::UniqueViolation,
            LedgerError::RollbackFailed { source, .. } => source.is_unique_violation(),
            _ => false,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::Conflict {
                kind: ConflictKind::UniqueViolation,
                ..
            } => "ALREADY_EXISTS",
            LedgerError::Conflict {
                kind: ConflictKind::ForeignKeyViolation,
                ..
            } => "FOREIGN_KEY_VIOLATION",
            LedgerError::InvalidAmount => "INVALID_AMOUNT",
            LedgerError::SameAccount => "SAME_ACCOUNT",
            LedgerError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::BalanceOverflow { .. } => "OVERFLOW",
            LedgerError::Hook(_) => "HOOK_FAILED",
            LedgerError::Payload(_) => "INVALID_PAYLOAD",
            LedgerError::Transient(_) => "TRANSIENT",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::RollbackFailed { source, .. } => source.code(),
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::RollbackFailed { source, .. } => source.http_status(),
            LedgerError::InvalidAmount | LedgerError::SameAccount => 400,
            LedgerError::CurrencyMismatch { .. }
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::BalanceOverflow { .. }
            | LedgerError::Hook(_) => 422,
            other => match other.kind() {
                ErrorKind::NotFound => 404,
                ErrorKind::Conflict => 409,
                ErrorKind::Transient => 503,
                ErrorKind::Invalid | ErrorKind::Internal => 500,
            },
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        if matches!(e, sqlx::Error::RowNotFound) {
            return LedgerError::NotFound { entity: "row" };
        }
        if matches!(
            e,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
        ) {
            return LedgerError::Transient(e);
        }

        let Some(db_err) = e.as_database_error() else {
            return LedgerError::Database(e);
        };
        let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

        match classify_sqlstate(&code) {
            Some(ErrorKind::Conflict) => LedgerError::Conflict {
                kind: if code == sqlstate::UNIQUE_VIOLATION {
                    ConflictKind::UniqueViolation
                } else {
                    ConflictKind::ForeignKeyViolation
                },
                constraint: db_err.constraint().map(str::to_string),
            },
            Some(ErrorKind::Transient) => LedgerError::Transient(e),
            _ => LedgerError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_sqlstate() {
        assert_eq!(classify_sqlstate("23505"), Some(ErrorKind::Conflict));
        assert_eq!(classify_sqlstate("23503"), Some(ErrorKind::Conflict));
        assert_eq!(classify_sqlstate("40001"), Some(ErrorKind::Transient));
        assert_eq!(classify_sqlstate("40P01"), Some(ErrorKind::Transient));
        assert_eq!(classify_sqlstate("57014"), Some(ErrorKind::Transient));
        assert_eq!(classify_sqlstate("08006"), Some(ErrorKind::Transient));
        assert_eq!(classify_sqlstate("42P01"), None);
        assert_eq!(classify_sqlstate(""), None);
    }

    #[test]
    fn test_sqlx_error_mapping() {
        assert_eq!(
            LedgerError::from(sqlx::Error::RowNotFound).kind(),
            ErrorKind::NotFound
        );
        let timed_out = LedgerError::from(sqlx::Error::PoolTimedOut);
        assert!(timed_out.is_retryable());
        assert_eq!(
            LedgerError::from(sqlx::Error::Protocol("bad frame".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(LedgerError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(
            LedgerError::Conflict {
                kind: ConflictKind::UniqueViolation,
                constraint: Some("users_pkey".into()),
            }
            .code(),
            "ALREADY_EXISTS"
        );
        assert_eq!(
            LedgerError::NotFound { entity: "account" }.code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(LedgerError::NotFound { entity: "user" }.http_status(), 404);
        assert_eq!(
            LedgerError::Conflict {
                kind: ConflictKind::ForeignKeyViolation,
                constraint: None,
            }
            .http_status(),
            409
        );
        assert_eq!(LedgerError::InvalidAmount.http_status(), 400);
        assert_eq!(
            LedgerError::InsufficientBalance {
                account_id: 1,
                balance: 5,
                required: 10,
            }
            .http_status(),
            422
        );
        assert_eq!(
            LedgerError::from(sqlx::Error::PoolClosed).http_status(),
            503
        );
    }

    #[test]
    fn test_rollback_failure_keeps_original_classification() {
        let err = LedgerError::RollbackFailed {
            source: Box::new(LedgerError::Conflict {
                kind: ConflictKind::UniqueViolation,
                constraint: Some("users_email_key".into()),
            }),
            rollback: sqlx::Error::PoolClosed,
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_unique_violation());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("rollback also failed"));
        assert!(err.to_string().contains("users_email_key"));
    }

    #[test]
    fn test_display() {
        let err = LedgerError::NotFound { entity: "account" };
        assert_eq!(err.to_string(), "account not found");
    }
}
