//! Error types for Warden

use crate::kms::KmsError;
use sqlx::error::ErrorKind;
use thiserror::Error;

/// SQLite primary and extended result codes for a locked database
const BUSY_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Result type alias using Warden's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Warden error types, classified so callers can tell retry from abort
#[derive(Error, Debug)]
pub enum Error {
    // Parameter errors (E100-E199)
    #[error("{0} invalid parameter")]
    InvalidParameter(String),

    // Precondition errors (E200-E299)
    #[error("{entity} '{id}' version mismatch: expected {expected}, found {found}. Re-read and retry.")]
    VersionMismatch {
        entity: &'static str,
        id: String,
        expected: u32,
        found: u32,
    },

    #[error("{entity} '{id}' cannot transition from {from} to {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error("Session '{session_id}' has {open} open connection(s). Close them before terminating.")]
    OpenConnections { session_id: String, open: i64 },

    // Lookup errors (E300-E399)
    #[error("{0}: record not found")]
    RecordNotFound(String),

    // Constraint errors (E400-E499)
    #[error("Unique constraint violated: {0}")]
    NotUnique(String),

    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error("Not-null constraint violated: {0}")]
    NotNullViolation(String),

    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    #[error("Database busy: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    // Kms errors (E500-E599)
    #[error("Kms error: {0}")]
    Kms(#[from] KmsError),

    // Config errors (E600-E699)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Generic errors
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::Database(db_err) => {
                if db_err.code().is_some_and(|code| BUSY_CODES.contains(&&*code)) {
                    return Self::Busy(db_err.message().to_string());
                }
                db_err.kind()
            }
            _ => return Self::DatabaseError(err),
        };
        let message = err.to_string();
        match kind {
            ErrorKind::UniqueViolation => Self::NotUnique(message),
            ErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(message),
            ErrorKind::NotNullViolation => Self::NotNullViolation(message),
            ErrorKind::CheckViolation => Self::CheckViolation(message),
            _ => Self::DatabaseError(err),
        }
    }
}

impl Error {
    /// Shorthand for an [`Error::InvalidParameter`] with an operation-prefixed message
    pub(crate) fn invalid(op: &str, what: &str) -> Self {
        Self::InvalidParameter(format!("{}: {}", op, what))
    }

    /// Shorthand for an [`Error::RecordNotFound`] with an operation-prefixed message
    pub(crate) fn not_found(op: &str, id: &str) -> Self {
        Self::RecordNotFound(format!("{}: failed record not found for {}", op, id))
    }

    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "E100",
            Self::VersionMismatch { .. } => "E200",
            Self::InvalidStatusTransition { .. } => "E201",
            Self::OpenConnections { .. } => "E202",
            Self::RecordNotFound(_) => "E300",
            Self::NotUnique(_) => "E400",
            Self::ForeignKeyViolation(_) => "E401",
            Self::NotNullViolation(_) => "E402",
            Self::CheckViolation(_) => "E403",
            Self::Busy(_) => "E498",
            Self::DatabaseError(_) => "E499",
            Self::Kms(_) => "E500",
            Self::InvalidConfig(_) => "E600",
            Self::Parse(_) | Self::Io(_) => "E9999",
        }
    }

    /// True when the stored row did not permit the write (stale version or wrong status)
    pub fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. } | Self::InvalidStatusTransition { .. }
        )
    }

    /// True when retrying, after re-reading the row if its version was stale, may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::VersionMismatch { .. } | Self::Busy(_) => true,
            Self::DatabaseError(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::VersionMismatch { .. } => {
                Some("Look the record up again and retry with its current version".to_string())
            }
            Self::OpenConnections { session_id, .. } => Some(format!(
                "Close the connections of session {} before terminating it",
                session_id
            )),
            Self::Busy(_) => Some(
                "Another writer holds the database lock; retry, or raise database.busy_timeout_secs"
                    .to_string(),
            ),
            Self::RecordNotFound(_) => Some("warden sessions list".to_string()),
            Self::Kms(_) => Some("Check the WARDEN_KMS_KEY environment variable".to_string()),
            Self::InvalidConfig(_) => Some("warden config list".to_string()),
            _ => None,
        }
    }
}

/// Whether the error reports a unique constraint violation
pub fn is_unique_error(err: &Error) -> bool {
    matches!(err, Error::NotUnique(_))
}

/// Whether the error reports a check constraint violation
pub fn is_check_constraint_error(err: &Error) -> bool {
    matches!(err, Error::CheckViolation(_))
}

/// Whether the error reports a not-null constraint violation
pub fn is_not_null_error(err: &Error) -> bool {
    matches!(err, Error::NotNullViolation(_))
}
