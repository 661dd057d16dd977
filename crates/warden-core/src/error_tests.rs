//! Error module tests

use crate::error::{Error, Result, is_check_constraint_error, is_not_null_error, is_unique_error};
use crate::kms::KmsError;
use crate::storage::Database;

#[test]
fn test_invalid_parameter_error() {
    let error = Error::invalid("delete session", "missing public id");
    assert_eq!(error.code(), "E100");
    assert_eq!(error.suggestion(), None);
    assert_eq!(
        error.to_string(),
        "delete session: missing public id invalid parameter"
    );
    assert!(!error.is_precondition_failed());
}

#[test]
fn test_version_mismatch_error() {
    let error = Error::VersionMismatch {
        entity: "session",
        id: "s_1234567890".to_string(),
        expected: 2,
        found: 3,
    };
    assert_eq!(error.code(), "E200");
    assert!(error.is_precondition_failed());
    assert!(error.is_retryable());
    assert!(error.suggestion().is_some());
    assert!(error.to_string().contains("s_1234567890"));
}

#[test]
fn test_invalid_status_transition_error() {
    let error = Error::InvalidStatusTransition {
        entity: "session",
        id: "s_1234567890".to_string(),
        from: "terminated".to_string(),
        to: "active".to_string(),
    };
    assert_eq!(error.code(), "E201");
    assert!(error.is_precondition_failed());
    assert!(!error.is_retryable());
    assert!(error.to_string().contains("from terminated to active"));
}

#[test]
fn test_open_connections_error() {
    let error = Error::OpenConnections {
        session_id: "s_1234567890".to_string(),
        open: 2,
    };
    assert_eq!(error.code(), "E202");
    assert!(!error.is_precondition_failed());
    assert!(!error.is_retryable());
    assert_eq!(
        error.suggestion(),
        Some("Close the connections of session s_1234567890 before terminating it".to_string())
    );
}

#[test]
fn test_record_not_found_error() {
    let error = Error::not_found("delete session", "s_1234567890");
    assert_eq!(error.code(), "E300");
    assert_eq!(error.suggestion(), Some("warden sessions list".to_string()));
    assert_eq!(
        error.to_string(),
        "delete session: failed record not found for s_1234567890: record not found"
    );
}

#[test]
fn test_kms_error_conversion() {
    let error: Error = KmsError::MissingScope.into();
    assert_eq!(error.code(), "E500");
    assert!(matches!(error, Error::Kms(KmsError::MissingScope)));
}

#[test]
fn test_pool_timeout_is_retryable() {
    let error: Error = sqlx::Error::PoolTimedOut.into();
    assert_eq!(error.code(), "E499");
    assert!(error.is_retryable());

    let error: Error = sqlx::Error::RowNotFound.into();
    assert!(matches!(error, Error::DatabaseError(_)));
    assert!(!error.is_retryable());
}

#[test]
fn test_busy_error() {
    let error = Error::Busy("database is locked".to_string());
    assert_eq!(error.code(), "E498");
    assert!(error.is_retryable());
    assert!(!error.is_precondition_failed());
    assert!(error.suggestion().is_some());
    assert_eq!(error.to_string(), "Database busy: database is locked");
}

#[test]
fn test_result_type() {
    fn returns_ok() -> Result<i32> {
        Ok(42)
    }

    fn returns_err() -> Result<i32> {
        Err(Error::InvalidConfig("bad".to_string()))
    }

    assert_eq!(returns_ok().unwrap(), 42);
    assert_eq!(returns_err().unwrap_err().code(), "E600");
}

#[tokio::test]
async fn test_constraint_errors_are_classified() {
    let db = Database::in_memory().await.unwrap();
    let now = chrono::Utc::now();

    let insert_worker = |id: &'static str, kind: &'static str| {
        sqlx::query("INSERT INTO workers (private_id, type, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(kind)
            .bind(now)
            .bind(now)
    };

    insert_worker("w_1", "worker").execute(db.pool()).await.unwrap();

    let err: Error = insert_worker("w_1", "worker")
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
    assert!(is_unique_error(&err));
    assert_eq!(err.code(), "E400");

    let err: Error = insert_worker("w_2", "gateway")
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
    assert!(is_check_constraint_error(&err));

    let err: Error = sqlx::query("INSERT INTO workers (private_id, type, created_at, updated_at) VALUES (?, NULL, ?, ?)")
        .bind("w_3")
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap_err()
        .into();
    assert!(is_not_null_error(&err));

    let err: Error = sqlx::query(
        "INSERT INTO session_states (session_id, status, start_time) VALUES ('s_missing', 'pending', ?)",
    )
    .bind(now)
    .execute(db.pool())
    .await
    .unwrap_err()
    .into();
    assert!(matches!(err, Error::ForeignKeyViolation(_)));
}
