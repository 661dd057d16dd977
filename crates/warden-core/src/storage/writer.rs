//! Version-gated writes and append-only history rows
//!
//! Every mutation of a versioned row starts its transaction with
//! [`VersionedTable::bump`]: a conditional `UPDATE ... WHERE version = ?`
//! that both takes SQLite's write lock and performs the compare-and-increment.
//! Nothing is read before that statement, so a concurrent writer can never
//! slip in between the check and the write.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

/// A table whose rows carry a `version` column used for optimistic concurrency
#[derive(Debug, Clone, Copy)]
pub(crate) struct VersionedTable {
    pub entity: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
}

pub(crate) const SESSIONS: VersionedTable = VersionedTable {
    entity: "session",
    table: "sessions",
    id_column: "public_id",
};

pub(crate) const CONNECTIONS: VersionedTable = VersionedTable {
    entity: "connection",
    table: "connections",
    id_column: "public_id",
};

impl VersionedTable {
    /// Increment the row's version if it still equals `expected`
    ///
    /// Returns the new version. Fails with [`Error::RecordNotFound`] when the
    /// row does not exist and [`Error::VersionMismatch`] when it was changed
    /// since the caller read it. The caller's transaction must be dropped on
    /// error so nothing is committed.
    pub async fn bump(
        &self,
        conn: &mut SqliteConnection,
        op: &str,
        id: &str,
        expected: u32,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let sql = format!(
            "UPDATE {} SET version = version + 1, updated_at = ? WHERE {} = ? AND version = ?",
            self.table, self.id_column
        );
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(id)
            .bind(expected)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(expected + 1);
        }

        let found = self.current_version(conn, id).await?;
        match found {
            None => Err(Error::not_found(op, id)),
            Some(found) => {
                tracing::warn!(
                    entity = self.entity,
                    id = %id,
                    expected = expected,
                    found = found,
                    "Rejected write with stale version"
                );
                Err(Error::VersionMismatch {
                    entity: self.entity,
                    id: id.to_string(),
                    expected,
                    found,
                })
            }
        }
    }

    /// Read the stored version of a row, if it exists
    pub async fn current_version(&self, conn: &mut SqliteConnection, id: &str) -> Result<Option<u32>> {
        let sql = format!(
            "SELECT version FROM {} WHERE {} = ?",
            self.table, self.id_column
        );
        let row: Option<(u32,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|(version,)| version))
    }
}

/// An append-only status history table owned by a versioned entity
#[derive(Debug, Clone, Copy)]
pub(crate) struct HistoryTable {
    pub table: &'static str,
    pub owner_column: &'static str,
}

pub(crate) const SESSION_STATES: HistoryTable = HistoryTable {
    table: "session_states",
    owner_column: "session_id",
};

pub(crate) const CONNECTION_STATES: HistoryTable = HistoryTable {
    table: "connection_states",
    owner_column: "connection_id",
};

impl HistoryTable {
    /// Status of the owner's current (open-ended) history row
    pub async fn current_status(&self, conn: &mut SqliteConnection, owner_id: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT status FROM {} WHERE {} = ? AND end_time IS NULL",
            self.table, self.owner_column
        );
        let row: Option<(String,)> = sqlx::query_as(&sql)
            .bind(owner_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|(status,)| status))
    }

    /// Insert the first history row for a new owner
    pub async fn insert_initial(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}, status, start_time) VALUES (?, ?, ?)",
            self.table, self.owner_column
        );
        sqlx::query(&sql)
            .bind(owner_id)
            .bind(status)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// End the current row and append a new one with `status`
    ///
    /// The end stamp must happen first: at most one row per owner may have a
    /// null end time.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        owner_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET end_time = ? WHERE {} = ? AND end_time IS NULL",
            self.table, self.owner_column
        );
        sqlx::query(&sql)
            .bind(now)
            .bind(owner_id)
            .execute(&mut *conn)
            .await?;

        self.insert_initial(conn, owner_id, status, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn insert_worker_row(conn: &mut SqliteConnection, id: &str) {
        sqlx::query(
            "INSERT INTO workers (private_id, type, created_at, updated_at) VALUES (?, 'worker', ?, ?)",
        )
        .bind(id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .unwrap();
    }

    async fn insert_session_row(conn: &mut SqliteConnection, id: &str) {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                public_id, scope_id, user_id, target_id, host_id, host_set_id,
                auth_token_id, key_id, public_key, created_at, updated_at
            )
            VALUES (?, 'o_1', 'u_1', 't_1', 'h_1', 'hs_1', 'at_1', 'k', x'00', ?, ?)
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_bump_increments_version() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_session_row(&mut conn, "s_test000001").await;

        let v = SESSIONS
            .bump(&mut conn, "test", "s_test000001", 1, Utc::now())
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(
            SESSIONS.current_version(&mut conn, "s_test000001").await.unwrap(),
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_bump_stale_version() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_session_row(&mut conn, "s_test000002").await;

        let err = SESSIONS
            .bump(&mut conn, "test", "s_test000002", 7, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::VersionMismatch {
                expected: 7,
                found: 1,
                ..
            }
        ));
        assert_eq!(
            SESSIONS.current_version(&mut conn, "s_test000002").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_bump_missing_row() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let err = SESSIONS
            .bump(&mut conn, "test", "s_missing000", 1, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_history_append_keeps_one_current_row() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_worker_row(&mut conn, "w_1").await;
        insert_session_row(&mut conn, "s_test000003").await;

        SESSION_STATES
            .insert_initial(&mut conn, "s_test000003", "pending", Utc::now())
            .await
            .unwrap();
        SESSION_STATES
            .append(&mut conn, "s_test000003", "active", Utc::now())
            .await
            .unwrap();

        let (open,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM session_states WHERE session_id = ? AND end_time IS NULL",
        )
        .bind("s_test000003")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
        assert_eq!(open, 1);
        assert_eq!(
            SESSION_STATES
                .current_status(&mut conn, "s_test000003")
                .await
                .unwrap()
                .as_deref(),
            Some("active")
        );
    }

    #[tokio::test]
    async fn test_second_open_state_rejected() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_session_row(&mut conn, "s_test000004").await;

        SESSION_STATES
            .insert_initial(&mut conn, "s_test000004", "pending", Utc::now())
            .await
            .unwrap();
        let err = SESSION_STATES
            .insert_initial(&mut conn, "s_test000004", "active", Utc::now())
            .await
            .unwrap_err();
        assert!(crate::error::is_unique_error(&err));
    }

    #[tokio::test]
    async fn test_history_rows_are_append_only() {
        let db = Database::in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_session_row(&mut conn, "s_test000005").await;
        SESSION_STATES
            .insert_initial(&mut conn, "s_test000005", "pending", Utc::now())
            .await
            .unwrap();

        let result = sqlx::query("UPDATE session_states SET status = 'active' WHERE session_id = ?")
            .bind("s_test000005")
            .execute(&mut *conn)
            .await;
        assert!(result.is_err());
    }
}
