//! Session repository for database operations
//!
//! Every mutation runs in one transaction whose first statement is a write,
//! either the INSERT of a create or the version compare-and-increment of an
//! update, so SQLite's write lock is held before anything is read. Errors
//! return before `commit`, and dropping the transaction rolls it back.

use super::connection::{
    CloseConnectionResp, CloseWith, ClosedReason, ConnectWith, Connection, ConnectionState,
    ConnectionStatus,
};
use super::options::{ListOptions, RepositoryOptions};
use super::session::{Session, SessionStatus, TerminationReason};
use super::state::SessionState;
use crate::domain::worker::WorkerType;
use crate::error::{Error, Result};
use crate::id;
use crate::kms::{Kms, KmsError};
use crate::storage::Database;
use crate::storage::writer::{CONNECTION_STATES, CONNECTIONS, SESSION_STATES, SESSIONS};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

const SESSION_COLUMNS: &str = r#"
    public_id, scope_id, user_id, target_id, host_id, host_set_id, auth_token_id,
    endpoint, worker_id, worker_type, ct_tofu_token, key_id, public_key,
    termination_reason, version, created_at, updated_at
"#;

const CONNECTION_COLUMNS: &str = r#"
    public_id, session_id, client_tcp_address, client_tcp_port,
    endpoint_tcp_address, endpoint_tcp_port, bytes_up, bytes_down,
    closed_reason, version, created_at, updated_at
"#;

/// Repository for sessions, their state history, and their connections
///
/// Handles are cheap to clone and hold no per-call state.
#[derive(Clone)]
pub struct SessionRepository {
    reader: SqlitePool,
    writer: SqlitePool,
    kms: Arc<dyn Kms>,
    default_limit: i64,
}

impl fmt::Debug for SessionRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRepository")
            .field("key_id", &self.kms.key_id())
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

impl SessionRepository {
    /// Create a new repository over separate read and write pools
    pub fn new(
        reader: SqlitePool,
        writer: SqlitePool,
        kms: Arc<dyn Kms>,
        options: RepositoryOptions,
    ) -> Result<Self> {
        if options.default_limit <= 0 {
            return Err(Error::InvalidConfig(format!(
                "session repository default limit must be positive, got {}",
                options.default_limit
            )));
        }
        Ok(Self {
            reader,
            writer,
            kms,
            default_limit: options.default_limit,
        })
    }

    /// Create a repository that reads and writes through one database
    pub fn from_database(db: &Database, kms: Arc<dyn Kms>, options: RepositoryOptions) -> Result<Self> {
        Self::new(db.pool().clone(), db.pool().clone(), kms, options)
    }

    // ========== Session writes ==========

    /// Persist a new session in the `pending` state
    ///
    /// Returns the stored session, its initial state, and the session's
    /// signing key. Only the public half of the key is stored.
    pub async fn create_session(&self, session: Session) -> Result<(Session, SessionState, SigningKey)> {
        const OP: &str = "create session";
        if !session.public_id.is_empty() {
            return Err(Error::invalid(OP, "public id not empty"));
        }
        if let Some(field) = session.composed_of().missing_field() {
            return Err(Error::invalid(OP, &format!("missing {}", field)));
        }

        let public_id = id::new_session_id()?;
        let signing_key = self.signing_key(&session.scope_id, &public_id).await?;
        let public_key = signing_key.verifying_key().to_bytes().to_vec();
        let now = Utc::now();

        let mut tx = self.writer.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO sessions (
                public_id, scope_id, user_id, target_id, host_id, host_set_id, auth_token_id,
                endpoint, key_id, public_key, version, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(&session.scope_id)
        .bind(&session.user_id)
        .bind(&session.target_id)
        .bind(&session.host_id)
        .bind(&session.host_set_id)
        .bind(&session.auth_token_id)
        .bind(&session.endpoint)
        .bind(self.kms.key_id())
        .bind(&public_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        SESSION_STATES
            .insert_initial(&mut tx, &public_id, SessionStatus::Pending.as_str(), now)
            .await?;

        let (row, mut states) = fetch_session(&mut tx, OP, &public_id).await?;
        tx.commit().await?;

        let state = states
            .pop()
            .ok_or_else(|| Error::not_found(OP, &public_id))?;
        let created = self.hydrate(row).await?;

        tracing::info!(
            session_id = %created.public_id,
            scope_id = %created.scope_id,
            user_id = %created.user_id,
            target_id = %created.target_id,
            "Created session"
        );
        Ok((created, state, signing_key))
    }

    /// Move a `pending` session to `active`, binding it to a worker
    ///
    /// The trust token is encrypted under the session's scope before it is
    /// stored. Returns the session and its history, newest first.
    pub async fn activate_session(
        &self,
        session_id: &str,
        version: u32,
        worker_id: &str,
        worker_type: WorkerType,
        tofu_token: &[u8],
    ) -> Result<(Session, Vec<SessionState>)> {
        const OP: &str = "activate session";
        if session_id.is_empty() {
            return Err(Error::invalid(OP, "missing session id"));
        }
        if version == 0 {
            return Err(Error::invalid(OP, "missing version"));
        }
        if worker_id.is_empty() {
            return Err(Error::invalid(OP, "missing worker id"));
        }
        if tofu_token.is_empty() {
            return Err(Error::invalid(OP, "missing tofu token"));
        }

        // The scope never changes after creation, so it can be read before the transaction.
        let scope_id = self
            .scope_of(session_id)
            .await?
            .ok_or_else(|| Error::not_found(OP, session_id))?;
        let ct_tofu_token = self.kms.encrypt(&scope_id, tofu_token).await?;
        let now = Utc::now();

        let mut tx = self.writer.begin().await?;
        self.begin_transition(&mut tx, OP, session_id, version, SessionStatus::Active, now)
            .await?;

        let worker: Option<(String,)> = sqlx::query_as("SELECT private_id FROM workers WHERE private_id = ?")
            .bind(worker_id)
            .fetch_optional(&mut *tx)
            .await?;
        if worker.is_none() {
            return Err(Error::not_found(OP, worker_id));
        }

        sqlx::query(
            r#"
            UPDATE sessions
            SET worker_id = ?, worker_type = ?, ct_tofu_token = ?
            WHERE public_id = ?
            "#,
        )
        .bind(worker_id)
        .bind(worker_type.as_str())
        .bind(&ct_tofu_token)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        let (row, states) = self
            .finish_transition(&mut tx, OP, session_id, SessionStatus::Active, now)
            .await?;
        tx.commit().await?;

        let session = self.hydrate(row).await?;
        tracing::info!(
            session_id = %session_id,
            worker_id = %worker_id,
            worker_type = %worker_type,
            version = session.version,
            "Activated session"
        );
        Ok((session, states))
    }

    /// Move a `pending` or `active` session to `cancelling`
    ///
    /// Open connections are left alone; the data plane closes them.
    pub async fn cancel_session(&self, session_id: &str, version: u32) -> Result<(Session, Vec<SessionState>)> {
        const OP: &str = "cancel session";
        if session_id.is_empty() {
            return Err(Error::invalid(OP, "missing session id"));
        }
        if version == 0 {
            return Err(Error::invalid(OP, "missing version"));
        }

        let now = Utc::now();
        let mut tx = self.writer.begin().await?;
        let from = self
            .begin_transition(&mut tx, OP, session_id, version, SessionStatus::Cancelling, now)
            .await?;
        let (row, states) = self
            .finish_transition(&mut tx, OP, session_id, SessionStatus::Cancelling, now)
            .await?;
        tx.commit().await?;

        let session = self.hydrate(row).await?;
        tracing::info!(
            session_id = %session_id,
            from = %from,
            version = session.version,
            "Cancelled session"
        );
        Ok((session, states))
    }

    /// Move a `pending`, `active` or `cancelling` session to `terminated`
    ///
    /// Fails with [`Error::OpenConnections`] while any of the session's
    /// connections is not closed.
    pub async fn terminate_session(
        &self,
        session_id: &str,
        version: u32,
        reason: TerminationReason,
    ) -> Result<(Session, Vec<SessionState>)> {
        const OP: &str = "terminate session";
        if session_id.is_empty() {
            return Err(Error::invalid(OP, "missing session id"));
        }
        if version == 0 {
            return Err(Error::invalid(OP, "missing version"));
        }

        let now = Utc::now();
        let mut tx = self.writer.begin().await?;
        self.begin_transition(&mut tx, OP, session_id, version, SessionStatus::Terminated, now)
            .await?;

        let (open,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM connections c
            JOIN connection_states cs
                ON cs.connection_id = c.public_id AND cs.end_time IS NULL
            WHERE c.session_id = ? AND cs.status != ?
            "#,
        )
        .bind(session_id)
        .bind(ConnectionStatus::Closed.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if open > 0 {
            tracing::warn!(session_id = %session_id, open = open, "Refused to terminate session with open connections");
            return Err(Error::OpenConnections {
                session_id: session_id.to_string(),
                open,
            });
        }

        sqlx::query("UPDATE sessions SET termination_reason = ? WHERE public_id = ?")
            .bind(reason.as_str())
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        let (row, states) = self
            .finish_transition(&mut tx, OP, session_id, SessionStatus::Terminated, now)
            .await?;
        tx.commit().await?;

        let session = self.hydrate(row).await?;
        tracing::info!(
            session_id = %session_id,
            reason = %reason,
            version = session.version,
            "Terminated session"
        );
        Ok((session, states))
    }

    /// Hard-delete one session along with its history and connections
    ///
    /// Returns the number of sessions deleted, which is always 1 on success.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize> {
        const OP: &str = "delete session";
        if session_id.is_empty() {
            return Err(Error::invalid(OP, "missing public id"));
        }

        let result = sqlx::query("DELETE FROM sessions WHERE public_id = ?")
            .bind(session_id)
            .execute(&self.writer)
            .await?;

        match result.rows_affected() {
            0 => Err(Error::not_found(OP, session_id)),
            1 => {
                tracing::info!(session_id = %session_id, "Deleted session");
                Ok(1)
            }
            n => Err(Error::InvalidParameter(format!(
                "{}: deleted {} rows for {}",
                OP, n, session_id
            ))),
        }
    }

    // ========== Connection writes ==========

    /// Record a new connection in the `connected` state
    ///
    /// The session must exist; its status is not checked.
    pub async fn connect_session(&self, connect_with: ConnectWith) -> Result<(Connection, ConnectionState)> {
        const OP: &str = "connect session";
        if let Some(problem) = connect_with.validate() {
            return Err(Error::invalid(OP, problem));
        }

        let public_id = id::new_connection_id()?;
        let now = Utc::now();

        let mut tx = self.writer.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO connections (
                public_id, session_id, client_tcp_address, client_tcp_port,
                endpoint_tcp_address, endpoint_tcp_port, version, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(&connect_with.session_id)
        .bind(&connect_with.client_tcp_address)
        .bind(connect_with.client_tcp_port)
        .bind(&connect_with.endpoint_tcp_address)
        .bind(connect_with.endpoint_tcp_port)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;
        match inserted.map_err(Error::from) {
            Ok(_) => {}
            Err(Error::ForeignKeyViolation(_)) => {
                return Err(Error::not_found(OP, &connect_with.session_id));
            }
            Err(e) => return Err(e),
        }

        CONNECTION_STATES
            .insert_initial(&mut tx, &public_id, ConnectionStatus::Connected.as_str(), now)
            .await?;

        let (connection, mut states) = fetch_connection(&mut tx, OP, &public_id).await?;
        tx.commit().await?;

        let state = states
            .pop()
            .ok_or_else(|| Error::not_found(OP, &public_id))?;
        tracing::info!(
            session_id = %connection.session_id,
            connection_id = %connection.public_id,
            client = %format!("{}:{}", connection.client_tcp_address, connection.client_tcp_port),
            "Connected session"
        );
        Ok((connection, state))
    }

    /// Close a batch of connections atomically
    ///
    /// Either every connection in the batch is closed or none is.
    pub async fn close_connections(&self, close_with: &[CloseWith]) -> Result<Vec<CloseConnectionResp>> {
        const OP: &str = "close connections";
        if close_with.is_empty() {
            return Err(Error::invalid(OP, "missing connections"));
        }

        let mut seen = HashSet::with_capacity(close_with.len());
        let mut counters = Vec::with_capacity(close_with.len());
        for item in close_with {
            if item.connection_id.is_empty() {
                return Err(Error::invalid(OP, "missing connection id"));
            }
            if item.connection_version == 0 {
                return Err(Error::invalid(OP, "missing connection version"));
            }
            if !seen.insert(item.connection_id.as_str()) {
                return Err(Error::invalid(
                    OP,
                    &format!("duplicate connection id {}", item.connection_id),
                ));
            }
            let bytes_up = i64::try_from(item.bytes_up)
                .map_err(|_| Error::invalid(OP, "bytes up out of range"))?;
            let bytes_down = i64::try_from(item.bytes_down)
                .map_err(|_| Error::invalid(OP, "bytes down out of range"))?;
            counters.push((bytes_up, bytes_down));
        }

        let now = Utc::now();
        let mut tx = self.writer.begin().await?;
        let mut closed = Vec::with_capacity(close_with.len());
        for (item, (bytes_up, bytes_down)) in close_with.iter().zip(counters) {
            let id = item.connection_id.as_str();
            CONNECTIONS
                .bump(&mut tx, OP, id, item.connection_version, now)
                .await?;

            let current = CONNECTION_STATES
                .current_status(&mut tx, id)
                .await?
                .ok_or_else(|| Error::not_found(OP, id))?;
            if current != ConnectionStatus::Connected.as_str() {
                return Err(Error::InvalidStatusTransition {
                    entity: CONNECTIONS.entity,
                    id: id.to_string(),
                    from: current,
                    to: ConnectionStatus::Closed.to_string(),
                });
            }

            sqlx::query(
                r#"
                UPDATE connections
                SET bytes_up = ?, bytes_down = ?, closed_reason = ?
                WHERE public_id = ?
                "#,
            )
            .bind(bytes_up)
            .bind(bytes_down)
            .bind(item.closed_reason.as_str())
            .bind(id)
            .execute(&mut *tx)
            .await?;

            CONNECTION_STATES
                .append(&mut tx, id, ConnectionStatus::Closed.as_str(), now)
                .await?;

            let (connection, states) = fetch_connection(&mut tx, OP, id).await?;
            closed.push(CloseConnectionResp { connection, states });
        }
        tx.commit().await?;

        tracing::info!(count = closed.len(), "Closed connections");
        Ok(closed)
    }

    // ========== Reads ==========

    /// Get a session and its state history, newest first
    ///
    /// Returns `None` when no session has this id.
    pub async fn lookup_session(&self, session_id: &str) -> Result<Option<(Session, Vec<SessionState>)>> {
        if session_id.is_empty() {
            return Err(Error::invalid("lookup session", "missing public id"));
        }

        // One read transaction so the row and its history come from the same snapshot
        let mut tx = self.reader.begin().await?;
        let Some(row) = fetch_session_row(&mut tx, session_id).await? else {
            tracing::debug!(session_id = %session_id, "Session not found");
            return Ok(None);
        };
        let states = fetch_session_states(&mut tx, session_id).await?;
        tx.commit().await?;

        Ok(Some((self.hydrate(row).await?, states)))
    }

    /// List sessions matching the options
    pub async fn list_sessions(&self, options: &ListOptions) -> Result<Vec<Session>> {
        let limit = options.effective_limit(self.default_limit);

        let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM sessions WHERE 1 = 1", SESSION_COLUMNS));
        if let Some(scope_id) = &options.scope_id {
            query.push(" AND scope_id = ").push_bind(scope_id.as_str());
        }
        if let Some(user_id) = &options.user_id {
            query.push(" AND user_id = ").push_bind(user_id.as_str());
        }
        query.push(" ORDER BY ").push(options.order.sql());
        query.push(" LIMIT ").push_bind(limit);

        let rows: Vec<SessionRow> = query.build_query_as().fetch_all(&self.reader).await?;
        tracing::debug!(count = rows.len(), limit = limit, order = %options.order, "Listed sessions");

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            sessions.push(self.hydrate(row).await?);
        }
        Ok(sessions)
    }

    /// Get a connection and its state history, newest first
    pub async fn lookup_connection(&self, connection_id: &str) -> Result<Option<(Connection, Vec<ConnectionState>)>> {
        if connection_id.is_empty() {
            return Err(Error::invalid("lookup connection", "missing public id"));
        }

        let mut tx = self.reader.begin().await?;
        let row: Option<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM connections WHERE public_id = ?",
            CONNECTION_COLUMNS
        ))
        .bind(connection_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let states = fetch_connection_states(&mut tx, connection_id).await?;
        tx.commit().await?;
        Ok(Some((row.into_connection()?, states)))
    }

    /// List a session's connections in creation order
    pub async fn list_connections(&self, session_id: &str) -> Result<Vec<Connection>> {
        if session_id.is_empty() {
            return Err(Error::invalid("list connections", "missing session id"));
        }

        let rows: Vec<ConnectionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM connections WHERE session_id = ? ORDER BY created_at ASC, rowid ASC",
            CONNECTION_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.reader)
        .await?;

        rows.into_iter().map(|r| r.into_connection()).collect()
    }

    /// Re-derive a session's signing key and check it against the stored public key
    pub async fn derive_session_key(&self, session: &Session) -> Result<SigningKey> {
        if session.public_id.is_empty() {
            return Err(Error::invalid("derive session key", "missing public id"));
        }

        let signing_key = self.signing_key(&session.scope_id, &session.public_id).await?;
        if signing_key.verifying_key().as_bytes().as_slice() != session.public_key.as_slice() {
            return Err(KmsError::KeyMismatch(session.public_id.clone()).into());
        }
        Ok(signing_key)
    }

    // ========== Internals ==========

    /// Bump the version, then check that the current status permits `to`
    async fn begin_transition(
        &self,
        conn: &mut SqliteConnection,
        op: &str,
        session_id: &str,
        version: u32,
        to: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<SessionStatus> {
        SESSIONS.bump(conn, op, session_id, version, now).await?;

        let current = SESSION_STATES
            .current_status(conn, session_id)
            .await?
            .ok_or_else(|| Error::not_found(op, session_id))?;
        let from = SessionStatus::from_str(&current)
            .ok_or_else(|| Error::Parse(format!("unknown session status '{}'", current)))?;

        if !from.can_transition_to(to) {
            tracing::warn!(
                session_id = %session_id,
                from = %from,
                to = %to,
                "Rejected session status transition"
            );
            return Err(Error::InvalidStatusTransition {
                entity: SESSIONS.entity,
                id: session_id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(from)
    }

    /// Append the new status and read the session back inside the transaction
    async fn finish_transition(
        &self,
        conn: &mut SqliteConnection,
        op: &str,
        session_id: &str,
        to: SessionStatus,
        now: DateTime<Utc>,
    ) -> Result<(SessionRow, Vec<SessionState>)> {
        SESSION_STATES.append(conn, session_id, to.as_str(), now).await?;
        fetch_session(conn, op, session_id).await
    }

    async fn scope_of(&self, session_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT scope_id FROM sessions WHERE public_id = ?")
            .bind(session_id)
            .fetch_optional(&self.reader)
            .await?;
        Ok(row.map(|(scope_id,)| scope_id))
    }

    async fn signing_key(&self, scope_id: &str, session_id: &str) -> Result<SigningKey> {
        let purpose = format!("session/{}", session_id);
        let seed = self.kms.derive_key(scope_id, purpose.as_bytes()).await?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Turn a stored row into a session, decrypting the trust token
    async fn hydrate(&self, row: SessionRow) -> Result<Session> {
        let (mut session, ct_tofu_token) = row.into_session()?;
        if let Some(ct) = ct_tofu_token {
            session.tofu_token = Some(self.kms.decrypt(&session.scope_id, &ct).await?);
        }
        Ok(session)
    }
}

async fn fetch_session_row(conn: &mut SqliteConnection, session_id: &str) -> Result<Option<SessionRow>> {
    let row: Option<SessionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM sessions WHERE public_id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

async fn fetch_session_states(conn: &mut SqliteConnection, session_id: &str) -> Result<Vec<SessionState>> {
    let rows: Vec<SessionStateRow> = sqlx::query_as(
        r#"
        SELECT session_id, status, start_time, end_time
        FROM session_states
        WHERE session_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(session_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.into_state()).collect()
}

async fn fetch_session(
    conn: &mut SqliteConnection,
    op: &str,
    session_id: &str,
) -> Result<(SessionRow, Vec<SessionState>)> {
    let row = fetch_session_row(conn, session_id)
        .await?
        .ok_or_else(|| Error::not_found(op, session_id))?;
    let states = fetch_session_states(conn, session_id).await?;
    Ok((row, states))
}

async fn fetch_connection_states(
    conn: &mut SqliteConnection,
    connection_id: &str,
) -> Result<Vec<ConnectionState>> {
    let rows: Vec<ConnectionStateRow> = sqlx::query_as(
        r#"
        SELECT connection_id, status, start_time, end_time
        FROM connection_states
        WHERE connection_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(connection_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.into_state()).collect()
}

async fn fetch_connection(
    conn: &mut SqliteConnection,
    op: &str,
    connection_id: &str,
) -> Result<(Connection, Vec<ConnectionState>)> {
    let row: ConnectionRow = sqlx::query_as(&format!(
        "SELECT {} FROM connections WHERE public_id = ?",
        CONNECTION_COLUMNS
    ))
    .bind(connection_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::not_found(op, connection_id))?;
    let states = fetch_connection_states(conn, connection_id).await?;
    Ok((row.into_connection()?, states))
}

/// Internal row type for database queries
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    public_id: String,
    scope_id: String,
    user_id: String,
    target_id: String,
    host_id: String,
    host_set_id: String,
    auth_token_id: String,
    endpoint: String,
    worker_id: Option<String>,
    worker_type: Option<String>,
    ct_tofu_token: Option<Vec<u8>>,
    key_id: String,
    public_key: Vec<u8>,
    termination_reason: Option<String>,
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    /// Convert to a session, handing back the still-encrypted trust token
    fn into_session(self) -> Result<(Session, Option<Vec<u8>>)> {
        let worker_type = self
            .worker_type
            .map(|t| {
                WorkerType::from_str(&t).ok_or_else(|| Error::Parse(format!("unknown worker type '{}'", t)))
            })
            .transpose()?;
        let termination_reason = self
            .termination_reason
            .map(|r| {
                TerminationReason::from_str(&r)
                    .ok_or_else(|| Error::Parse(format!("unknown termination reason '{}'", r)))
            })
            .transpose()?;

        let session = Session {
            public_id: self.public_id,
            scope_id: self.scope_id,
            user_id: self.user_id,
            target_id: self.target_id,
            host_id: self.host_id,
            host_set_id: self.host_set_id,
            auth_token_id: self.auth_token_id,
            endpoint: self.endpoint,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            termination_reason,
            tofu_token: None,
            worker_id: self.worker_id,
            worker_type,
            key_id: self.key_id,
            public_key: self.public_key,
        };
        Ok((session, self.ct_tofu_token))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionStateRow {
    session_id: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl SessionStateRow {
    fn into_state(self) -> Result<SessionState> {
        let status = SessionStatus::from_str(&self.status)
            .ok_or_else(|| Error::Parse(format!("unknown session status '{}'", self.status)))?;
        Ok(SessionState {
            session_id: self.session_id,
            status,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConnectionRow {
    public_id: String,
    session_id: String,
    client_tcp_address: String,
    client_tcp_port: u16,
    endpoint_tcp_address: String,
    endpoint_tcp_port: u16,
    bytes_up: i64,
    bytes_down: i64,
    closed_reason: Option<String>,
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConnectionRow {
    fn into_connection(self) -> Result<Connection> {
        let closed_reason = self
            .closed_reason
            .map(|r| {
                ClosedReason::from_str(&r).ok_or_else(|| Error::Parse(format!("unknown closed reason '{}'", r)))
            })
            .transpose()?;
        Ok(Connection {
            public_id: self.public_id,
            session_id: self.session_id,
            client_tcp_address: self.client_tcp_address,
            client_tcp_port: self.client_tcp_port,
            endpoint_tcp_address: self.endpoint_tcp_address,
            endpoint_tcp_port: self.endpoint_tcp_port,
            bytes_up: self.bytes_up.max(0) as u64,
            bytes_down: self.bytes_down.max(0) as u64,
            closed_reason,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ConnectionStateRow {
    connection_id: String,
    status: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl ConnectionStateRow {
    fn into_state(self) -> Result<ConnectionState> {
        let status = ConnectionStatus::from_str(&self.status)
            .ok_or_else(|| Error::Parse(format!("unknown connection status '{}'", self.status)))?;
        Ok(ConnectionState {
            connection_id: self.connection_id,
            status,
            start_time: self.start_time,
            end_time: self.end_time,
        })
    }
}
