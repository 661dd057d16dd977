//! Database migrations
//!
//! This module manages SQLite schema migrations for warden.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Workers, sessions and session state history
const MIGRATION_V1: &str = r#"
    -- Worker reference rows; activation binds a session to one of these
    CREATE TABLE IF NOT EXISTS workers (
        private_id TEXT PRIMARY KEY NOT NULL CHECK (length(private_id) > 0),
        type TEXT NOT NULL CHECK (type IN ('worker', 'controller')),
        name TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sessions (
        public_id TEXT PRIMARY KEY NOT NULL CHECK (length(public_id) > 0),
        scope_id TEXT NOT NULL CHECK (length(scope_id) > 0),
        user_id TEXT NOT NULL CHECK (length(user_id) > 0),
        target_id TEXT NOT NULL CHECK (length(target_id) > 0),
        host_id TEXT NOT NULL CHECK (length(host_id) > 0),
        host_set_id TEXT NOT NULL CHECK (length(host_set_id) > 0),
        auth_token_id TEXT NOT NULL CHECK (length(auth_token_id) > 0),
        endpoint TEXT NOT NULL DEFAULT '',
        worker_id TEXT REFERENCES workers(private_id) ON DELETE SET NULL,
        worker_type TEXT CHECK (worker_type IS NULL OR worker_type IN ('worker', 'controller')),
        ct_tofu_token BLOB,
        key_id TEXT NOT NULL,
        public_key BLOB NOT NULL,
        termination_reason TEXT CHECK (termination_reason IS NULL OR termination_reason IN (
            'unknown', 'timed out', 'closed by end-user', 'cancelled',
            'network error', 'system error', 'connection limit'
        )),
        version INTEGER NOT NULL DEFAULT 1 CHECK (version > 0),
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_scope_id ON sessions(scope_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at);

    CREATE TRIGGER IF NOT EXISTS sessions_immutable_columns
    BEFORE UPDATE OF public_id, scope_id, user_id, target_id, host_id, host_set_id,
                     auth_token_id, key_id, public_key, created_at ON sessions
    BEGIN
        SELECT RAISE(ABORT, 'immutable session column');
    END;

    CREATE TRIGGER IF NOT EXISTS sessions_tofu_token_set_once
    BEFORE UPDATE OF ct_tofu_token ON sessions
    WHEN OLD.ct_tofu_token IS NOT NULL
    BEGIN
        SELECT RAISE(ABORT, 'tofu token is immutable once set');
    END;

    -- Append-only status history; the row without end_time is current
    CREATE TABLE IF NOT EXISTS session_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL REFERENCES sessions(public_id) ON DELETE CASCADE,
        status TEXT NOT NULL CHECK (status IN ('pending', 'active', 'cancelling', 'terminated')),
        start_time TIMESTAMP NOT NULL,
        end_time TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_session_states_session_id ON session_states(session_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_session_states_current
        ON session_states(session_id) WHERE end_time IS NULL;

    CREATE TRIGGER IF NOT EXISTS session_states_append_only
    BEFORE UPDATE ON session_states
    WHEN OLD.end_time IS NOT NULL
        OR NEW.session_id IS NOT OLD.session_id
        OR NEW.status IS NOT OLD.status
        OR NEW.start_time IS NOT OLD.start_time
    BEGIN
        SELECT RAISE(ABORT, 'session state history is append-only');
    END;
"#;

/// Migration 2: Connections and connection state history
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS connections (
        public_id TEXT PRIMARY KEY NOT NULL CHECK (length(public_id) > 0),
        session_id TEXT NOT NULL REFERENCES sessions(public_id) ON DELETE CASCADE,
        client_tcp_address TEXT NOT NULL CHECK (length(client_tcp_address) > 0),
        client_tcp_port INTEGER NOT NULL CHECK (client_tcp_port > 0 AND client_tcp_port <= 65535),
        endpoint_tcp_address TEXT NOT NULL CHECK (length(endpoint_tcp_address) > 0),
        endpoint_tcp_port INTEGER NOT NULL CHECK (endpoint_tcp_port > 0 AND endpoint_tcp_port <= 65535),
        bytes_up INTEGER NOT NULL DEFAULT 0 CHECK (bytes_up >= 0),
        bytes_down INTEGER NOT NULL DEFAULT 0 CHECK (bytes_down >= 0),
        closed_reason TEXT CHECK (closed_reason IS NULL OR closed_reason IN (
            'unknown', 'timed out', 'closed by end-user', 'cancelled',
            'network error', 'system error'
        )),
        version INTEGER NOT NULL DEFAULT 1 CHECK (version > 0),
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_connections_session_id ON connections(session_id);

    CREATE TRIGGER IF NOT EXISTS connections_immutable_columns
    BEFORE UPDATE OF public_id, session_id, client_tcp_address, client_tcp_port,
                     endpoint_tcp_address, endpoint_tcp_port, created_at ON connections
    BEGIN
        SELECT RAISE(ABORT, 'immutable connection column');
    END;

    CREATE TABLE IF NOT EXISTS connection_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        connection_id TEXT NOT NULL REFERENCES connections(public_id) ON DELETE CASCADE,
        status TEXT NOT NULL CHECK (status IN ('connected', 'closed')),
        start_time TIMESTAMP NOT NULL,
        end_time TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_connection_states_connection_id ON connection_states(connection_id);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_connection_states_current
        ON connection_states(connection_id) WHERE end_time IS NULL;

    CREATE TRIGGER IF NOT EXISTS connection_states_append_only
    BEFORE UPDATE ON connection_states
    WHEN OLD.end_time IS NOT NULL
        OR NEW.connection_id IS NOT OLD.connection_id
        OR NEW.status IS NOT OLD.status
        OR NEW.start_time IS NOT OLD.start_time
    BEGIN
        SELECT RAISE(ABORT, 'connection state history is append-only');
    END;
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Apply one migration and record it in a single transaction
async fn apply_migration(pool: &SqlitePool, version: i32, sql: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::raw_sql(sql).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Workers, sessions and session states");
        apply_migration(pool, 1, MIGRATION_V1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Connections and connection states");
        apply_migration(pool, 2, MIGRATION_V2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        // Should start with no migrations
        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);
        assert!(needs_migration(&pool).await.unwrap());

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);

        let (applied,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, CURRENT_VERSION as i64);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = vec![
            "workers",
            "sessions",
            "session_states",
            "connections",
            "connection_states",
        ];

        for table in tables {
            let result: (i32,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }
}
