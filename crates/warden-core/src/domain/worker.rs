//! Worker reference rows
//!
//! Workers report themselves through the status layer; the session core only
//! reads these rows to check that an activating worker exists.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;

/// Kind of process a session is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Worker,
    Controller,
}

impl WorkerType {
    /// Create from string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "worker" => Some(Self::Worker),
            "controller" => Some(Self::Controller),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Controller => "controller",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered worker or controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub private_id: String,
    pub worker_type: WorkerType,
    pub name: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(private_id: impl Into<String>, worker_type: WorkerType) -> Self {
        let now = Utc::now();
        Self {
            private_id: private_id.into(),
            worker_type,
            name: String::new(),
            address: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }
}

/// Repository for worker reference rows
#[derive(Debug, Clone)]
pub struct WorkerRepository {
    pool: SqlitePool,
}

impl WorkerRepository {
    /// Create a new repository with the given database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a worker or refresh its type, name, and address
    pub async fn upsert(&self, worker: &Worker) -> Result<Worker> {
        if worker.private_id.is_empty() {
            return Err(Error::invalid("upsert worker", "missing private id"));
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO workers (private_id, type, name, address, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(private_id) DO UPDATE SET
                type = excluded.type,
                name = excluded.name,
                address = excluded.address,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&worker.private_id)
        .bind(worker.worker_type.as_str())
        .bind(&worker.name)
        .bind(&worker.address)
        .bind(worker.created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(worker_id = %worker.private_id, worker_type = %worker.worker_type, "Upserted worker");

        self.lookup(&worker.private_id)
            .await?
            .ok_or_else(|| Error::not_found("upsert worker", &worker.private_id))
    }

    /// Get a worker by private id
    pub async fn lookup(&self, private_id: &str) -> Result<Option<Worker>> {
        if private_id.is_empty() {
            return Err(Error::invalid("lookup worker", "missing private id"));
        }

        let row: Option<WorkerRow> = sqlx::query_as(
            r#"
            SELECT private_id, type, name, address, created_at, updated_at
            FROM workers
            WHERE private_id = ?
            "#,
        )
        .bind(private_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_worker()).transpose()
    }

    /// List all workers, ordered by id
    pub async fn list(&self) -> Result<Vec<Worker>> {
        let rows: Vec<WorkerRow> = sqlx::query_as(
            r#"
            SELECT private_id, type, name, address, created_at, updated_at
            FROM workers
            ORDER BY private_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_worker()).collect()
    }
}

/// Internal row type for database queries
#[derive(Debug, sqlx::FromRow)]
struct WorkerRow {
    private_id: String,
    #[sqlx(rename = "type")]
    worker_type: String,
    name: String,
    address: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkerRow {
    fn into_worker(self) -> Result<Worker> {
        let worker_type = WorkerType::from_str(&self.worker_type)
            .ok_or_else(|| Error::Parse(format!("unknown worker type '{}'", self.worker_type)))?;
        Ok(Worker {
            private_id: self.private_id,
            worker_type,
            name: self.name,
            address: self.address,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn create_test_repo() -> WorkerRepository {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        WorkerRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let repo = create_test_repo().await;
        let worker = Worker::new("w_1234567890", WorkerType::Worker)
            .with_name("edge-1")
            .with_address("10.0.0.1:9202");

        let saved = repo.upsert(&worker).await.unwrap();
        assert_eq!(saved.private_id, "w_1234567890");
        assert_eq!(saved.name, "edge-1");

        let found = repo.lookup("w_1234567890").await.unwrap().unwrap();
        assert_eq!(found.address, "10.0.0.1:9202");
        assert_eq!(found.worker_type, WorkerType::Worker);
    }

    #[tokio::test]
    async fn test_upsert_refreshes_existing() {
        let repo = create_test_repo().await;
        let worker = Worker::new("w_1234567890", WorkerType::Worker).with_address("10.0.0.1:9202");
        let first = repo.upsert(&worker).await.unwrap();

        let moved = worker.clone().with_address("10.0.0.2:9202");
        let second = repo.upsert(&moved).await.unwrap();

        assert_eq!(second.address, "10.0.0.2:9202");
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let repo = create_test_repo().await;
        assert!(repo.lookup("w_nope").await.unwrap().is_none());
        assert!(matches!(
            repo.lookup("").await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn test_list_ordered() {
        let repo = create_test_repo().await;
        repo.upsert(&Worker::new("w_b", WorkerType::Worker)).await.unwrap();
        repo.upsert(&Worker::new("w_a", WorkerType::Controller)).await.unwrap();

        let workers = repo.list().await.unwrap();
        let ids: Vec<_> = workers.iter().map(|w| w.private_id.as_str()).collect();
        assert_eq!(ids, vec!["w_a", "w_b"]);
    }
}
