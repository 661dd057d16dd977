//! Repository trait for session persistence
//!
//! Abstracts the session lifecycle operations so callers such as the CLI
//! can work against a trait object.

use async_trait::async_trait;
use ed25519_dalek::SigningKey;

use crate::domain::worker::WorkerType;
use crate::error::Result;

use super::connection::{CloseConnectionResp, CloseWith, ConnectWith, Connection, ConnectionState};
use super::options::ListOptions;
use super::repository::SessionRepository;
use super::session::{Session, TerminationReason};
use super::state::SessionState;

/// Session lifecycle operations
#[async_trait]
pub trait SessionRepositoryTrait: Send + Sync {
    // ========== Sessions ==========

    /// Persist a new pending session, returning it with its signing key
    async fn create_session(&self, session: Session) -> Result<(Session, SessionState, SigningKey)>;

    /// Get a session and its history, newest first
    async fn lookup_session(&self, session_id: &str) -> Result<Option<(Session, Vec<SessionState>)>>;

    /// List sessions matching the options
    async fn list_sessions(&self, options: &ListOptions) -> Result<Vec<Session>>;

    /// Bind a pending session to a worker
    async fn activate_session(
        &self,
        session_id: &str,
        version: u32,
        worker_id: &str,
        worker_type: WorkerType,
        tofu_token: &[u8],
    ) -> Result<(Session, Vec<SessionState>)>;

    /// Request cancellation of a pending or active session
    async fn cancel_session(&self, session_id: &str, version: u32) -> Result<(Session, Vec<SessionState>)>;

    /// End a session that has no open connections
    async fn terminate_session(
        &self,
        session_id: &str,
        version: u32,
        reason: TerminationReason,
    ) -> Result<(Session, Vec<SessionState>)>;

    /// Hard-delete a session
    async fn delete_session(&self, session_id: &str) -> Result<usize>;

    // ========== Connections ==========

    /// Record a new connection
    async fn connect_session(&self, connect_with: ConnectWith) -> Result<(Connection, ConnectionState)>;

    /// Close a batch of connections atomically
    async fn close_connections(&self, close_with: &[CloseWith]) -> Result<Vec<CloseConnectionResp>>;

    /// Get a connection and its history, newest first
    async fn lookup_connection(&self, connection_id: &str) -> Result<Option<(Connection, Vec<ConnectionState>)>>;

    /// List a session's connections in creation order
    async fn list_connections(&self, session_id: &str) -> Result<Vec<Connection>>;
}

#[async_trait]
impl SessionRepositoryTrait for SessionRepository {
    async fn create_session(&self, session: Session) -> Result<(Session, SessionState, SigningKey)> {
        SessionRepository::create_session(self, session).await
    }

    async fn lookup_session(&self, session_id: &str) -> Result<Option<(Session, Vec<SessionState>)>> {
        SessionRepository::lookup_session(self, session_id).await
    }

    async fn list_sessions(&self, options: &ListOptions) -> Result<Vec<Session>> {
        SessionRepository::list_sessions(self, options).await
    }

    async fn activate_session(
        &self,
        session_id: &str,
        version: u32,
        worker_id: &str,
        worker_type: WorkerType,
        tofu_token: &[u8],
    ) -> Result<(Session, Vec<SessionState>)> {
        SessionRepository::activate_session(self, session_id, version, worker_id, worker_type, tofu_token).await
    }

    async fn cancel_session(&self, session_id: &str, version: u32) -> Result<(Session, Vec<SessionState>)> {
        SessionRepository::cancel_session(self, session_id, version).await
    }

    async fn terminate_session(
        &self,
        session_id: &str,
        version: u32,
        reason: TerminationReason,
    ) -> Result<(Session, Vec<SessionState>)> {
        SessionRepository::terminate_session(self, session_id, version, reason).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize> {
        SessionRepository::delete_session(self, session_id).await
    }

    async fn connect_session(&self, connect_with: ConnectWith) -> Result<(Connection, ConnectionState)> {
        SessionRepository::connect_session(self, connect_with).await
    }

    async fn close_connections(&self, close_with: &[CloseWith]) -> Result<Vec<CloseConnectionResp>> {
        SessionRepository::close_connections(self, close_with).await
    }

    async fn lookup_connection(&self, connection_id: &str) -> Result<Option<(Connection, Vec<ConnectionState>)>> {
        SessionRepository::lookup_connection(self, connection_id).await
    }

    async fn list_connections(&self, session_id: &str) -> Result<Vec<Connection>> {
        SessionRepository::list_connections(self, session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::options::RepositoryOptions;
    use crate::domain::session::session::ComposedOf;
    use crate::kms::LocalKms;
    use crate::storage::Database;
    use std::sync::Arc;

    // Verify trait is object-safe
    fn _assert_object_safe(_: &dyn SessionRepositoryTrait) {}

    #[tokio::test]
    async fn test_trait_object_dispatch() {
        let db = Database::in_memory().await.unwrap();
        let repo: Arc<dyn SessionRepositoryTrait> = Arc::new(
            SessionRepository::from_database(&db, Arc::new(LocalKms::generate()), RepositoryOptions::default())
                .unwrap(),
        );

        let composed_of = ComposedOf {
            user_id: "u_1234567890".to_string(),
            host_id: "h_1234567890".to_string(),
            target_id: "t_1234567890".to_string(),
            host_set_id: "hs_1234567890".to_string(),
            auth_token_id: "at_1234567890".to_string(),
            scope_id: "o_1234567890".to_string(),
        };
        let (session, _, _) = repo
            .create_session(Session::new(composed_of, ""))
            .await
            .unwrap();

        let listed = repo.list_sessions(&ListOptions::new()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(repo.delete_session(&session.public_id).await.unwrap(), 1);
    }
}
