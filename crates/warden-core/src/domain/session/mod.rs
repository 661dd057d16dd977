//! Session domain module
//!
//! Tracks the lifecycle of sessions and of the connections proxied inside
//! them.
//!
//! # Architecture
//!
//! - **Entities**: `Session`, `SessionState`, `Connection`, `ConnectionState`
//! - **Repository**: `SessionRepository` for transactional, version-checked writes
//!
//! # Lifecycle
//!
//! - `pending` to `active` (a worker claims it) or `cancelling`
//! - `active` to `cancelling` or `terminated`
//! - `cancelling` to `terminated`
//! - connections go from `connected` to `closed`
//!
//! Every write names the version it expects; a stale version fails with
//! [`Error::VersionMismatch`](crate::Error::VersionMismatch) and the caller re-reads.
//!
//! # Example
//!
//! ```ignore
//! use warden_core::domain::session::{ComposedOf, Session, SessionRepository};
//!
//! let (session, _state, signing_key) = repo
//!     .create_session(Session::new(composed_of, "tcp://10.0.0.5:22"))
//!     .await?;
//!
//! // A worker claims the session
//! let (session, history) = repo
//!     .activate_session(&session.public_id, session.version, worker_id, WorkerType::Worker, &token)
//!     .await?;
//! ```

pub mod connection;
pub mod options;
pub mod repository;
pub mod repository_trait;
pub mod session;
pub mod state;

// Re-export main types
pub use connection::{
    CloseConnectionResp, CloseWith, ClosedReason, ConnectWith, Connection, ConnectionState,
    ConnectionStatus,
};
pub use options::{DEFAULT_LIST_LIMIT, ListOptions, RepositoryOptions, SessionOrder};
pub use repository::SessionRepository;
pub use repository_trait::SessionRepositoryTrait;
pub use session::{ComposedOf, Session, SessionStatus, TerminationReason};
pub use state::{SessionState, current_status};
