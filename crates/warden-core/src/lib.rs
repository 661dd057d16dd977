//! Warden Core Library
//!
//! This crate provides the control-plane core of a remote-access broker:
//! - Sessions and their lifecycle (pending, active, cancelling, terminated)
//! - Connections proxied inside a session and their byte counters
//! - Optimistic concurrency on every write through version counters
//! - Trust-on-first-use tokens binding a worker to a session
//! - Storage (SQLite with versioned migrations)
//! - A kms seam for encryption at rest and session signing keys

pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod kms;
pub mod storage;

#[cfg(test)]
mod error_tests;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::session::{
        CloseWith, ClosedReason, ComposedOf, ConnectWith, Connection, ListOptions,
        RepositoryOptions, Session, SessionOrder, SessionRepository, SessionRepositoryTrait,
        SessionState, SessionStatus, TerminationReason,
    };
    pub use crate::domain::worker::{Worker, WorkerRepository, WorkerType};
    pub use crate::error::{Error, Result};
    pub use crate::kms::{Kms, LocalKms};
    pub use crate::storage::{Database, DatabaseConfig};
}
