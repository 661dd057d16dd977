//! Storage layer - SQLite via sqlx
//!
//! Provides database management, migrations, and the version-gated write
//! helpers the repositories build on.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//! - `writer`: Compare-and-increment of version columns and append-only history rows
//!
//! # Usage
//!
//! ```ignore
//! use warden_core::storage::{Database, DatabaseConfig};
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//!
//! // Or open a file database with a custom pool size
//! let db = Database::new(DatabaseConfig::with_path("/var/lib/warden/warden.db").max_connections(8)).await?;
//! ```

pub mod database;
pub mod migrations;
pub(crate) mod writer;

// Re-export commonly used types
pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};
