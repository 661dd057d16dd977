//! CLI integration tests for warden
//!
//! Tests the warden CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use warden_core::domain::session::{ComposedOf, RepositoryOptions, Session, SessionRepository};
use warden_core::domain::worker::{Worker, WorkerRepository, WorkerType};
use warden_core::kms::LocalKms;
use warden_core::storage::{Database, DatabaseConfig};

/// 32 zero bytes
const TEST_KMS_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("warden.db")
    }

    /// Command isolated to this environment's config dir and database
    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("warden").unwrap();
        cmd.env("WARDEN_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env("WARDEN_KMS_KEY", TEST_KMS_KEY);
        cmd.env_remove("RUST_LOG");
        cmd.arg("--database").arg(self.db_path());
        cmd
    }
}

/// Create one activated session directly through the library
async fn seed_active_session(db_path: &Path) -> String {
    let db = Database::new(DatabaseConfig::with_path(db_path)).await.unwrap();
    WorkerRepository::new(db.pool().clone())
        .upsert(&Worker::new("w_edge000001", WorkerType::Worker))
        .await
        .unwrap();

    let kms = LocalKms::from_base64(TEST_KMS_KEY).unwrap();
    let repo = SessionRepository::from_database(&db, Arc::new(kms), RepositoryOptions::default()).unwrap();
    let composed_of = ComposedOf {
        user_id: "u_alice00001".to_string(),
        host_id: "h_db00000001".to_string(),
        target_id: "t_psql000001".to_string(),
        host_set_id: "hs_prod00001".to_string(),
        auth_token_id: "at_0000000001".to_string(),
        scope_id: "p_prod000001".to_string(),
    };
    let (session, _, _) = repo
        .create_session(Session::new(composed_of, "tcp://10.1.2.3:5432"))
        .await
        .unwrap();
    repo.activate_session(&session.public_id, 1, "w_edge000001", WorkerType::Worker, b"tofu")
        .await
        .unwrap();
    db.close().await;
    session.public_id
}

#[test]
fn test_help_command() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("workers"));
}

#[test]
fn test_version_output() {
    let env = TestEnv::new();
    env.cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("warden"));
}

#[test]
fn test_migrate_fresh_database() {
    let env = TestEnv::new();
    env.cmd()
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Migrated"));
    assert!(env.db_path().exists());

    env.cmd()
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
}

#[test]
fn test_sessions_list_empty() {
    let env = TestEnv::new();
    env.cmd()
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sessions found."));

    env.cmd()
        .args(["sessions", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_sessions_require_kms_key() {
    let env = TestEnv::new();
    env.cmd()
        .env_remove("WARDEN_KMS_KEY")
        .args(["sessions", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("WARDEN_KMS_KEY is not set"));
}

#[test]
fn test_sessions_show_missing() {
    let env = TestEnv::new();
    env.cmd()
        .args(["sessions", "show", "s_0000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E300"))
        .stderr(predicate::str::contains("record not found"));
}

#[tokio::test]
async fn test_sessions_lifecycle_through_cli() {
    let env = TestEnv::new();
    let id = seed_active_session(&env.db_path()).await;

    env.cmd()
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("active"));

    env.cmd()
        .args(["sessions", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: active"))
        .stdout(predicate::str::contains("Worker: w_edge000001 (worker)"));

    env.cmd()
        .args(["sessions", "cancel", &id, "--version", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now cancelling (version 3)"));

    // Same read version again is stale
    env.cmd()
        .args(["sessions", "cancel", &id, "--version", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E200"));

    env.cmd()
        .args(["sessions", "terminate", &id, "--version", "3", "--reason", "closed by end-user"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is now terminated (version 4)"));

    env.cmd()
        .args(["sessions", "show", &id, "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"termination_reason\": \"closed by end-user\""));

    env.cmd()
        .args(["sessions", "delete", &id, "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleted\": 1"));

    env.cmd()
        .args(["sessions", "delete", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E300"));
}

#[test]
fn test_workers_register_and_list() {
    let env = TestEnv::new();
    env.cmd()
        .args(["workers", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No workers registered."));

    env.cmd()
        .args(["workers", "register", "w_edge000001", "--address", "10.1.0.4:9202"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Registered worker w_edge000001."));

    env.cmd()
        .args(["workers", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("w_edge000001"))
        .stdout(predicate::str::contains("10.1.0.4:9202"));
}

#[test]
fn test_config_set_and_get() {
    let env = TestEnv::new();
    env.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));

    env.cmd()
        .args(["config", "set", "sessions.default_list_limit", "50"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set sessions.default_list_limit = 50"));

    env.cmd()
        .args(["config", "get", "sessions.default_list_limit"])
        .assert()
        .success()
        .stdout(predicate::str::diff("50\n"));

    env.cmd()
        .args(["config", "set", "kms.master_key", "secret"])
        .assert()
        .failure();
}

#[test]
fn test_doctor_command() {
    let env = TestEnv::new();
    env.cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("Warden Health Check"))
        .stdout(predicate::str::contains("[OK] Kms"))
        .stdout(predicate::str::contains("[OK] Database: Connected"));
}
