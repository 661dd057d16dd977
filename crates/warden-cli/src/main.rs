//! Warden CLI - operator commands for the session control plane

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use warden_core::config::{Config, KMS_KEY_ENV};
use warden_core::domain::session::{
    ListOptions, Session, SessionOrder, SessionRepository, SessionRepositoryTrait, SessionState,
    SessionStatus, TerminationReason, current_status,
};
use warden_core::domain::worker::{Worker, WorkerRepository, WorkerType};
use warden_core::kms::Kms;
use warden_core::storage::{Database, DatabaseConfig};

#[cfg(test)]
mod main_tests;

#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about = "Session control plane for a remote-access broker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (defaults to database.path from the config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,

    /// Inspect and manage sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Inspect and register workers
    Workers {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List sessions, newest first by default
    List {
        #[arg(long)]
        scope_id: Option<String>,
        #[arg(long)]
        user_id: Option<String>,
        /// Maximum results; negative for unlimited
        #[arg(short, long, allow_negative_numbers = true)]
        limit: Option<i64>,
        /// "create_time asc" or "create_time desc"
        #[arg(long)]
        order: Option<SessionOrder>,
    },
    /// Show a session with its history and connections
    Show { id: String },
    /// Cancel a pending or active session
    Cancel {
        id: String,
        /// Version the session was read at
        #[arg(long)]
        version: u32,
    },
    /// Terminate a session with no open connections
    Terminate {
        id: String,
        #[arg(long)]
        version: u32,
        #[arg(long, default_value = "unknown", value_parser = parse_reason)]
        reason: TerminationReason,
    },
    /// Delete a session and everything it owns
    Delete { id: String },
}

#[derive(Subcommand)]
enum WorkerAction {
    /// List registered workers
    List,
    /// Register or refresh a worker
    Register {
        id: String,
        #[arg(long = "type", default_value = "worker", value_parser = parse_worker_type)]
        worker_type: WorkerType,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        address: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

fn parse_reason(s: &str) -> Result<TerminationReason, String> {
    TerminationReason::from_str(s).ok_or_else(|| format!("unknown termination reason '{}'", s))
}

fn parse_worker_type(s: &str) -> Result<WorkerType, String> {
    WorkerType::from_str(s).ok_or_else(|| format!("unknown worker type '{}'", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A broken config file must not stop `config reset` from running
    let config = Config::load();
    let filter = config
        .as_ref()
        .map(|c| c.logging.filter.clone())
        .unwrap_or_else(|_| "warden_core=info".to_string());

    // Initialize tracing; RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Migrate => cmd_migrate(&config?, cli.database, cli.quiet).await,
        Commands::Sessions { action } => {
            let config = config?;
            let db = open_database(&config, cli.database).await?;
            let repo = session_repository(&config, &db)?;
            cmd_sessions(repo.as_ref(), action, cli.format, cli.quiet).await
        }
        Commands::Workers { action } => {
            let db = open_database(&config?, cli.database).await?;
            cmd_workers(&db, action, cli.format, cli.quiet).await
        }
        Commands::Config { action } => cmd_config(action, cli.quiet),
        Commands::Doctor => cmd_doctor(cli.database, cli.quiet).await,
    };

    if let Err(e) = &result {
        if let Some(err) = e.downcast_ref::<warden_core::Error>() {
            eprintln!("Error [{}]: {}", err.code(), err);
            if let Some(suggestion) = err.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
    result
}

fn database_config(config: &Config, path: Option<PathBuf>) -> DatabaseConfig {
    let mut db_config = config.database_config();
    if let Some(path) = path {
        db_config.path = path;
    }
    db_config
}

async fn open_database(config: &Config, path: Option<PathBuf>) -> anyhow::Result<Database> {
    Database::new(database_config(config, path))
        .await
        .context("Failed to open database")
}

fn session_repository(config: &Config, db: &Database) -> anyhow::Result<Arc<dyn SessionRepositoryTrait>> {
    let kms = config.kms.local_kms()?;
    let repo = SessionRepository::from_database(db, Arc::new(kms), config.repository_options())?;
    Ok(Arc::new(repo))
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_migrate(config: &Config, path: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    let db = Database::new(database_config(config, path).no_migrate())
        .await
        .context("Failed to open database")?;

    let before = db.migration_status().await?;
    if !before.needs_migration {
        if !quiet {
            println!("Database is up to date (schema v{}).", before.current_version);
        }
        return Ok(());
    }

    db.migrate().await?;
    let after = db.migration_status().await?;
    if !quiet {
        println!(
            "Migrated {} from schema v{} to v{}.",
            db.path().display(),
            before.current_version,
            after.current_version
        );
    }
    db.close().await;
    Ok(())
}

async fn cmd_sessions(
    repo: &dyn SessionRepositoryTrait,
    action: SessionAction,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match action {
        SessionAction::List {
            scope_id,
            user_id,
            limit,
            order,
        } => {
            let mut options = ListOptions::new().with_order(order.unwrap_or_default());
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            if let Some(scope_id) = scope_id {
                options = options.with_scope_id(scope_id);
            }
            if let Some(user_id) = user_id {
                options = options.with_user_id(user_id);
            }

            let sessions = repo.list_sessions(&options).await?;
            let mut listed = Vec::with_capacity(sessions.len());
            for session in sessions {
                let status = repo
                    .lookup_session(&session.public_id)
                    .await?
                    .and_then(|(_, states)| current_status(&states));
                listed.push((session, status));
            }

            match format {
                OutputFormat::Json => {
                    let values: Vec<_> = listed
                        .iter()
                        .map(|(session, status)| {
                            serde_json::json!({ "session": session, "status": status })
                        })
                        .collect();
                    print_json(&values)?;
                }
                OutputFormat::Text => {
                    if listed.is_empty() {
                        if !quiet {
                            println!("No sessions found.");
                        }
                        return Ok(());
                    }
                    if !quiet {
                        println!(
                            "{:<14} {:<11} {:>7} {:<16} {:<16} CREATED",
                            "ID", "STATUS", "VERSION", "USER", "SCOPE"
                        );
                    }
                    for (session, status) in &listed {
                        println!(
                            "{:<14} {:<11} {:>7} {:<16} {:<16} {}",
                            session.public_id,
                            status.map(|s| s.as_str()).unwrap_or("-"),
                            session.version,
                            session.user_id,
                            session.scope_id,
                            format_time(&session.created_at)
                        );
                    }
                }
            }
        }

        SessionAction::Show { id } => {
            let (session, states) = repo
                .lookup_session(&id)
                .await?
                .ok_or_else(|| warden_core::Error::RecordNotFound(format!("show session: {}", id)))?;
            let connections = repo.list_connections(&id).await?;

            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "session": session,
                    "states": states,
                    "connections": connections,
                }))?,
                OutputFormat::Text => {
                    print_session(&session, &states);
                    if !connections.is_empty() {
                        println!("  Connections:");
                        for c in &connections {
                            println!(
                                "    {} {}:{} -> {}:{} up={} down={} {}",
                                c.public_id,
                                c.client_tcp_address,
                                c.client_tcp_port,
                                c.endpoint_tcp_address,
                                c.endpoint_tcp_port,
                                c.bytes_up,
                                c.bytes_down,
                                c.closed_reason.map(|r| r.as_str()).unwrap_or("open")
                            );
                        }
                    }
                }
            }
        }

        SessionAction::Cancel { id, version } => {
            let (session, states) = repo.cancel_session(&id, version).await?;
            report_transition(&session, &states, format, quiet)?;
        }

        SessionAction::Terminate {
            id,
            version,
            reason,
        } => {
            let (session, states) = repo.terminate_session(&id, version, reason).await?;
            report_transition(&session, &states, format, quiet)?;
        }

        SessionAction::Delete { id } => {
            let deleted = repo.delete_session(&id).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({ "deleted": deleted }))?,
                OutputFormat::Text => {
                    if !quiet {
                        println!("Deleted session {}.", id);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_session(session: &Session, states: &[SessionState]) {
    println!("Session {}", session.public_id);
    println!(
        "  Status: {}",
        current_status(states).map(|s| s.as_str()).unwrap_or("-")
    );
    println!("  Version: {}", session.version);
    println!("  Scope: {}", session.scope_id);
    println!("  User: {}", session.user_id);
    println!("  Target: {} (host {}, host set {})", session.target_id, session.host_id, session.host_set_id);
    if !session.endpoint.is_empty() {
        println!("  Endpoint: {}", session.endpoint);
    }
    if let Some(worker_id) = &session.worker_id {
        println!(
            "  Worker: {} ({})",
            worker_id,
            session.worker_type.map(|t| t.as_str()).unwrap_or("-")
        );
    }
    if let Some(reason) = session.termination_reason {
        println!("  Termination reason: {}", reason);
    }
    println!("  Public key: {}", hex::encode(&session.public_key));
    println!("  Created: {}", format_time(&session.created_at));
    println!("  History:");
    for state in states {
        let end = state
            .end_time
            .as_ref()
            .map(format_time)
            .unwrap_or_else(|| "current".to_string());
        println!("    {:<11} {} .. {}", state.status.as_str(), format_time(&state.start_time), end);
    }
}

fn report_transition(
    session: &Session,
    states: &[SessionState],
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "session": session, "states": states })),
        OutputFormat::Text => {
            if !quiet {
                let status = current_status(states).unwrap_or(SessionStatus::Pending);
                println!(
                    "Session {} is now {} (version {}).",
                    session.public_id, status, session.version
                );
            }
            Ok(())
        }
    }
}

async fn cmd_workers(db: &Database, action: WorkerAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let repo = WorkerRepository::new(db.pool().clone());
    match action {
        WorkerAction::List => {
            let workers = repo.list().await?;
            match format {
                OutputFormat::Json => print_json(&workers)?,
                OutputFormat::Text => {
                    if workers.is_empty() {
                        if !quiet {
                            println!("No workers registered.");
                        }
                        return Ok(());
                    }
                    for w in &workers {
                        println!(
                            "{:<16} {:<10} {:<16} {}",
                            w.private_id,
                            w.worker_type.as_str(),
                            w.name,
                            w.address
                        );
                    }
                }
            }
        }
        WorkerAction::Register {
            id,
            worker_type,
            name,
            address,
        } => {
            let worker = repo
                .upsert(&Worker::new(id, worker_type).with_name(name).with_address(address))
                .await?;
            match format {
                OutputFormat::Json => print_json(&worker)?,
                OutputFormat::Text => {
                    if !quiet {
                        println!("Registered {} {}.", worker.worker_type, worker.private_id);
                    }
                }
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Warden Health Check");
        println!("===================");
        println!();
    }

    let mut all_ok = true;

    // Check configuration
    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            Config::default()
        }
    };

    // Check kms master key
    match config.kms.local_kms() {
        Ok(kms) => {
            if !quiet {
                println!("[OK] Kms: Configured ({})", kms.key_id());
            }
        }
        Err(e) => {
            all_ok = false;
            warn!(error = %e, "Kms master key unavailable");
            if !quiet {
                println!("[!!] Kms: {}", e);
                println!("     Set {} to a base64-encoded 32-byte key", KMS_KEY_ENV);
            }
        }
    }

    // Check config file location
    if !quiet {
        match Config::config_path() {
            Ok(path) => {
                if path.exists() {
                    println!("[OK] Config file: {}", path.display());
                } else {
                    println!("[--] Config file: {} (using defaults)", path.display());
                }
            }
            Err(e) => {
                println!("[!!] Config file: Error - {}", e);
            }
        }
    }

    // Check database
    match open_database(&config, database).await {
        Ok(db) => match db.health_check().await {
            Ok(()) => {
                if !quiet {
                    println!("[OK] Database: Connected");
                    println!("     Path: {}", db.path().display());
                }
                match db.migration_status().await {
                    Ok(status) if status.needs_migration => {
                        all_ok = false;
                        if !quiet {
                            println!(
                                "[!!] Database: Migrations pending (v{} -> v{})",
                                status.current_version, status.target_version
                            );
                        }
                    }
                    Ok(status) => {
                        if !quiet {
                            println!("[OK] Database: Schema v{}", status.current_version);
                        }
                    }
                    Err(e) => {
                        all_ok = false;
                        if !quiet {
                            println!("[!!] Database: Migration check failed - {}", e);
                        }
                    }
                }

                let workers = WorkerRepository::new(db.pool().clone())
                    .list()
                    .await
                    .map(|w| w.len())
                    .unwrap_or_default();
                if !quiet {
                    println!("     Workers: {}", workers);
                }
                db.close().await;
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
        },
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {:#}", e);
            }
        }
    }

    // Summary
    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}
