//! CLI tests

use crate::{Cli, Commands, ConfigAction, OutputFormat, SessionAction, WorkerAction};
use clap::{CommandFactory, Parser};
use warden_core::domain::session::{SessionOrder, TerminationReason};
use warden_core::domain::worker::WorkerType;

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn test_global_flags_default() {
    let cli = Cli::try_parse_from(["warden", "migrate"]).unwrap();
    assert!(matches!(cli.command, Commands::Migrate));
    assert_eq!(cli.format, OutputFormat::Text);
    assert!(!cli.quiet);
    assert!(cli.database.is_none());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "warden",
        "sessions",
        "list",
        "--format",
        "json",
        "--database",
        "/tmp/warden.db",
        "-q",
    ])
    .unwrap();
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(cli.quiet);
    assert_eq!(cli.database.unwrap().to_str(), Some("/tmp/warden.db"));
}

#[test]
fn test_sessions_list_filters() {
    let cli = Cli::try_parse_from([
        "warden",
        "sessions",
        "list",
        "--scope-id",
        "p_prod000001",
        "--user-id",
        "u_alice00001",
        "--limit",
        "-1",
        "--order",
        "create_time asc",
    ])
    .unwrap();
    match cli.command {
        Commands::Sessions {
            action:
                SessionAction::List {
                    scope_id,
                    user_id,
                    limit,
                    order,
                },
        } => {
            assert_eq!(scope_id.as_deref(), Some("p_prod000001"));
            assert_eq!(user_id.as_deref(), Some("u_alice00001"));
            assert_eq!(limit, Some(-1));
            assert_eq!(order, Some(SessionOrder::CreatedAsc));
        }
        _ => panic!("expected sessions list"),
    }
}

#[test]
fn test_sessions_list_rejects_unknown_order() {
    assert!(Cli::try_parse_from(["warden", "sessions", "list", "--order", "name"]).is_err());
}

#[test]
fn test_sessions_terminate_reason() {
    let cli = Cli::try_parse_from([
        "warden",
        "sessions",
        "terminate",
        "s_1234567890",
        "--version",
        "3",
        "--reason",
        "timed-out",
    ])
    .unwrap();
    match cli.command {
        Commands::Sessions {
            action: SessionAction::Terminate { id, version, reason },
        } => {
            assert_eq!(id, "s_1234567890");
            assert_eq!(version, 3);
            assert_eq!(reason, TerminationReason::TimedOut);
        }
        _ => panic!("expected sessions terminate"),
    }

    let cli = Cli::try_parse_from([
        "warden",
        "sessions",
        "terminate",
        "s_1234567890",
        "--version",
        "3",
    ])
    .unwrap();
    match cli.command {
        Commands::Sessions {
            action: SessionAction::Terminate { reason, .. },
        } => assert_eq!(reason, TerminationReason::Unknown),
        _ => panic!("expected sessions terminate"),
    }
}

#[test]
fn test_sessions_cancel_requires_version() {
    assert!(Cli::try_parse_from(["warden", "sessions", "cancel", "s_1234567890"]).is_err());
    assert!(
        Cli::try_parse_from(["warden", "sessions", "cancel", "s_1234567890", "--version", "x"])
            .is_err()
    );
}

#[test]
fn test_workers_register() {
    let cli = Cli::try_parse_from([
        "warden",
        "workers",
        "register",
        "w_edge000001",
        "--type",
        "controller",
        "--address",
        "10.1.0.4:9202",
    ])
    .unwrap();
    match cli.command {
        Commands::Workers {
            action:
                WorkerAction::Register {
                    id,
                    worker_type,
                    name,
                    address,
                },
        } => {
            assert_eq!(id, "w_edge000001");
            assert_eq!(worker_type, WorkerType::Controller);
            assert_eq!(name, "");
            assert_eq!(address, "10.1.0.4:9202");
        }
        _ => panic!("expected workers register"),
    }

    assert!(Cli::try_parse_from(["warden", "workers", "register", "w_1", "--type", "gateway"]).is_err());
}

#[test]
fn test_config_set() {
    let cli = Cli::try_parse_from(["warden", "config", "set", "logging.filter", "warden_core=debug"])
        .unwrap();
    match cli.command {
        Commands::Config {
            action: ConfigAction::Set { key, value },
        } => {
            assert_eq!(key, "logging.filter");
            assert_eq!(value, "warden_core=debug");
        }
        _ => panic!("expected config set"),
    }
}
