//! Tests for the remaining subcommands.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use clap_complete::Shell;

#[test]
fn cli_parse_status() {
    assert!(matches!(parse(&["vodq", "status"]), CliCommand::Status));
}

#[test]
fn cli_parse_remove() {
    match parse(&["vodq", "remove", "99"]) {
        CliCommand::Remove { id } => assert_eq!(id, 99),
        _ => panic!("expected Remove"),
    }
}

#[test]
fn cli_parse_reorder() {
    match parse(&["vodq", "reorder", "3", "1", "2"]) {
        CliCommand::Reorder { ids } => assert_eq!(ids, vec![3, 1, 2]),
        _ => panic!("expected Reorder"),
    }
    assert!(Cli::try_parse_from(["vodq", "reorder"]).is_err());
}

#[test]
fn cli_parse_session_controls() {
    assert!(matches!(parse(&["vodq", "start"]), CliCommand::Start));
    assert!(matches!(parse(&["vodq", "pause"]), CliCommand::Pause));
    assert!(matches!(parse(&["vodq", "cancel"]), CliCommand::Cancel));
    assert!(matches!(parse(&["vodq", "retry-failed"]), CliCommand::RetryFailed));
    assert!(matches!(
        parse(&["vodq", "clear-completed"]),
        CliCommand::ClearCompleted
    ));
    assert!(matches!(parse(&["vodq", "metrics"]), CliCommand::Metrics));
}

#[test]
fn cli_parse_completions() {
    match parse(&["vodq", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, Shell::Bash),
        _ => panic!("expected Completions"),
    }
    assert!(Cli::try_parse_from(["vodq", "completions", "cmd.exe"]).is_err());
}

#[test]
fn cli_parse_man() {
    assert!(matches!(parse(&["vodq", "man"]), CliCommand::Man));
}

#[test]
fn cli_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
