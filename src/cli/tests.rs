//! Unit tests for CLI parsing

use crate::cli::{Cli, Commands};
use clap::Parser;
use std::net::SocketAddr;

#[test]
fn test_no_subcommand_defaults_to_serve() {
    let cli = Cli::try_parse_from(["todo-api"]).unwrap();
    assert!(cli.command.is_none());
}

#[test]
fn test_serve_with_addr() {
    let cli = Cli::try_parse_from(["todo-api", "serve", "--addr", "127.0.0.1:9000"]).unwrap();
    let expected: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    assert_eq!(cli.command, Some(Commands::Serve { addr: Some(expected) }));
}

#[test]
fn test_serve_rejects_bad_addr() {
    assert!(Cli::try_parse_from(["todo-api", "serve", "--addr", "localhost"]).is_err());
}

#[test]
fn test_routes_command() {
    let cli = Cli::try_parse_from(["todo-api", "routes"]).unwrap();
    assert_eq!(cli.command, Some(Commands::Routes));
}

#[test]
fn test_unknown_command_fails() {
    assert!(Cli::try_parse_from(["todo-api", "generate"]).is_err());
}
