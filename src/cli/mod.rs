//! # CLI Module
//!
//! Command-line entry point for the `todo-api` binary.
//!
//! ## Commands
//!
//! ### `serve` (default)
//!
//! Load configuration from the environment, connect the configured backends
//! and serve HTTP until SIGINT or SIGTERM:
//!
//! ```bash
//! todo-api serve --addr 127.0.0.1:4000
//! ```
//!
//! Without `--addr` the server binds `0.0.0.0` on `BACKEND_CONTAINER_PORT`.
//!
//! ### `routes`
//!
//! Print the route table in match order:
//!
//! ```bash
//! todo-api routes
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands};
