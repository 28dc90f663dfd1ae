//! Command-line interface for smartlists.
//!
//! Definitions are authored as JSON files and stored in SQLite; refreshes
//! evaluate against a JSON library snapshot.

mod commands;

pub use commands::{Cli, Commands, IgnoreAction, run_command};
