//! CLI module for the journal client
//!
//! Provides command-line interface for:
//! - mirror: replicate remote journals into a local directory
//! - config: print the effective configuration

mod args;
mod commands;
mod errors;
mod io;

pub use args::{parse_journal_spec, Cli, Command, ConfigArgs};
pub use commands::{load_config, mirror, run, run_command, show_config};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_json, write_response};
