//! CLI argument definitions using clap
//!
//! Commands:
//! - aerodb-journal-client mirror --journal <remote[=local]> [--server <host:port>] [--data-dir <path>]
//! - aerodb-journal-client config [--config <path>] [--server <host:port>]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::journal::JournalKey;

/// AeroDB journal replication client
#[derive(Parser, Debug)]
#[command(name = "aerodb-journal-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the client configuration comes from
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to a JSON client configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Journal server (host:port); repeat for failover order. Overrides the file.
    #[arg(long = "server")]
    pub servers: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mirror remote journals into a local directory until the client stops
    Mirror {
        #[command(flatten)]
        config: ConfigArgs,

        /// Root directory for mirrored journals
        #[arg(long, default_value = "./mirror")]
        data_dir: PathBuf,

        /// Journal to mirror, as remote or remote=local
        #[arg(long = "journal", required = true)]
        journals: Vec<String>,

        /// Base64 credential sent when the server asks for authorization
        #[arg(long)]
        token: Option<String>,
    },

    /// Print the effective client configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

/// Split `remote[=local]` into remote and local keys.
pub fn parse_journal_spec(spec: &str) -> Result<(JournalKey, JournalKey), String> {
    let (remote, local) = match spec.split_once('=') {
        Some((remote, local)) => (remote.trim(), local.trim()),
        None => (spec.trim(), spec.trim()),
    };
    if remote.is_empty() || local.is_empty() {
        return Err(format!("invalid journal '{}', expected remote[=local]", spec));
    }
    Ok((JournalKey::new(remote), JournalKey::new(local)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_spec_defaults_local_to_remote() {
        let (remote, local) = parse_journal_spec("trades").unwrap();
        assert_eq!(remote.name, "trades");
        assert_eq!(local.name, "trades");
    }

    #[test]
    fn test_journal_spec_with_local_name() {
        let (remote, local) = parse_journal_spec("trades=trades_copy").unwrap();
        assert_eq!(remote.name, "trades");
        assert_eq!(local.derived_location(), "trades_copy");
    }

    #[test]
    fn test_journal_spec_rejects_empty_parts() {
        assert!(parse_journal_spec("=x").is_err());
        assert!(parse_journal_spec("x=").is_err());
    }

    #[test]
    fn test_mirror_args_parse() {
        let cli = Cli::try_parse_from([
            "aerodb-journal-client",
            "--log-json",
            "mirror",
            "--server",
            "db:7075",
            "--journal",
            "trades",
            "--journal",
            "quotes=q",
        ])
        .unwrap();

        assert!(cli.log_json);
        match cli.command {
            Command::Mirror {
                config, journals, ..
            } => {
                assert_eq!(config.servers, vec!["db:7075"]);
                assert_eq!(journals, vec!["trades", "quotes=q"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_mirror_requires_a_journal() {
        assert!(Cli::try_parse_from(["aerodb-journal-client", "mirror"]).is_err());
    }
}
