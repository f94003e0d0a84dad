//! CLI command implementations
//!
//! `mirror` runs a client in the foreground: it subscribes every requested
//! journal, starts the worker and waits for it to terminate. Mirrored
//! journals land under `--data-dir`, one directory per local location.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::info;

use crate::auth::StaticTokenProvider;
use crate::client::{ClientConfig, ClientEvent, JournalClient};
use crate::journal::MirrorWriterFactory;
use crate::net::ServerAddress;
use crate::observability::init_logging;

use super::args::{parse_journal_spec, Cli, Command, ConfigArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_response};

/// Parse arguments, install logging and run the command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_json);
    run_command(cli.command)
}

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Mirror {
            config,
            data_dir,
            journals,
            token,
        } => mirror(&config, &data_dir, &journals, token.as_deref()),
        Command::Config { config } => show_config(&config),
    }
}

/// Build the client configuration from the optional file and `--server`
/// overrides.
pub fn load_config(args: &ConfigArgs) -> CliResult<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };

    if !args.servers.is_empty() {
        config.servers = args
            .servers
            .iter()
            .map(|s| s.parse::<ServerAddress>().map_err(CliError::config_error))
            .collect::<CliResult<Vec<_>>>()?;
    }

    config.validate()?;
    Ok(config)
}

/// Print the effective configuration
pub fn show_config(args: &ConfigArgs) -> CliResult<()> {
    let config = load_config(args)?;
    write_json(&config)
}

/// Mirror `journals` into `data_dir` until the client terminates.
///
/// Succeeds only if the client stopped because it was halted.
pub fn mirror(
    args: &ConfigArgs,
    data_dir: &Path,
    journals: &[String],
    token: Option<&str>,
) -> CliResult<()> {
    let config = load_config(args)?;
    let subscriptions = journals
        .iter()
        .map(|spec| parse_journal_spec(spec).map_err(CliError::config_error))
        .collect::<CliResult<Vec<_>>>()?;
    fs::create_dir_all(data_dir)?;

    let cause = Arc::new(Mutex::new(None::<ClientEvent>));
    let recorder = cause.clone();
    let mut builder = JournalClient::builder(config)
        .writer_factory(MirrorWriterFactory::new(data_dir))
        .on_event(move |event: ClientEvent| {
            if event.is_terminal_cause() {
                if let Ok(mut slot) = recorder.lock() {
                    *slot = Some(event);
                }
            }
        });
    if let Some(token) = token {
        let provider = StaticTokenProvider::from_base64(token)
            .map_err(|e| CliError::config_error(format!("invalid --token: {}", e)))?;
        builder = builder.credentials(provider);
    }

    let client = builder.build()?;
    for (remote, local) in subscriptions {
        info!(remote = %remote, local = local.derived_location(), "Queueing journal");
        client.subscribe(remote, local, None)?;
    }
    client.start()?;
    client.join()?;

    write_response(json!({ "metrics": serde_json::to_value(client.metrics())? }))?;

    let cause = cause.lock().map(|slot| *slot).unwrap_or(None);
    match cause {
        None | Some(ClientEvent::ClientHalt) => Ok(()),
        Some(other) => Err(CliError::replication_stopped(format!(
            "client terminated with {}",
            other
        ))),
    }
}
