pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod extract;
pub mod parse;
pub mod store;

use std::process::ExitCode;

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::CommandResult;

/// Initialize tracing/logging with the given directives.
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive {:?}: {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(&["distill=info", "distill_core=info"]);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            if let Ok(json) = serde_json::to_string(&e) {
                eprintln!("{}", json);
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> CommandResult<()> {
    let config = match cli.data_dir {
        Some(dir) => Config::with_data_dir(dir),
        None => Config::load_or_default(),
    };
    config.ensure_dirs()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Using data directory");

    match cli.command {
        Command::Generate(args) => commands::generate(&config, args).await,
        Command::Parse { files } => commands::parse(&config, files).await,
        Command::Config { endpoint, model } => {
            commands::show_or_update_config(&config, endpoint, model).map(|_| ())
        }
    }
}
