mod cli;
mod commands;
pub mod db;
pub mod edgeguard;
pub mod energy;
pub mod manifest;
pub mod notify;
mod report;
pub mod settings;
pub mod training;
mod utils;

use clap::{error::ErrorKind, Parser};
use std::process::ExitCode;

use cli::Cli;
use commands::AppState;
use notify::CiContext;
use settings::Settings;

pub fn run() -> ExitCode {
    // Initialize logging (reads RUST_LOG env var). Logs go to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                | ErrorKind::MissingSubcommand => 1,
                _ => 2,
            };
            // clap sends explicit help/version to stdout, the rest to stderr.
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let settings_path = Settings::resolve_path(cli.config.as_deref());
    let settings = match Settings::load(&settings_path) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    log::debug!("gapwatch starting with settings from {}", settings_path.display());

    let state = AppState {
        settings,
        ci: CiContext::from_env(),
        json: cli.json,
    };

    let report = match commands::dispatch(cli.command, &state) {
        Ok(report) => report,
        Err(err) => {
            log::error!("command failed: {err:#}");
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    match report.render(state.json) {
        Ok(rendered) => {
            // Text-mode lines were already streamed; what's left are problems.
            if state.json {
                println!("{rendered}");
            } else if !rendered.is_empty() {
                eprintln!("{rendered}");
            }
            ExitCode::from(report.exit_code())
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
