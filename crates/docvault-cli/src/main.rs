//! docvault CLI.

use std::io::{self, IsTerminal};
use std::time::Duration;

use clap::{ColorChoice, Parser};
use docvault_cli::logging::{LogConfig, LogFormat, init_logging};
use docvault_persistence::PersistenceError;
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg};
use crate::commands::{run_load, run_path, run_save, run_serve, store_config};

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run(&cli) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            for note in error_notes(&error) {
                eprintln!("{note}");
            }
            1
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = store_config(&cli.store)?;
    let timeout = Duration::from_millis(cli.store.timeout_ms);

    // One cooperative thread: requests are handled strictly one at a time.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match &cli.command {
            Command::Save(args) => run_save(&config, args, timeout).await,
            Command::Load(args) => run_load(&config, args, timeout).await,
            Command::Serve => run_serve(&config).await,
            Command::Path => run_path(&config),
        }
    })
}

/// Friendly explanation and fix for a store error somewhere in `error`.
fn error_notes(error: &anyhow::Error) -> Vec<String> {
    let Some(cause) = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<PersistenceError>())
    else {
        return Vec::new();
    };
    let mut notes = vec![format!("note: {}", cause.user_message())];
    if let Some(suggestion) = cause.suggestion() {
        notes.push(format!("hint: {suggestion}"));
    }
    notes
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let explicit_level = cli.log_level.map(|level| match level {
        LogLevelArg::Error => LevelFilter::ERROR,
        LogLevelArg::Warn => LevelFilter::WARN,
        LogLevelArg::Info => LevelFilter::INFO,
        LogLevelArg::Debug => LevelFilter::DEBUG,
        LogLevelArg::Trace => LevelFilter::TRACE,
    });
    let mut config = match explicit_level {
        Some(level) => LogConfig::default().with_level(level),
        None if cli.verbosity.is_present() => {
            LogConfig::default().with_level(cli.verbosity.tracing_level_filter())
        }
        None => LogConfig {
            level_filter: cli.verbosity.tracing_level_filter(),
            ..LogConfig::default()
        },
    }
    .with_log_data(cli.log_data);
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use anyhow::Context;

    #[test]
    fn test_error_notes_for_store_errors() {
        let error = Err::<(), _>(PersistenceError::Config {
            path: Some(PathBuf::from("settings.toml")),
            reason: "bad origin".to_string(),
        })
        .context("load settings")
        .unwrap_err();

        assert_eq!(
            error_notes(&error),
            vec![
                "note: The settings file settings.toml is invalid: bad origin.".to_string(),
                "hint: Fix or remove the settings file.".to_string(),
            ]
        );
    }

    #[test]
    fn test_error_notes_skip_other_errors() {
        assert!(error_notes(&anyhow::anyhow!("no document given")).is_empty());
    }

    #[test]
    fn test_explicit_level_wins_over_verbosity() {
        let cli = Cli::try_parse_from(["docvault", "-v", "--log-level", "trace", "load"]).unwrap();
        let config = log_config_from_cli(&cli);
        assert_eq!(config.level_filter, LevelFilter::TRACE);
        assert!(!config.use_env_filter);

        let cli = Cli::try_parse_from(["docvault", "load", "--log-data"]).unwrap();
        let config = log_config_from_cli(&cli);
        assert!(config.use_env_filter);
        assert!(config.log_data);
    }
}
