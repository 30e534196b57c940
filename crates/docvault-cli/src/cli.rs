//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "docvault",
    version,
    about = "Persist a single JSON document in a private, origin-scoped store",
    long_about = "Persist a single JSON document in a private, origin-scoped store.\n\n\
                  Every save replaces the whole document. The document file is opened\n\
                  lazily and held exclusively while the command runs."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow document contents in trace-level logs.
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

/// Where the document lives. Flags override the settings file.
#[derive(Args, Clone, Debug, Default)]
pub struct StoreArgs {
    /// Settings file to use instead of the platform default.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Base directory holding one folder per origin.
    #[arg(long = "root", value_name = "DIR", global = true)]
    pub root: Option<PathBuf>,

    /// Origin the store belongs to.
    #[arg(long = "origin", value_name = "ORIGIN", global = true)]
    pub origin: Option<String>,

    /// Name of the document file.
    #[arg(long = "file-name", value_name = "NAME", global = true)]
    pub file_name: Option<String>,

    /// How long to wait for the worker before giving up, in milliseconds.
    #[arg(
        long = "timeout-ms",
        value_name = "MS",
        default_value_t = 5000,
        global = true
    )]
    pub timeout_ms: u64,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replace the stored document with a JSON object.
    Save(SaveArgs),

    /// Print the stored document.
    Load(LoadArgs),

    /// Bridge JSON-lines requests on stdin to responses on stdout.
    ///
    /// Each input line is a request envelope such as
    /// {"type":"save","name":"Ada"} or {"type":"load"}. Each response is one
    /// JSON line: the loaded text as a string, or an error object.
    Serve,

    /// Print the resolved document path.
    Path,
}

#[derive(Args)]
pub struct SaveArgs {
    /// Document as a JSON object. Its "type" field is set to "save".
    #[arg(value_name = "JSON", required_unless_present = "file", conflicts_with = "file")]
    pub document: Option<String>,

    /// Read the document from a file ("-" for stdin).
    #[arg(long = "file", short = 'f', value_name = "PATH")]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct LoadArgs {
    /// Pretty-print the document when it is valid JSON.
    #[arg(long = "pretty")]
    pub pretty: bool,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_save_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docvault",
            "save",
            r#"{"name":"Ada"}"#,
            "--origin",
            "https://clinic.example",
            "--timeout-ms",
            "250",
        ])
        .unwrap();

        let Command::Save(args) = cli.command else {
            panic!("expected save");
        };
        assert_eq!(args.document.as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(cli.store.origin.as_deref(), Some("https://clinic.example"));
        assert_eq!(cli.store.timeout_ms, 250);
    }

    #[test]
    fn test_save_requires_document_or_file() {
        assert!(Cli::try_parse_from(["docvault", "save"]).is_err());
        assert!(Cli::try_parse_from(["docvault", "save", "--file", "-"]).is_ok());
        assert!(Cli::try_parse_from(["docvault", "save", "{}", "--file", "doc.json"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["docvault", "load"]).unwrap();
        assert_eq!(cli.store.timeout_ms, 5000);
        assert!(cli.store.root.is_none());
        assert!(!cli.log_data);
        assert!(matches!(cli.command, Command::Load(LoadArgs { pretty: false })));
    }
}
