// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `dbmirror`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbmirror",
    version,
    about = "Copy databases and tables from a remote store to a local one.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DBMIRROR_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Resolve the configured units and transfer them (default).
    Run(RunArgs),
    /// Print the report of a previous session from its journal.
    Report(ReportArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Override `[settings].concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Transfer only these units instead of `[transfer].units`.
    /// May be given multiple times.
    #[arg(long = "unit", value_name = "SPEC")]
    pub units: Vec<String>,

    /// Resolve and print the task list, but don't transfer anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ReportArgs {
    /// Session id printed at the start of a run.
    #[arg(long, value_name = "ID")]
    pub session: String,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_has_no_subcommand() {
        let args = CliArgs::try_parse_from(["dbmirror"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.config, PathBuf::from("Dbmirror.toml"));
    }

    #[test]
    fn run_accepts_repeated_units() {
        let args = CliArgs::try_parse_from([
            "dbmirror", "run", "--unit", "shop:*", "--unit", "crm", "--concurrency", "2",
        ])
        .unwrap();
        match args.command {
            Some(Command::Run(run)) => {
                assert_eq!(run.units, vec!["shop:*", "crm"]);
                assert_eq!(run.concurrency, Some(2));
                assert!(!run.dry_run);
            }
            other => panic!("expected run subcommand, got {other:?}"),
        }
    }

    #[test]
    fn report_requires_session() {
        assert!(CliArgs::try_parse_from(["dbmirror", "report"]).is_err());
        let args =
            CliArgs::try_parse_from(["dbmirror", "report", "--session", "20260101-000000-1"])
                .unwrap();
        assert!(matches!(args.command, Some(Command::Report(_))));
    }
}
