// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod resolve;
pub mod status;
pub mod task;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command, ReportArgs, RunArgs};
use crate::config::{ConfigFile, apply_overrides, load_and_validate, load_from_path};
use crate::engine::{Cancellation, Session, new_session_id};
use crate::errors::MirrorError;
use crate::exec::{CommandBackend, TransferBackend};
use crate::report::SessionReport;
use crate::resolve::{Resolution, TaskResolver};
use crate::status::Journal;

/// How an invocation ended, once it got far enough to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every task succeeded and every unit resolved.
    Clean,
    /// Some task failed or never started, or a unit could not be resolved.
    Incomplete,
}

impl Verdict {
    fn from_clean(clean: bool) -> Self {
        if clean { Verdict::Clean } else { Verdict::Incomplete }
    }

    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Clean => 0,
            Verdict::Incomplete => 1,
        }
    }
}

/// Exit code for an invocation that failed outright: `2` for configuration
/// problems, `1` otherwise.
pub fn error_exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MirrorError>() {
        Some(MirrorError::Configuration(_) | MirrorError::Toml(_)) => 2,
        _ => 1,
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - task resolution against the command backend
/// - the session (scheduler + progress monitor)
/// - Ctrl-C handling
/// - the final report
pub async fn run(args: CliArgs) -> Result<Verdict> {
    match args.command {
        Some(Command::Report(report)) => print_session_report(&args.config, &report),
        Some(Command::Run(run)) => run_session(&args.config, run).await,
        None => run_session(&args.config, RunArgs::default()).await,
    }
}

async fn run_session(config_path: &Path, opts: RunArgs) -> Result<Verdict> {
    let cfg = load_and_validate(config_path)?;
    let cfg = apply_overrides(cfg, opts.concurrency, opts.units)?;

    let session = if opts.dry_run {
        Session::new(new_session_id())
    } else {
        Session::open(&cfg.tunables)?
    };
    info!(session = %session.id(), config = %config_path.display(), "dbmirror starting");

    let backend: Arc<dyn TransferBackend> = Arc::new(CommandBackend::new(&cfg, session.id())?);
    let cancellation = Cancellation::new(cfg.tunables.stop_grace_period);
    spawn_ctrl_c_handler(cancellation.clone());

    let resolution = TaskResolver::new(backend.as_ref(), &cfg.tunables, cancellation.token())
        .resolve(&cfg.units)
        .await;

    if opts.dry_run {
        print_dry_run(&cfg, &resolution);
        return Ok(Verdict::from_clean(resolution.failures.is_empty()));
    }

    let outcome = session
        .execute(resolution.tasks, backend, &cfg.tunables, &cancellation)
        .await;

    let report = SessionReport::from_aggregator(
        session.aggregator(),
        &resolution.failures,
        outcome.scheduler.not_started,
    );
    println!("{report}");

    Ok(Verdict::from_clean(report.is_clean()))
}

/// `dbmirror report`: render a past session from its journal.
fn print_session_report(config_path: &Path, args: &ReportArgs) -> Result<Verdict> {
    let raw = load_from_path(config_path)?;
    let Some(dir) = raw.settings.journal_dir else {
        return Err(MirrorError::Configuration(
            "[settings].journal_dir is not set; no session journals to read".to_string(),
        )
        .into());
    };

    let contents = Journal::load(&dir, &args.session)?;
    debug!(
        outcomes = contents.outcomes.len(),
        errors = contents.errors.len(),
        "journal loaded"
    );

    let report = SessionReport::from_journal(&args.session, contents);
    println!("{report}");
    Ok(Verdict::from_clean(report.is_clean()))
}

/// Ctrl-C requests a session-wide stop.
fn spawn_ctrl_c_handler(cancellation: Cancellation) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancellation.stopped() => {}
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    warn!("Ctrl+C received; stopping session");
                    cancellation.request_stop();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl+C"),
            },
        }
    });
}

/// Print the settings and resolved task list without transferring.
fn print_dry_run(cfg: &ConfigFile, resolution: &Resolution) {
    let t = &cfg.tunables;
    println!("dbmirror dry-run");
    println!("  settings.concurrency = {}", t.concurrency);
    println!("  settings.max_attempts = {}", t.max_attempts);
    println!("  settings.retry_delay = {:?}", t.retry_delay);
    println!("  settings.stage_timeout = {:?}", t.stage_timeout);
    if !t.dest_prefix.is_empty() {
        println!("  settings.dest_prefix = {:?}", t.dest_prefix);
    }
    println!();

    println!("tasks ({}):", resolution.tasks.len());
    for task in &resolution.tasks {
        println!("  - {}", task.id());
    }

    if !resolution.failures.is_empty() {
        println!();
        println!("resolution failures ({}):", resolution.failures.len());
        for failure in &resolution.failures {
            println!("  - {failure}");
        }
    }

    debug!("dry-run complete (no transfer)");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_exit_with_two() {
        let err: anyhow::Error = MirrorError::Configuration("missing password".into()).into();
        assert_eq!(error_exit_code(&err), 2);

        let err: anyhow::Error = MirrorError::resolution("x", "y").into();
        assert_eq!(error_exit_code(&err), 1);

        assert_eq!(error_exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn verdict_exit_codes() {
        assert_eq!(Verdict::from_clean(true).exit_code(), 0);
        assert_eq!(Verdict::from_clean(false).exit_code(), 1);
    }
}
