// src/main.rs

use std::process::ExitCode;

use dbmirror::{Verdict, cli, error_exit_code, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(verdict) => ExitCode::from(verdict.exit_code()),
        Err(err) => {
            eprintln!("dbmirror error: {err:?}");
            ExitCode::from(error_exit_code(&err))
        }
    }
}

async fn run_main() -> anyhow::Result<Verdict> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
