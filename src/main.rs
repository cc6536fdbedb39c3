//! CLI entry point for uget.

use std::process::ExitCode;

use clap::Parser;

mod cli;
mod commands;
mod progress;
mod prompter;

#[tokio::main]
async fn main() -> ExitCode {
    let parsed = cli::Cli::parse();
    let _log_guard = uget::logging::init();
    match commands::run(parsed).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::from(commands::ProcessExit::Failure.code())
        }
    }
}
