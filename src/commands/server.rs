//! `uget server` and `uget daemon`.

use anyhow::{Context, Result};
use tracing::{info, warn};

use uget::accounts::AccountStore;
use uget::server::Server;

use crate::cli::ServerArgs;
use crate::commands::{ProcessExit, attach_accounts};

pub async fn run(args: ServerArgs) -> Result<u8> {
    if args.port != 9666 {
        warn!("Click'n'Load v2 will only work for port 9666!");
    }
    let server = Server::on(args.bind, args.port);
    attach_accounts(server.client(), &AccountStore::shared(None)).await;
    server.run().await.context("HTTP frontend failed")?;
    // run() only returns when the listener dies.
    Ok(ProcessExit::Failure.code())
}

/// Respawns this executable as a detached `server` child, logging to
/// `server.log` in the working directory.
pub fn daemon(args: &ServerArgs) -> Result<u8> {
    let exe = std::env::current_exe().context("locating own executable")?;
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("server.log")
        .context("opening server.log")?;
    let child = std::process::Command::new(exe)
        .arg("server")
        .arg("-p")
        .arg(args.port.to_string())
        .arg("-b")
        .arg(&args.bind)
        .stdin(std::process::Stdio::null())
        .stdout(log.try_clone().context("duplicating server.log handle")?)
        .stderr(log)
        .spawn()
        .context("starting the daemon")?;
    info!(pid = child.id(), "daemon running");
    println!("Daemon running with pid {}", child.id());
    Ok(ProcessExit::Success.code())
}
