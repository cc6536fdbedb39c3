//! CLI command handlers.

mod accounts;
mod get;
mod remote;
mod resolve;
mod server;

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use url::Url;

use uget::accounts::AccountStore;
use uget::client::Client;

use crate::cli::{Cli, Command};

/// Exit code contract: 0 = success, 1 = operational failure, 2 = usage
/// error, 3 = unimplemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Success,
    Failure,
    Usage,
}

impl ProcessExit {
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Usage => 2,
        }
    }
}

/// Dispatches a parsed command line to its handler.
pub async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Get(args) => get::run(args).await,
        Command::Meta(args) => resolve::run(args).await,
        Command::Accounts { command } => accounts::run(command).await,
        Command::Server(args) => server::run(args).await,
        Command::Daemon(args) => server::daemon(&args),
        Command::Push(args) => remote::push(args).await,
        Command::Ps(args) => remote::ps(&args).await,
        Command::Rm(args) => remote::rm(&args).await,
        Command::Version => {
            println!("uget v{}", env!("CARGO_PKG_VERSION"));
            Ok(ProcessExit::Success.code())
        }
    }
}

/// Collects the URLs a command operates on.
///
/// With `inline` the arguments are the URLs themselves. Otherwise each
/// argument names a file with one URL per line; `-` (or no arguments at
/// all) reads from standard input.
pub(crate) fn gather_urls(args: &[String], inline: bool) -> Result<Vec<Url>> {
    let mut raw_lines = Vec::new();
    if inline {
        raw_lines.extend(args.iter().cloned());
    } else if args.is_empty() {
        read_stdin_lines(&mut raw_lines)?;
    } else {
        for name in args {
            if name == "-" {
                read_stdin_lines(&mut raw_lines)?;
            } else {
                let content = std::fs::read_to_string(name)
                    .with_context(|| format!("reading URL list {name}"))?;
                raw_lines.extend(content.lines().map(str::to_string));
            }
        }
    }

    let mut urls = Vec::with_capacity(raw_lines.len());
    for line in raw_lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let url = Url::parse(line).with_context(|| format!("invalid URL: {line}"))?;
        urls.push(url);
    }
    Ok(urls)
}

fn read_stdin_lines(into: &mut Vec<String>) -> Result<()> {
    for line in std::io::stdin().lock().lines() {
        into.push(line.context("reading URLs from stdin")?);
    }
    Ok(())
}

/// Loads every stored account for the client's accountant providers and
/// hands them to the client.
pub(crate) async fn attach_accounts(client: &Client, store: &AccountStore) {
    let providers = client.providers().clone();
    for provider in providers.iter() {
        let Some(accountant) = provider.accountant() else {
            continue;
        };
        for account in store.accounts(provider.name(), accountant).await {
            if let Err(unknown) = client.use_account(Arc::from(account)) {
                // Cannot happen: the account came from this provider.
                tracing::warn!(error = %unknown, "skipping unattachable account");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_urls_inline() {
        let urls = gather_urls(&["http://h/a".into(), "http://h/b".into()], true).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].as_str(), "http://h/a");
    }

    #[test]
    fn test_gather_urls_inline_rejects_garbage() {
        assert!(gather_urls(&["not a url".into()], true).is_err());
    }

    #[test]
    fn test_gather_urls_from_file_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        std::fs::write(&list, "http://h/a\n\n# comment\nhttp://h/b\n").unwrap();
        let urls = gather_urls(&[list.to_string_lossy().into_owned()], false).unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_gather_urls_missing_file_errors() {
        assert!(gather_urls(&["/no/such/file".into()], false).is_err());
    }

    #[test]
    fn test_process_exit_codes() {
        assert_eq!(ProcessExit::Success.code(), 0);
        assert_eq!(ProcessExit::Failure.code(), 1);
        assert_eq!(ProcessExit::Usage.code(), 2);
    }
}
