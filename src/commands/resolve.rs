//! `uget meta` (alias `resolve`): resolve only and print what was found.

use std::fmt::Write as _;
use std::io::Write as _;

use anyhow::Result;
use digest::DynDigest;

use uget::accounts::AccountStore;
use uget::client::{Client, resolve_all_with};
use uget::file::{File, OnlineFile};

use crate::cli::MetaArgs;
use crate::commands::{ProcessExit, attach_accounts, gather_urls};
use crate::progress::{human_bytes, maybe_pager};

pub async fn run(args: MetaArgs) -> Result<u8> {
    let urls = match gather_urls(&args.args, args.inline) {
        Ok(urls) => urls,
        Err(usage_error) => {
            eprintln!("{usage_error:#}");
            return Ok(ProcessExit::Usage.code());
        }
    };

    let client = Client::builder().retrievers(0).build();
    attach_accounts(&client, &AccountStore::shared(None)).await;
    let files = resolve_all_with(client, urls).await;

    let mut out = String::new();
    let mut exit = ProcessExit::Success;
    let mut total: i64 = 0;
    let mut unknown_factor = false;

    for file in &files {
        match file {
            File::Errored(errored) => {
                let _ = writeln!(out, "errored     {} - {}", errored.url(), errored.error());
                unknown_factor = true;
                exit = ProcessExit::Failure;
            }
            File::Offline(offline) => {
                let _ = writeln!(out, "offline     {}", offline.url());
                unknown_factor = true;
            }
            File::Online(online) if online.length_unknown() => {
                let _ = writeln!(out, "???????     {}", online.url());
                unknown_factor = true;
            }
            File::Online(online) => {
                total += online.size();
                let _ = write!(
                    out,
                    "{:>9}   {}   {}",
                    human_bytes(online.size()),
                    online.name(),
                    online.url()
                );
                if let Some(checksum) = online.checksum() {
                    let _ = write!(out, "   {} {}", checksum.algo, hex::encode(&checksum.digest));
                }
                if args.compare {
                    let _ = write!(out, ", {}", compare_local(online, args.remove).await);
                }
                let _ = writeln!(out);
            }
        }
    }

    let format = if unknown_factor { "TOTAL %s+" } else { "TOTAL %s" };
    let _ = writeln!(out, "{}", format.replace("%s", &human_bytes(total)));

    page_or_print(&out)?;
    Ok(exit.code())
}

/// Compares a resolved file against the local file of the same name, by
/// size first and checksum second, optionally deleting mismatches.
async fn compare_local(online: &OnlineFile, remove: bool) -> String {
    let name = online.name().to_string();
    let mut verdict;
    let mut mismatch = false;

    match tokio::fs::metadata(&name).await {
        Err(stat_error) if stat_error.kind() == std::io::ErrorKind::NotFound => {
            return "no local file.".to_string();
        }
        Err(stat_error) => return format!("error reading local file: {stat_error}"),
        Ok(meta) => {
            let local = meta.len() as i64;
            if local < online.size() {
                verdict = "local is smaller".to_string();
            } else if local > online.size() {
                verdict = "local is bigger".to_string();
                mismatch = true;
            } else {
                verdict = "sizes match. ".to_string();
                match checksum_local(online, &name).await {
                    ChecksumVerdict::NoData => verdict.push_str("no checksum data available."),
                    ChecksumVerdict::Match(algo) => {
                        let _ = write!(verdict, "{algo}-checksum: match");
                    }
                    ChecksumVerdict::Mismatch(algo, local_digest, expected) => {
                        let _ = write!(
                            verdict,
                            "{algo}-checksum: don't match ({local_digest} : {expected})"
                        );
                        mismatch = true;
                    }
                    ChecksumVerdict::Error(message) => {
                        let _ = write!(verdict, "{message}");
                    }
                }
            }
        }
    }

    if mismatch && remove {
        verdict.push_str(", deleting");
        if let Err(remove_error) = tokio::fs::remove_file(&name).await {
            let _ = write!(verdict, ", error: {remove_error}");
        }
    }
    verdict
}

enum ChecksumVerdict {
    NoData,
    Match(String),
    Mismatch(String, String, String),
    Error(String),
}

async fn checksum_local(online: &OnlineFile, name: &str) -> ChecksumVerdict {
    let Some(checksum) = online.checksum() else {
        return ChecksumVerdict::NoData;
    };
    let Some(mut hasher) = checksum.new_hasher() else {
        return ChecksumVerdict::NoData;
    };
    let contents = match tokio::fs::read(name).await {
        Ok(contents) => contents,
        Err(read_error) => {
            return ChecksumVerdict::Error(format!("error opening local: {read_error}"));
        }
    };
    DynDigest::update(hasher.as_mut(), &contents);
    let local_digest = hasher.finalize_reset().to_vec();
    if local_digest == checksum.digest {
        ChecksumVerdict::Match(checksum.algo.clone())
    } else {
        ChecksumVerdict::Mismatch(
            checksum.algo.clone(),
            hex::encode(local_digest),
            hex::encode(&checksum.digest),
        )
    }
}

/// Prints directly, or through `$PAGER` when the output would scroll off
/// an interactive terminal.
fn page_or_print(out: &str) -> Result<()> {
    if let Some(mut pager) = maybe_pager(out.lines().count()) {
        if let Some(stdin) = pager.stdin.as_mut() {
            let _ = stdin.write_all(out.as_bytes());
        }
        drop(pager.stdin.take());
        let _ = pager.wait();
    } else {
        print!("{out}");
    }
    Ok(())
}
