//! `uget get`: resolve and download.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use uget::accounts::AccountStore;
use uget::client::Client;
use uget::download::{Download, DownloadStatus};

use crate::cli::GetArgs;
use crate::commands::{ProcessExit, attach_accounts, gather_urls};

pub async fn run(args: GetArgs) -> Result<u8> {
    let urls = match gather_urls(&args.args, args.inline) {
        Ok(urls) => urls,
        Err(usage_error) => {
            eprintln!("{usage_error:#}");
            return Ok(ProcessExit::Usage.code());
        }
    };

    let client = Client::builder()
        .retrievers(args.jobs.max(1))
        .no_skip(args.no_skip)
        .no_continue(args.no_continue)
        .build();
    attach_accounts(&client, &AccountStore::shared(None)).await;
    let container = client.add_urls(urls);

    if args.dry_run {
        client.dry_run();
        container.wait().await;
        client.finalize();
        return Ok(ProcessExit::Success.code());
    }

    let failed = Arc::new(AtomicBool::new(false));
    let progress = MultiProgress::new();

    {
        let progress = progress.clone();
        client.on_download(move |download| {
            track_download(&progress, download);
        });
    }
    {
        let progress = progress.clone();
        client.on_skip(move |file| {
            let _ = progress.println(format!("{}: skipped...", file.name()));
        });
    }
    {
        let progress = progress.clone();
        let failed = Arc::clone(&failed);
        client.on_error(move |file, error| {
            failed.store(true, Ordering::Relaxed);
            let _ = progress.println(format!("{}: error: {error}.", file.url()));
        });
    }
    {
        let progress = progress.clone();
        client.on_deadend(move |url| {
            let _ = progress.println(format!("{url}: offline."));
        });
    }
    {
        let progress = progress.clone();
        let failed = Arc::clone(&failed);
        client.on_resolve(move |url, file| {
            if let Some(error) = file.error() {
                failed.store(true, Ordering::Relaxed);
                let _ = progress.println(format!("{url}: errored: {error}."));
            }
        });
    }

    client.start();
    container.wait().await;
    client.finalize();

    Ok(if failed.load(Ordering::Relaxed) {
        ProcessExit::Failure.code()
    } else {
        ProcessExit::Success.code()
    })
}

/// Adds a progress bar for one download and polls its atomic counters
/// until the transfer finishes.
fn track_download(progress: &MultiProgress, download: &Arc<Download>) {
    let bar = if download.length_unknown() {
        let bar = progress.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{msg:30!} {bytes} ({bytes_per_sec}) {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar
    } else {
        let bar = progress.add(ProgressBar::new(download.length() as u64));
        bar.set_style(
            ProgressStyle::with_template(
                "{msg:30!} {bytes:>9}/{total_bytes:9} ({bytes_per_sec:>11}) {wide_bar}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let via = if download.provider() == download.file().provider() {
        String::new()
    } else {
        format!(" (via {})", download.provider())
    };
    bar.set_message(format!("{}{via}", download.file().name()));
    bar.set_position(download.progress());

    let download = Arc::clone(download);
    tokio::spawn(async move {
        loop {
            match download.status() {
                DownloadStatus::Running => {
                    bar.set_position(download.progress());
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                DownloadStatus::Completed => {
                    bar.set_position(download.progress());
                    bar.finish_with_message(format!("{}: done{via}", download.file().name()));
                    break;
                }
                DownloadStatus::Canceled => {
                    bar.abandon_with_message(format!("{}: stopped.", download.file().name()));
                    break;
                }
                DownloadStatus::Failed(error) => {
                    bar.abandon_with_message(format!(
                        "{}: error: {error}",
                        download.file().name()
                    ));
                    break;
                }
            }
        }
    });
}
