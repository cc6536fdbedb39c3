//! The retrieve stage.
//!
//! Retriever workers pull single files off the resolved queue. For each
//! online file the most suitable provider builds an HTTP request spec,
//! which is executed through the client's shared HTTP connection pool.
//! Local state decides between skip, resume and fresh download; the body
//! streams through a byte-counting wrapper into the target file while the
//! caller watches progress on the [`Download`] handle.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::download::{Download, DownloadStatus};
use crate::file::{FILE_SIZE_UNKNOWN, File, OnlineFile};
use crate::provider::Provider;

use super::ClientInner;
use super::error::FetchError;

/// Retriever worker loop. The client spawns one per configured job.
pub(crate) async fn work(client: Arc<ClientInner>) {
    while let Some(request) = client.resolved_queue.get().await {
        let Some(file) = request.file().cloned() else {
            panic!("unresolved request on the resolved queue: {}", request.url());
        };
        match file {
            File::Errored(errored) => {
                // The resolver completes errored terminals itself; one
                // showing up here is a pipeline bug, not a user error.
                panic!("errored file reached the retriever: {}", errored.error());
            }
            File::Offline(offline) => client.hooks.emit_deadend(offline.url()),
            File::Online(online) => {
                fetch(&client, &online).await;
                request.done();
            }
        }
    }
    debug!("retriever worker exiting");
}

/// What the local file system tells us to do about a file.
enum LocalState {
    Fresh,
    Resume { from: u64 },
    Skip,
}

async fn fetch(client: &ClientInner, file: &OnlineFile) {
    let Some(provider) = client.providers.best_retriever(file) else {
        emit_online_error(
            client,
            file,
            FetchError::NoRetriever {
                name: file.name().to_string(),
            },
        );
        return;
    };

    let path = client.directory.join(file.name());
    let local = match examine_local(client, file, &path).await {
        Ok(LocalState::Skip) => {
            debug!(name = file.name(), "local file matches, skipping");
            client.hooks.emit_skip(file);
            return;
        }
        Ok(state) => state,
        Err(fetch_error) => {
            emit_online_error(client, file, fetch_error);
            return;
        }
    };

    if client.is_dry_run() {
        println!(
            "Would fetch {} with {} provider.",
            file.name(),
            provider.name()
        );
        return;
    }

    if let Err(fetch_error) = transfer(client, file, provider.as_ref(), &path, &local).await {
        emit_online_error(client, file, fetch_error);
    }
}

/// Stats the local target and decides between skip, resume and fresh.
async fn examine_local(
    client: &ClientInner,
    file: &OnlineFile,
    path: &Path,
) -> Result<LocalState, FetchError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(stat_error) if stat_error.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LocalState::Fresh);
        }
        Err(stat_error) => return Err(FetchError::io(path, stat_error)),
    };

    let local_size = meta.len();
    debug!(
        name = file.name(),
        local = local_size,
        remote = file.size(),
        "local file present"
    );
    if local_size as i64 == file.size() {
        if !client.no_skip {
            return Ok(LocalState::Skip);
        }
        // Skip disabled: remove and fetch again from offset zero.
        tokio::fs::remove_file(path)
            .await
            .map_err(|remove_error| FetchError::io(path, remove_error))?;
        return Ok(LocalState::Fresh);
    }
    if (local_size as i64) > file.size() && !file.length_unknown() {
        return Err(FetchError::LocalLarger {
            path: path.to_path_buf(),
            local: local_size,
            remote: file.size(),
        });
    }
    if client.no_continue {
        return Ok(LocalState::Fresh);
    }
    Ok(LocalState::Resume { from: local_size })
}

/// Executes the provider-built request and streams the body to disk.
async fn transfer(
    client: &ClientInner,
    file: &OnlineFile,
    provider: &dyn Provider,
    path: &Path,
    local: &LocalState,
) -> Result<(), FetchError> {
    let retriever = provider
        .retriever()
        .unwrap_or_else(|| unreachable!("best_retriever returned a provider without the capability"));
    let spec = retriever.retrieve(file).await?;

    let mut request = client
        .http
        .request(spec.method, spec.url.clone())
        .headers(spec.headers);
    if let Some(body) = spec.body {
        request = request.body(body);
    }
    if let LocalState::Resume { from } = local {
        debug!(name = file.name(), from, "requesting range resume");
        request = request.header(RANGE, format!("bytes={from}-"));
    }

    let response = request
        .send()
        .await
        .map_err(|send_error| FetchError::network(spec.url.as_str(), send_error))?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::http_status(spec.url.as_str(), status.as_u16()));
    }

    let resumed = status == StatusCode::PARTIAL_CONTENT;
    let existing = match (resumed, local) {
        (true, LocalState::Resume { from }) => *from,
        (true, _) => {
            warn!(name = file.name(), "206 without a range request, appending");
            0
        }
        (false, _) => 0,
    };
    if !resumed && status != StatusCode::OK {
        warn!(name = file.name(), status = status.as_u16(), "unexpected success status");
    }

    let remaining = response.content_length();
    let total = match remaining {
        Some(remaining) => existing as i64 + remaining as i64,
        None => FILE_SIZE_UNKNOWN,
    };

    let target = if resumed {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
    } else {
        tokio::fs::File::create(path).await
    }
    .map_err(|open_error| FetchError::io(path, open_error))?;

    let download = Arc::new(Download::new(file.clone(), provider.name(), existing, total));
    client.hooks.emit_download(&download);

    let copied = copy_body(response, target, path, &download).await;
    match copied {
        Ok(CopyEnd::Completed) => {
            debug!(
                name = file.name(),
                bytes = download.progress(),
                resumed,
                "download complete"
            );
            download.finish(DownloadStatus::Completed);
            Ok(())
        }
        Ok(CopyEnd::Canceled) => {
            // Partial bytes stay on disk for the next run's resume.
            debug!(name = file.name(), "download canceled");
            download.finish(DownloadStatus::Canceled);
            Ok(())
        }
        Err(copy_error) => {
            let shared = Arc::new(copy_error);
            download.finish(DownloadStatus::Failed(Arc::clone(&shared)));
            emit_online_error_shared(client, file, &shared);
            Ok(())
        }
    }
}

enum CopyEnd {
    Completed,
    Canceled,
}

/// Streams the response body into the file, counting bytes on the handle
/// and aborting promptly on cancellation.
async fn copy_body(
    response: reqwest::Response,
    target: tokio::fs::File,
    path: &Path,
    download: &Arc<Download>,
) -> Result<CopyEnd, FetchError> {
    let url = response.url().as_str().to_string();
    let mut stream = response.bytes_stream();
    let mut writer = BufWriter::new(target);
    loop {
        tokio::select! {
            () = download.cancelled() => {
                writer
                    .flush()
                    .await
                    .map_err(|flush_error| FetchError::io(path, flush_error))?;
                return Ok(CopyEnd::Canceled);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    writer
                        .write_all(&bytes)
                        .await
                        .map_err(|write_error| FetchError::io(path, write_error))?;
                    download.add_progress(bytes.len() as u64);
                }
                Some(Err(chunk_error)) => {
                    return Err(FetchError::network(&url, chunk_error));
                }
                None => {
                    writer
                        .flush()
                        .await
                        .map_err(|flush_error| FetchError::io(path, flush_error))?;
                    return Ok(CopyEnd::Completed);
                }
            }
        }
    }
}

fn emit_online_error(client: &ClientInner, file: &OnlineFile, error: FetchError) {
    warn!(name = file.name(), error = %error, "retrieve failed");
    client
        .hooks
        .emit_error(&File::Online(file.clone()), &error);
}

fn emit_online_error_shared(client: &ClientInner, file: &OnlineFile, error: &Arc<FetchError>) {
    warn!(name = file.name(), error = %error, "retrieve failed");
    client.hooks.emit_error(&File::Online(file.clone()), error);
}
