//! Live handle for an in-flight download.
//!
//! The retriever hands one [`Download`] to the `on_download` hook per
//! fetched file. Progress counters are plain atomics, so UI threads can
//! poll them without locks; completion is observed through a watch
//! channel, and cancellation flows back the same way.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use tokio::sync::watch;

use crate::client::error::FetchError;
use crate::file::{FILE_SIZE_UNKNOWN, OnlineFile};

/// State of a download as seen through its handle.
#[derive(Debug, Clone)]
pub enum DownloadStatus {
    /// Bytes are still flowing.
    Running,
    /// All bytes were written.
    Completed,
    /// The download was aborted via [`Download::stop`]. Distinct from a
    /// failure: partial bytes stay on disk for the next resume.
    Canceled,
    /// The transfer failed.
    Failed(Arc<FetchError>),
}

impl DownloadStatus {
    /// Whether the download has finished, successfully or not.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// An in-flight file transfer.
#[derive(Debug)]
pub struct Download {
    file: OnlineFile,
    provider: String,
    progress: AtomicU64,
    length: AtomicI64,
    status: watch::Sender<DownloadStatus>,
    cancel: watch::Sender<bool>,
}

impl Download {
    /// Creates a running handle. `start_at` pre-seeds the progress counter
    /// for resumed transfers; `length` is the expected total including any
    /// resumed prefix, or [`FILE_SIZE_UNKNOWN`].
    pub(crate) fn new(file: OnlineFile, provider: &str, start_at: u64, length: i64) -> Self {
        let (status, _) = watch::channel(DownloadStatus::Running);
        let (cancel, _) = watch::channel(false);
        Self {
            file,
            provider: provider.to_string(),
            progress: AtomicU64::new(start_at),
            length: AtomicI64::new(length),
            status,
            cancel,
        }
    }

    /// The file being fetched.
    #[must_use]
    pub fn file(&self) -> &OnlineFile {
        &self.file
    }

    /// Name of the provider performing the transfer. May differ from the
    /// file's issuing provider.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Bytes accounted for so far, including any resumed prefix.
    #[must_use]
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Relaxed)
    }

    /// Expected total length, or [`FILE_SIZE_UNKNOWN`].
    #[must_use]
    pub fn length(&self) -> i64 {
        self.length.load(Ordering::Relaxed)
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.status.borrow().clone()
    }

    /// Whether the transfer has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// Waits for the transfer to finish and returns the final status.
    pub async fn wait(&self) -> DownloadStatus {
        let mut rx = self.status.subscribe();
        match rx.wait_for(DownloadStatus::is_done).await {
            Ok(status) => status.clone(),
            // Sender lives inside self; unreachable in practice.
            Err(_) => self.status(),
        }
    }

    /// Requests cancellation. The copy loop aborts at the next chunk and
    /// the status becomes [`DownloadStatus::Canceled`]; bytes already on
    /// disk are kept.
    pub fn stop(&self) {
        let _ = self.cancel.send(true);
    }

    pub(crate) fn add_progress(&self, bytes: u64) {
        self.progress.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self, status: DownloadStatus) {
        debug_assert!(status.is_done());
        let _ = self.status.send(status);
    }

    /// Resolves once cancellation has been requested.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }

    /// Whether the expected total is unknown.
    #[must_use]
    pub fn length_unknown(&self) -> bool {
        self.length() == FILE_SIZE_UNKNOWN
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use url::Url;

    use super::*;
    use crate::file::FileMeta;

    fn online(size: i64) -> OnlineFile {
        let url = Url::parse("http://h/x.bin").unwrap();
        OnlineFile::new(
            FileMeta {
                url: url.clone(),
                name: "x.bin".into(),
                size,
                checksum: None,
                provider: "basic".into(),
            },
            url,
        )
    }

    #[test]
    fn test_progress_seeded_for_resume() {
        let download = Download::new(online(1000), "basic", 400, 1000);
        assert_eq!(download.progress(), 400);
        assert_eq!(download.length(), 1000);
        download.add_progress(100);
        assert_eq!(download.progress(), 500);
    }

    #[tokio::test]
    async fn test_wait_observes_completion() {
        let download = Arc::new(Download::new(online(10), "basic", 0, 10));
        let waiter = {
            let download = Arc::clone(&download);
            tokio::spawn(async move { download.wait().await })
        };
        download.finish(DownloadStatus::Completed);
        assert!(matches!(waiter.await.unwrap(), DownloadStatus::Completed));
        assert!(download.is_done());
    }

    #[tokio::test]
    async fn test_stop_resolves_cancelled() {
        let download = Download::new(online(10), "basic", 0, 10);
        download.stop();
        download.cancelled().await;
    }

    #[test]
    fn test_length_unknown_sentinel() {
        let download = Download::new(online(FILE_SIZE_UNKNOWN), "basic", 0, FILE_SIZE_UNKNOWN);
        assert!(download.length_unknown());
    }
}
