//! Containers group the URLs submitted in one call.
//!
//! A [`Container`] is the handle returned by
//! [`Client::add_urls`](crate::client::Client::add_urls): an identifier
//! derived from the submitted URLs plus a barrier that releases once every
//! descendant request of the submission has reported done.

use sha2::{Digest, Sha256};
use tokio::sync::watch;
use url::Url;

/// Identifier of a submission: hex SHA-256 over the concatenated URL
/// strings.
///
/// The id is sensitive to submission order: the same URLs in a different
/// order produce a different id. This is intentional: a container
/// identifies one concrete submission, not a set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

impl ContainerId {
    /// Derives the id from the submitted URLs, in order.
    #[must_use]
    pub fn from_urls(urls: &[Url]) -> Self {
        let mut hasher = Sha256::new();
        for url in urls {
            hasher.update(url.as_str().as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counts outstanding work for one container.
///
/// Incremented by one per submitted URL (plus one held by the submitter
/// until enqueueing finishes) and by `n - 1` on a bundle expansion;
/// decremented once per terminal outcome. Waiters release when the count
/// reaches zero.
#[derive(Debug, Clone)]
pub(crate) struct WorkCounter {
    count: std::sync::Arc<watch::Sender<i64>>,
}

impl WorkCounter {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            count: std::sync::Arc::new(tx),
        }
    }

    pub(crate) fn add(&self, n: i64) {
        self.count.send_modify(|count| *count += n);
    }

    pub(crate) fn done(&self) {
        self.count.send_modify(|count| {
            *count -= 1;
            debug_assert!(*count >= 0, "work counter went negative");
        });
    }

    pub(crate) fn outstanding(&self) -> i64 {
        *self.count.borrow()
    }

    pub(crate) async fn wait(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives inside self, so wait_for cannot fail here.
        let _ = rx.wait_for(|count| *count <= 0).await;
    }
}

/// Handle for a set of URLs submitted together.
#[derive(Debug, Clone)]
pub struct Container {
    id: ContainerId,
    counter: WorkCounter,
}

impl Container {
    pub(crate) fn new(id: ContainerId, counter: WorkCounter) -> Self {
        Self { id, counter }
    }

    /// The submission identifier.
    #[must_use]
    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    /// Waits until every descendant request of this submission has reached
    /// a terminal outcome (and, in retrieve mode, finished downloading).
    pub async fn wait(&self) {
        self.counter.wait().await;
    }

    /// Number of outstanding work slots. Zero means the container is done.
    #[must_use]
    pub fn outstanding(&self) -> i64 {
        self.counter.outstanding()
    }
}
