//! Resolved file outcomes.
//!
//! A [`File`] is the terminal outcome of resolving a request: the resource
//! is either [`online`](File::Online) (concrete, downloadable metadata),
//! [`offline`](File::Offline) (confirmed gone), or
//! [`errored`](File::Errored) (the resolve itself failed). The variants are
//! a proper sum type: callers pattern-match at the boundary instead of
//! poking accessors that are only valid for one shape.

use std::sync::Arc;

use digest::DynDigest;
use sha2::{Digest, Sha256};
use url::Url;

use crate::provider::error::ResolveError;

/// Sentinel returned by [`OnlineFile::size`] when the remote length is
/// unknown, e.g. a HEAD response without `Content-Length`.
pub const FILE_SIZE_UNKNOWN: i64 = -1;

/// Expected checksum of a remote file, as reported by a provider.
#[derive(Debug, Clone)]
pub struct Checksum {
    /// Expected digest bytes.
    pub digest: Vec<u8>,
    /// Algorithm name: `sha256`, `sha1` or `md5`.
    pub algo: String,
}

impl Checksum {
    /// Returns a fresh hasher for this checksum's algorithm, or `None` if
    /// the algorithm is not one we can verify locally.
    #[must_use]
    pub fn new_hasher(&self) -> Option<Box<dyn DynDigest>> {
        match self.algo.to_ascii_lowercase().as_str() {
            "sha256" => Some(Box::new(Sha256::new())),
            "sha1" => Some(Box::new(sha1::Sha1::new())),
            "md5" => Some(Box::new(md5::Md5::new())),
            _ => None,
        }
    }
}

/// Metadata a provider reports for a downloadable resource.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Concrete URL the bytes can be fetched from.
    pub url: Url,
    /// Local filename for the resource.
    pub name: String,
    /// Remote length in bytes, or [`FILE_SIZE_UNKNOWN`].
    pub size: i64,
    /// Expected checksum, when the provider knows one.
    pub checksum: Option<Checksum>,
    /// Name of the provider that issued this metadata.
    pub provider: String,
}

/// A downloadable resource.
#[derive(Debug, Clone)]
pub struct OnlineFile {
    meta: Arc<FileMeta>,
    original: Url,
}

impl OnlineFile {
    pub(crate) fn new(meta: FileMeta, original: Url) -> Self {
        Self {
            meta: Arc::new(meta),
            original,
        }
    }

    /// Concrete URL of the resource.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.meta.url
    }

    /// The URL as originally submitted by the caller.
    #[must_use]
    pub fn original_url(&self) -> &Url {
        &self.original
    }

    /// Local filename.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Remote length in bytes, or [`FILE_SIZE_UNKNOWN`].
    #[must_use]
    pub fn size(&self) -> i64 {
        self.meta.size
    }

    /// Whether the remote length is unknown.
    #[must_use]
    pub fn length_unknown(&self) -> bool {
        self.meta.size == FILE_SIZE_UNKNOWN
    }

    /// Expected checksum, when known.
    #[must_use]
    pub fn checksum(&self) -> Option<&Checksum> {
        self.meta.checksum.as_ref()
    }

    /// Name of the issuing provider.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.meta.provider
    }

    /// Stable identifier: hex SHA-256 of the concrete URL.
    #[must_use]
    pub fn id(&self) -> String {
        url_id(self.url())
    }
}

/// A resource confirmed unavailable.
#[derive(Debug, Clone)]
pub struct OfflineFile {
    original: Url,
    url: Url,
}

impl OfflineFile {
    pub(crate) fn new(original: Url, url: Url) -> Self {
        Self { original, url }
    }

    /// The URL that turned out to be a dead end.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL as originally submitted by the caller.
    #[must_use]
    pub fn original_url(&self) -> &Url {
        &self.original
    }
}

/// A resource whose resolve failed.
#[derive(Debug, Clone)]
pub struct ErroredFile {
    original: Url,
    url: Url,
    error: Arc<ResolveError>,
}

impl ErroredFile {
    pub(crate) fn new(original: Url, url: Url, error: Arc<ResolveError>) -> Self {
        Self {
            original,
            url,
            error,
        }
    }

    /// The URL whose resolve failed.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL as originally submitted by the caller.
    #[must_use]
    pub fn original_url(&self) -> &Url {
        &self.original
    }

    /// The resolve failure.
    #[must_use]
    pub fn error(&self) -> &ResolveError {
        &self.error
    }
}

/// Terminal outcome of a resolve.
#[derive(Debug, Clone)]
pub enum File {
    /// The resource exists and can be downloaded.
    Online(OnlineFile),
    /// The resource is confirmed unavailable.
    Offline(OfflineFile),
    /// Resolving the resource failed.
    Errored(ErroredFile),
}

impl File {
    /// Current URL of this outcome, valid on every variant.
    #[must_use]
    pub fn url(&self) -> &Url {
        match self {
            Self::Online(f) => f.url(),
            Self::Offline(f) => f.url(),
            Self::Errored(f) => f.url(),
        }
    }

    /// The URL as originally submitted by the caller.
    #[must_use]
    pub fn original_url(&self) -> &Url {
        match self {
            Self::Online(f) => f.original_url(),
            Self::Offline(f) => f.original_url(),
            Self::Errored(f) => f.original_url(),
        }
    }

    /// The resolve failure, if this outcome is errored.
    #[must_use]
    pub fn error(&self) -> Option<&ResolveError> {
        match self {
            Self::Errored(f) => Some(f.error()),
            _ => None,
        }
    }

    /// The online view, if this outcome is downloadable.
    #[must_use]
    pub fn online(&self) -> Option<&OnlineFile> {
        match self {
            Self::Online(f) => Some(f),
            _ => None,
        }
    }

    /// Whether the resource is confirmed unavailable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// Stable identifier: hex SHA-256 of the current URL.
    #[must_use]
    pub fn id(&self) -> String {
        url_id(self.url())
    }
}

/// Hex SHA-256 of a URL string.
pub(crate) fn url_id(url: &Url) -> String {
    let mut hasher = Sha256::new();
    Digest::update(&mut hasher, url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
