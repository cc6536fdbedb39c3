//! Error types for the retrieve stage.

use std::path::PathBuf;

use thiserror::Error;

use crate::provider::error::ResolveError;

/// Errors that can occur while fetching an online file.
///
/// Fetch errors are per-file and never fatal to the pipeline: they are
/// surfaced through the `on_error` hook together with the affected file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error during the transfer.
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a status outside 2xx.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Local file system error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The local path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A local file is already larger than the remote resource; resuming
    /// or overwriting it would be destructive guesswork.
    #[error("local file {path} is larger than the remote resource ({local} > {remote})")]
    LocalLarger {
        /// The local path.
        path: PathBuf,
        /// Local size in bytes.
        local: u64,
        /// Remote size in bytes.
        remote: i64,
    },

    /// The provider failed to build the request spec.
    #[error("provider failed to prepare the download: {0}")]
    Provider(#[from] ResolveError),

    /// No registered provider can retrieve the file. Cannot happen while
    /// the basic provider is registered.
    #[error("no provider can retrieve {name}")]
    NoRetriever {
        /// The file name without a willing retriever.
        name: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Error returned by [`Client::use_account`](crate::client::Client::use_account)
/// when no registered provider matches the account's provider name.
#[derive(Debug, Error)]
#[error("no provider named {name} in this client")]
pub struct UnknownProvider {
    /// The provider name the account claimed.
    pub name: String,
}
