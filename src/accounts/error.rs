//! Error types for the account store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors around reading and writing the accounts file.
///
/// Store errors are logged rather than propagated: a read failure
/// degrades to an empty in-memory store, a save failure keeps the
/// in-memory state authoritative until the next successful save.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the accounts file failed.
    #[error("accounts file {path}: {source}")]
    Io {
        /// The accounts file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The accounts file or a record payload is not valid JSON.
    #[error("accounts file {path}: {source}")]
    Json {
        /// The accounts file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_io_display_names_path() {
        let error = StoreError::io(
            "/tmp/accounts.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("/tmp/accounts.json"));
    }
}
