//! Error types for the provider layer.

use thiserror::Error;

/// Errors produced while resolving a URL through a provider.
///
/// A resolve error never aborts the pipeline: the resolver attaches it to
/// an errored [`File`](crate::file::File) for the offending request and
/// carries on with the rest of the batch.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Network-level error while talking to the remote host.
    #[error("network error resolving {url}: {source}")]
    Network {
        /// The URL that was being resolved.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The remote answered with a non-success status.
    #[error("HTTP {status} resolving {url}")]
    HttpStatus {
        /// The URL that was being resolved.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Provider-specific failure (malformed page, missing token, ...).
    #[error("{provider}: {message}")]
    Provider {
        /// Name of the provider that failed.
        provider: String,
        /// Human-readable description.
        message: String,
    },
}

impl ResolveError {
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

    /// Creates a provider-specific error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while prompting the user for account credentials.
#[derive(Debug, Error)]
pub enum PromptError {
    /// Input stream closed before all fields were answered.
    #[error("input closed while prompting for {field}")]
    Eof {
        /// The field that was being asked for.
        field: String,
    },

    /// Terminal I/O failed.
    #[error("prompt I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The answers did not form a usable account.
    #[error("invalid account input: {0}")]
    Invalid(String),
}

/// Error returned when registering a provider under a name that is taken.
#[derive(Debug, Error)]
#[error("duplicate provider {name}")]
pub struct DuplicateProvider {
    /// The contested provider name.
    pub name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_http_status_display() {
        let error = ResolveError::http_status("https://example.com/f", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "expected status in: {msg}");
        assert!(msg.contains("https://example.com/f"));
    }

    #[test]
    fn test_resolve_error_provider_display() {
        let error = ResolveError::provider("sharehost", "captcha required");
        assert_eq!(error.to_string(), "sharehost: captcha required");
    }

    #[test]
    fn test_prompt_error_eof_display() {
        let error = PromptError::Eof {
            field: "password".into(),
        };
        assert!(error.to_string().contains("password"));
    }

    #[test]
    fn test_duplicate_provider_display() {
        let error = DuplicateProvider {
            name: "basic".into(),
        };
        assert_eq!(error.to_string(), "duplicate provider basic");
    }
}
