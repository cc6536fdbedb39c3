//! The fallback provider.
//!
//! Claims every URL as a `Single` resolve: a HEAD request derives the
//! remote length and a filename (Content-Disposition first, URL path
//! second). As a retriever it answers suitability `1` for every online
//! file, so it also acts as the downloader of last resort.

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH};
use tracing::debug;
use url::Url;

use crate::file::{FILE_SIZE_UNKNOWN, FileMeta};
use crate::request::Request;

use super::error::ResolveError;
use super::{
    HttpRequestSpec, Provider, Resolvability, ResolverRef, Retriever, SingleResolver,
};

/// Name the basic provider registers under.
pub const BASIC_PROVIDER: &str = "basic";

/// Fallback provider handling plain direct-download URLs.
pub struct Basic {
    client: reqwest::Client,
}

impl Basic {
    /// Creates the provider with its own HTTP client for HEAD probes.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for Basic {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for Basic {
    fn name(&self) -> &'static str {
        BASIC_PROVIDER
    }

    fn resolver(&self) -> Option<ResolverRef<'_>> {
        Some(ResolverRef::Single(self))
    }

    fn retriever(&self) -> Option<&dyn Retriever> {
        Some(self)
    }
}

#[async_trait]
impl SingleResolver for Basic {
    fn can_resolve(&self, _url: &Url) -> Resolvability {
        Resolvability::Single
    }

    async fn resolve_one(&self, request: Request) -> Result<Vec<Request>, ResolveError> {
        let url = request.url().clone();
        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|source| ResolveError::network(url.as_str(), source))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            debug!(url = %url, status = status.as_u16(), "resource offline");
            return Ok(request.deadend(Some(response.url().clone())).wrap());
        }
        if !status.is_success() {
            return Err(ResolveError::http_status(url.as_str(), status.as_u16()));
        }

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(FILE_SIZE_UNKNOWN);
        let final_url = response.url().clone();
        let name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_disposition)
            .unwrap_or_else(|| filename_from_url(&final_url));

        debug!(url = %url, name = %name, size, "HEAD resolve complete");
        Ok(request
            .resolves_to(FileMeta {
                url: final_url,
                name,
                size,
                checksum: None,
                provider: BASIC_PROVIDER.into(),
            })
            .wrap())
    }
}

#[async_trait]
impl Retriever for Basic {
    fn can_retrieve(&self, _file: &crate::file::OnlineFile) -> u32 {
        1
    }

    async fn retrieve(
        &self,
        file: &crate::file::OnlineFile,
    ) -> Result<HttpRequestSpec, ResolveError> {
        Ok(HttpRequestSpec::get(file.url().clone()))
    }
}

/// Extracts a filename from a Content-Disposition header value.
///
/// Handles both the plain `filename="..."` form and the RFC 5987
/// `filename*=UTF-8''...` form, preferring the latter.
fn parse_content_disposition(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = part.strip_prefix("filename*=") {
            let encoded = encoded.trim_matches('"');
            let encoded = encoded
                .strip_prefix("UTF-8''")
                .or_else(|| encoded.strip_prefix("utf-8''"))
                .unwrap_or(encoded);
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let name = sanitize_filename(&decoded);
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
    }
    for part in value.split(';') {
        let part = part.trim();
        if let Some(name) = part.strip_prefix("filename=") {
            let name = sanitize_filename(name.trim_matches('"'));
            if !name.is_empty() {
                return Some(name);
            }
        }
    }
    None
}

/// Last path segment of the URL, percent-decoded, falling back to the
/// host name for bare URLs.
fn filename_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty());
    if let Some(segment) = segment {
        let decoded = urlencoding::decode(segment)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| segment.to_string());
        let name = sanitize_filename(&decoded);
        if !name.is_empty() {
            return name;
        }
    }
    url.host_str().unwrap_or("download").to_string()
}

/// Strips path separators and leading dots so a remote-chosen name cannot
/// escape the target directory.
fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    cleaned.trim_start_matches('.').trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::container::WorkCounter;
    use crate::request::Lineage;

    fn request_for(url: &str) -> Request {
        let counter = WorkCounter::new();
        counter.add(1);
        Request::root(Lineage::new(), Url::parse(url).unwrap(), 0, counter)
    }

    #[test]
    fn test_parse_content_disposition_quoted() {
        assert_eq!(
            parse_content_disposition(r#"attachment; filename="x.bin""#),
            Some("x.bin".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        assert_eq!(
            parse_content_disposition("attachment; filename=report.pdf"),
            Some("report.pdf".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987_wins() {
        assert_eq!(
            parse_content_disposition(
                r#"attachment; filename="fallback.bin"; filename*=UTF-8''na%C3%AFve.bin"#
            ),
            Some("naïve.bin".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_without_filename() {
        assert_eq!(parse_content_disposition("inline"), None);
    }

    #[test]
    fn test_filename_from_url_decodes_segment() {
        let url = Url::parse("http://h/files/my%20file.bin").unwrap();
        assert_eq!(filename_from_url(&url), "my file.bin");
    }

    #[test]
    fn test_filename_from_url_falls_back_to_host() {
        let url = Url::parse("http://example.com/").unwrap();
        assert_eq!(filename_from_url(&url), "example.com");
    }

    #[test]
    fn test_sanitize_filename_strips_separators() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
    }

    #[tokio::test]
    async fn test_head_resolve_reads_length_and_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/x.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", "1000")
                    .insert_header("Content-Disposition", r#"attachment; filename="x.bin""#),
            )
            .mount(&server)
            .await;

        let basic = Basic::new();
        let children = basic
            .resolve_one(request_for(&format!("{}/x.bin", server.uri())))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        let online = children[0].file().unwrap().online().unwrap();
        assert_eq!(online.name(), "x.bin");
        assert_eq!(online.size(), 1000);
    }

    #[tokio::test]
    async fn test_head_resolve_missing_length_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/stream"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let basic = Basic::new();
        let children = basic
            .resolve_one(request_for(&format!("{}/stream", server.uri())))
            .await
            .unwrap();
        let online = children[0].file().unwrap().online().unwrap();
        assert!(online.length_unknown());
    }

    #[tokio::test]
    async fn test_head_resolve_404_is_deadend() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let basic = Basic::new();
        let children = basic
            .resolve_one(request_for(&format!("{}/gone", server.uri())))
            .await
            .unwrap();
        assert!(children[0].file().unwrap().is_offline());
    }

    #[tokio::test]
    async fn test_head_resolve_server_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/oops"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let basic = Basic::new();
        let result = basic
            .resolve_one(request_for(&format!("{}/oops", server.uri())))
            .await;
        assert!(matches!(
            result,
            Err(ResolveError::HttpStatus { status: 500, .. })
        ));
    }
}
