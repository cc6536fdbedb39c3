//! HTTP frontend tests, including the Click'n'Load v2 endpoint.

use std::sync::Arc;
use std::time::Duration;

use aes::Aes128;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockEncryptMut, KeyIvInit};
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;

use uget::client::Client;
use uget::file::FileMeta;
use uget::provider::error::ResolveError;
use uget::provider::{Provider, Providers, Resolvability, ResolverRef, SingleResolver};
use uget::request::Request;
use uget::server::Server;
use uget::accounts::AccountStore;

const KEY_HEX: &str = "00112233445566778899aabbccddeeff";

/// Claims every URL and resolves it online without any network traffic.
struct StaticHost;

impl Provider for StaticHost {
    fn name(&self) -> &'static str {
        "statichost"
    }

    fn resolver(&self) -> Option<ResolverRef<'_>> {
        Some(ResolverRef::Single(self))
    }
}

#[async_trait]
impl SingleResolver for StaticHost {
    fn can_resolve(&self, _url: &Url) -> Resolvability {
        Resolvability::Single
    }

    async fn resolve_one(&self, request: Request) -> Result<Vec<Request>, ResolveError> {
        let url = request.url().clone();
        Ok(request
            .resolves_to(FileMeta {
                name: url.path().trim_start_matches('/').replace('/', "-"),
                url,
                size: 128,
                checksum: None,
                provider: "statichost".into(),
            })
            .wrap())
    }
}

/// Boots a frontend on an ephemeral port and returns its base URL.
async fn boot_server(accounts_dir: &TempDir) -> String {
    let mut providers = Providers::default();
    providers.register(Arc::new(StaticHost)).unwrap();
    let client = Client::builder().retrievers(0).providers(providers).build();

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = Server::with_client("127.0.0.1", port, client)
        .store(AccountStore::open(accounts_dir.path().join("accounts.json")));
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    format!("http://127.0.0.1:{port}")
}

async fn poll_containers(base: &str, expected: usize) -> Vec<Value> {
    let http = reqwest::Client::new();
    for _ in 0..100 {
        let listing: Vec<Value> = http
            .get(format!("{base}/containers"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if listing.len() >= expected {
            return listing;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("containers never reached {expected} entries");
}

#[tokio::test]
async fn serverinfo_reports_bind_and_port() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let info: Value = reqwest::get(format!("{base}/serverinfo"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["bind_address"], "127.0.0.1");
    assert!(info["port"].as_u64().unwrap() > 0);
    assert!(info["started_at"].is_string());
}

#[tokio::test]
async fn create_container_resolves_and_lists_files() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{base}/containers"))
        .json(&vec!["http://h/file/a", "http://h/file/b"])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["id"].as_str().unwrap().len(), 64);

    let listing = poll_containers(&base, 2).await;
    let names: Vec<&str> = listing
        .iter()
        .map(|file| file["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"file-a"));
    assert!(names.contains(&"file-b"));
}

#[tokio::test]
async fn create_container_rejects_invalid_urls() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/containers"))
        .json(&vec!["::not a url::"])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 422);
}

#[tokio::test]
async fn delete_container_matches_id_prefix() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let http = reqwest::Client::new();

    http.post(format!("{base}/containers"))
        .json(&vec!["http://h/file/doomed"])
        .send()
        .await
        .unwrap();
    let listing = poll_containers(&base, 1).await;
    let id = listing[0]["id"].as_str().unwrap();

    // Too-short prefixes are rejected outright.
    let short = http
        .delete(format!("{base}/containers/abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(short.status().as_u16(), 400);

    let removed = http
        .delete(format!("{base}/containers/{}", &id[..8]))
        .send()
        .await
        .unwrap();
    assert!(removed.status().is_success());

    let empty: Vec<Value> = http
        .get(format!("{base}/containers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(empty.is_empty());

    let missing = http
        .delete(format!("{base}/containers/ffffffff"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn browser_helper_endpoints_answer_in_kind() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;

    let flash = reqwest::get(format!("{base}/flash"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(flash.starts_with("uget "));

    let jdcheck = reqwest::get(format!("{base}/jdcheck.js")).await.unwrap();
    assert!(
        jdcheck
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/javascript")
    );
    assert_eq!(jdcheck.text().await.unwrap(), "jdownloader = true;");

    let crossdomain = reqwest::get(format!("{base}/crossdomain.xml"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(crossdomain.contains("allow-access-from domain=\"*\""));
}

#[tokio::test]
async fn responses_carry_cors_headers() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let response = reqwest::get(format!("{base}/serverinfo")).await.unwrap();
    let headers = response.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "POST, GET, PUT, DELETE"
    );
}

#[tokio::test]
async fn accounts_listing_is_json() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let listing: Vec<Value> = reqwest::get(format!("{base}/accounts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // No accountant-capable provider is registered in this fixture.
    assert!(listing.is_empty());
}

/// AES-CBC with IV = key and NUL padding, the way Click'n'Load senders
/// encrypt their link lists.
fn encrypt_links(key: &[u8], plain: &str) -> String {
    let mut data = plain.as_bytes().to_vec();
    let padded = data.len().div_ceil(16) * 16;
    data.resize(padded, 0);
    let encryptor = cbc::Encryptor::<Aes128>::new_from_slices(key, key).unwrap();
    let encrypted = encryptor
        .encrypt_padded_mut::<NoPadding>(&mut data, padded)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(encrypted)
}

/// Scenario: a Click'n'Load post decrypts into two URLs which enter the
/// pipeline; the endpoint answers 200.
#[tokio::test]
async fn clicknload_post_feeds_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let key = hex::decode(KEY_HEX).unwrap();
    let crypted = encrypt_links(&key, "http://h/file/1\nhttp://h/file/2\n");

    let response = reqwest::Client::new()
        .post(format!("{base}/flash/addcrypted2"))
        .form(&[
            ("jk", format!("function f(){{return \"{KEY_HEX}\"}}")),
            ("crypted", crypted),
        ])
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "success\r\n");

    let listing = poll_containers(&base, 2).await;
    let urls: Vec<&str> = listing
        .iter()
        .map(|file| file["url"].as_str().unwrap())
        .collect();
    assert!(urls.contains(&"http://h/file/1"));
    assert!(urls.contains(&"http://h/file/2"));
}

#[tokio::test]
async fn clicknload_rejects_broken_key_scripts() {
    let dir = TempDir::new().unwrap();
    let base = boot_server(&dir).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/flash/addcrypted2"))
        .form(&[("jk", "function f( {"), ("crypted", "AAAA")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
