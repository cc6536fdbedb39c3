//! Local HTTP frontend.
//!
//! Admits only loopback clients and feeds submitted URLs into the same
//! pipeline the CLI uses. Besides the JSON container/account surface it
//! speaks the Click'n'Load v2 browser-helper protocol (see [`cnl`]).

mod cnl;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

use crate::accounts::AccountStore;
use crate::client::Client;
use crate::download::Download;
use crate::file::File;

/// Shortest container/file id prefix accepted by the delete endpoint.
const MIN_ID_PREFIX: usize = 4;

/// Static server facts reported by `/serverinfo`.
#[derive(Debug, Clone, Serialize)]
struct ServerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    bind_address: Option<String>,
    port: u16,
    started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) client: Client,
    info: ServerInfo,
    downloads: Arc<DashMap<String, Arc<Download>>>,
    store: AccountStore,
}

/// The HTTP frontend.
pub struct Server {
    bind: String,
    port: u16,
    client: Client,
    store: Option<AccountStore>,
}

impl Server {
    /// Prepares a server on `bind:port` around a resolve-only client.
    #[must_use]
    pub fn on(bind: impl Into<String>, port: u16) -> Self {
        Self::with_client(bind, port, Client::builder().retrievers(0).build())
    }

    /// Prepares a server around a caller-configured client.
    #[must_use]
    pub fn with_client(bind: impl Into<String>, port: u16, client: Client) -> Self {
        Self {
            bind: bind.into(),
            port,
            client,
            store: None,
        }
    }

    /// Replaces the account store (default: the shared platform store).
    #[must_use]
    pub fn store(mut self, store: AccountStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Inner client, e.g. to attach accounts before [`Server::run`].
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Binds, starts the pipeline workers and serves until the process
    /// ends.
    ///
    /// # Errors
    ///
    /// Returns the bind or accept-loop error.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind((self.bind.as_str(), self.port)).await?;
        self.serve(listener).await
    }

    /// Like [`Server::run`] on an already-bound listener. Exposed for
    /// tests that need an ephemeral port.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        let state = ServerState {
            client: self.client.clone(),
            info: ServerInfo {
                bind_address: (!self.bind.is_empty()).then(|| self.bind.clone()),
                port: addr.port(),
                started_at: Utc::now(),
            },
            downloads: Arc::new(DashMap::new()),
            store: self.store.unwrap_or_else(|| AccountStore::shared(None)),
        };

        // Track live downloads by file id for listing and cancellation.
        let downloads = Arc::clone(&state.downloads);
        self.client.on_download(move |download| {
            let downloads = Arc::clone(&downloads);
            let download = Arc::clone(download);
            tokio::spawn(async move {
                let id = download.file().id();
                downloads.insert(id.clone(), Arc::clone(&download));
                download.wait().await;
                downloads.remove(&id);
            });
        });
        self.client.start();

        let app = Router::new()
            .route("/serverinfo", get(serverinfo))
            .route("/containers", post(create_container).get(list_containers))
            .route(
                "/containers/:id",
                delete(delete_container).options(|| async {}),
            )
            .route("/accounts", get(list_accounts))
            .route("/flash/addcrypted2", post(cnl::add_crypted2))
            .route("/flash", get(flash))
            .route("/jdcheck.js", get(jdcheck))
            .route("/crossdomain.xml", get(crossdomain))
            .layer(middleware::from_fn(admit_local))
            .with_state(state);

        info!(addr = %addr, "HTTP frontend listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
    }
}

/// Rejects non-loopback peers and stamps the CORS headers every browser
/// helper expects.
async fn admit_local(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if !peer.ip().is_loopback() {
        debug!(peer = %peer, "rejecting non-local request");
        return (StatusCode::FORBIDDEN, "only local requests are allowed").into_response();
    }
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, PUT, DELETE"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("origin, x-requested-with, content-type"),
    );
    response
}

async fn serverinfo(State(state): State<ServerState>) -> Json<ServerInfo> {
    Json(state.info.clone())
}

/// `POST /containers`: body is a JSON array of URL strings.
async fn create_container(
    State(state): State<ServerState>,
    Json(links): Json<Vec<String>>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let mut urls = Vec::with_capacity(links.len());
    for (index, link) in links.iter().enumerate() {
        let url = Url::parse(link).map_err(|parse_error| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid URL #{}: {parse_error}.", index + 1),
            )
        })?;
        urls.push(url);
    }
    let container = state.client.add_urls(urls);
    Ok(Json(json!({ "id": container.id().to_string() })))
}

/// `GET /containers`: the current resolved-queue file listing.
async fn list_containers(State(state): State<ServerState>) -> Json<Vec<Value>> {
    let listing = state
        .client
        .resolved_queue()
        .list()
        .await
        .into_iter()
        .filter_map(|request| request.file().map(file_json))
        .collect();
    Json(listing)
}

fn file_json(file: &File) -> Value {
    match file {
        File::Online(online) => json!({
            "id": online.id(),
            "name": online.name(),
            "url": online.url().as_str(),
            "size": online.size(),
        }),
        File::Offline(_) => json!({
            "id": file.id(),
            "url": file.url().as_str(),
            "offline": true,
        }),
        File::Errored(errored) => json!({
            "id": file.id(),
            "url": file.url().as_str(),
            "error": errored.error().to_string(),
        }),
    }
}

/// `DELETE /containers/:id`: cancels/removes by file id; prefixes of at
/// least four characters match.
async fn delete_container(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if id.len() < MIN_ID_PREFIX {
        return Err((StatusCode::BAD_REQUEST, format!("invalid ID: {id}")));
    }

    // An active download matching the prefix is stopped in place.
    for entry in state.downloads.iter() {
        if entry.key().starts_with(&id) {
            entry.value().stop();
            return Ok(Json(json!({ "id": entry.key(), "canceled": true })));
        }
    }

    if id.len() == 64 {
        if let Some(request) = state.client.resolved_queue().remove(&id).await {
            let response = request.file().map(file_json).unwrap_or(Value::Null);
            complete_removed(&state.client, &request);
            return Ok(Json(response));
        }
        return Err((StatusCode::NOT_FOUND, "ID does not match any files!".into()));
    }

    for request in state.client.resolved_queue().list().await {
        if request.id().starts_with(&id) {
            if let Some(request) = state.client.resolved_queue().remove(&request.id()).await {
                let response = request.file().map(file_json).unwrap_or(Value::Null);
                complete_removed(&state.client, &request);
                return Ok(Json(response));
            }
        }
    }
    Err((StatusCode::NOT_FOUND, "ID does not match any files!".into()))
}

/// A removed online file will never see a retriever, so its work slot is
/// released here to keep the container's counter coherent. In resolve-only
/// mode the slot was already released at resolve time.
fn complete_removed(client: &Client, request: &crate::request::Request) {
    if client.retriever_count() > 0 && request.file().and_then(File::online).is_some() {
        request.done();
    }
}

/// `GET /accounts`: accounts across providers, disabled flag included.
async fn list_accounts(State(state): State<ServerState>) -> Json<Vec<Value>> {
    let mut listing = Vec::new();
    for provider in state.client.providers().iter() {
        if provider.accountant().is_some() {
            for meta in state.store.metadata(provider.name()).await {
                listing.push(json!({
                    "id": meta.id,
                    "disabled": meta.disabled,
                    "provider": meta.provider,
                    "data": meta.data,
                }));
            }
        }
    }
    Json(listing)
}

async fn flash() -> String {
    format!("uget {}", env!("CARGO_PKG_VERSION"))
}

async fn jdcheck() -> Response {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        "jdownloader = true;",
    )
        .into_response()
}

async fn crossdomain() -> Response {
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        cnl::CROSS_DOMAIN,
    )
        .into_response()
}
