//! The client facade.
//!
//! A [`Client`] wires the whole pipeline together: the provider registry,
//! the per-provider account lists, the resolver and resolved queues, the
//! shared HTTP client and the worker tasks. Events along the way are
//! surfaced through typed hooks, one callback list per event kind.

pub mod error;
mod resolve;
mod retrieve;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;
use url::Url;

use crate::container::{Container, ContainerId, WorkCounter};
use crate::download::Download;
use crate::file::File;
use crate::provider::{Account, ProviderConfig, Providers};
use crate::queue::Queue;
use crate::request::{Lineage, Request};
use error::UnknownProvider;

/// Default number of retriever workers.
pub const DEFAULT_RETRIEVERS: usize = 3;

type DownloadHook = Box<dyn Fn(&Arc<Download>) + Send + Sync>;
type SkipHook = Box<dyn Fn(&crate::file::OnlineFile) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&File, &error::FetchError) + Send + Sync>;
type ResolveHook = Box<dyn Fn(&Url, &File) + Send + Sync>;
type DeadendHook = Box<dyn Fn(&Url) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Hooks {
    download: Mutex<Vec<DownloadHook>>,
    skip: Mutex<Vec<SkipHook>>,
    error: Mutex<Vec<ErrorHook>>,
    resolve: Mutex<Vec<ResolveHook>>,
    deadend: Mutex<Vec<DeadendHook>>,
}

impl Hooks {
    fn locked<T: ?Sized>(hooks: &Mutex<Vec<Box<T>>>) -> std::sync::MutexGuard<'_, Vec<Box<T>>> {
        hooks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn emit_download(&self, download: &Arc<Download>) {
        for hook in Self::locked(&self.download).iter() {
            hook(download);
        }
    }

    pub(crate) fn emit_skip(&self, file: &crate::file::OnlineFile) {
        for hook in Self::locked(&self.skip).iter() {
            hook(file);
        }
    }

    pub(crate) fn emit_error(&self, file: &File, error: &error::FetchError) {
        for hook in Self::locked(&self.error).iter() {
            hook(file, error);
        }
    }

    pub(crate) fn emit_resolve(&self, url: &Url, file: &File) {
        for hook in Self::locked(&self.resolve).iter() {
            hook(url, file);
        }
    }

    pub(crate) fn emit_deadend(&self, url: &Url) {
        for hook in Self::locked(&self.deadend).iter() {
            hook(url);
        }
    }
}

pub(crate) struct ClientInner {
    pub(crate) directory: PathBuf,
    pub(crate) no_skip: bool,
    pub(crate) no_continue: bool,
    pub(crate) providers: Providers,
    accounts: Mutex<HashMap<String, Vec<Arc<dyn Account>>>>,
    pub(crate) resolver_queue: Queue,
    pub(crate) resolved_queue: Queue,
    pub(crate) http: reqwest::Client,
    retrievers: AtomicUsize,
    dry_run: AtomicBool,
    pub(crate) hooks: Hooks,
}

impl ClientInner {
    pub(crate) fn retriever_count(&self) -> usize {
        self.retrievers.load(Ordering::Relaxed)
    }

    pub(crate) fn is_dry_run(&self) -> bool {
        self.dry_run.load(Ordering::Relaxed)
    }
}

/// Configures and creates a [`Client`].
pub struct ClientBuilder {
    directory: PathBuf,
    no_skip: bool,
    no_continue: bool,
    retrievers: usize,
    providers: Providers,
}

impl ClientBuilder {
    /// Target directory for downloaded files. Defaults to the current
    /// directory.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Disables skipping files whose local size already matches; matching
    /// files are deleted and fetched again.
    #[must_use]
    pub fn no_skip(mut self, no_skip: bool) -> Self {
        self.no_skip = no_skip;
        self
    }

    /// Disables range resume of partial local files.
    #[must_use]
    pub fn no_continue(mut self, no_continue: bool) -> Self {
        self.no_continue = no_continue;
        self
    }

    /// Number of retriever workers. Zero puts the client in resolve-only
    /// mode.
    #[must_use]
    pub fn retrievers(mut self, retrievers: usize) -> Self {
        self.retrievers = retrievers;
        self
    }

    /// Replaces the provider registry.
    #[must_use]
    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    /// Builds the client. Workers are spawned later by
    /// [`Client::start`].
    #[must_use]
    pub fn build(self) -> Client {
        Client {
            inner: Arc::new(ClientInner {
                directory: self.directory,
                no_skip: self.no_skip,
                no_continue: self.no_continue,
                providers: self.providers,
                accounts: Mutex::new(HashMap::new()),
                resolver_queue: Queue::new("resolver"),
                resolved_queue: Queue::new("resolved"),
                http: reqwest::Client::new(),
                retrievers: AtomicUsize::new(self.retrievers),
                dry_run: AtomicBool::new(false),
                hooks: Hooks::default(),
            }),
        }
    }
}

/// Manages resolves and downloads. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// A client with default settings: three retrievers, the default
    /// provider registry, downloads into the current directory.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a client.
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder {
            directory: PathBuf::from("."),
            no_skip: false,
            no_continue: false,
            retrievers: DEFAULT_RETRIEVERS,
            providers: Providers::default(),
        }
    }

    /// Submits URLs for resolution (and download, in retrieve mode).
    ///
    /// The returned [`Container`] identifies the submission and can be
    /// awaited until every descendant request has completed.
    pub fn add_urls(&self, urls: Vec<Url>) -> Container {
        let counter = WorkCounter::new();
        counter.add(urls.len() as i64);
        let container = Container::new(ContainerId::from_urls(&urls), counter.clone());
        let arena = Lineage::new();
        let requests: Vec<Request> = urls
            .into_iter()
            .enumerate()
            .map(|(rank, url)| Request::root(Arc::clone(&arena), url, rank as u32, counter.clone()))
            .collect();
        debug!(container = %container.id(), count = requests.len(), "submitting URLs");
        self.inner.resolver_queue.enqueue_all(requests);
        container
    }

    /// Adds an account to this client's repertoire, paired with the
    /// provider named by [`Account::provider`]. The account is passed to
    /// the provider on [`Client::start`].
    ///
    /// # Errors
    ///
    /// Returns [`UnknownProvider`] when no registered provider carries
    /// that name.
    pub fn use_account(&self, account: Arc<dyn Account>) -> Result<(), UnknownProvider> {
        let name = account.provider().to_string();
        if self.inner.providers.get(&name).is_none() {
            return Err(UnknownProvider { name });
        }
        let mut accounts = self
            .inner
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        accounts.entry(name).or_default().push(account);
        Ok(())
    }

    /// Configures providers and spawns the worker tasks: one resolver
    /// worker plus the configured number of retrievers.
    pub fn start(&self) {
        debug!(retrievers = self.inner.retriever_count(), "client start");
        self.configure();
        tokio::spawn(resolve::work(Arc::clone(&self.inner)));
        for _ in 0..self.inner.retriever_count() {
            tokio::spawn(retrieve::work(Arc::clone(&self.inner)));
        }
    }

    /// Starts in resolve-only mode: no retrievers, online files complete
    /// at resolve time and stay on the resolved queue for the caller to
    /// drain.
    pub fn resolve(&self) {
        self.inner.retrievers.store(0, Ordering::Relaxed);
        self.start();
    }

    /// Starts in dry-run mode: prints what would be fetched instead of
    /// downloading.
    pub fn dry_run(&self) {
        self.inner.dry_run.store(true, Ordering::Relaxed);
        self.start();
    }

    /// Marks both queues as receiving no further input; workers terminate
    /// once the queues run empty. Call after the submitted containers have
    /// completed.
    pub fn finalize(&self) {
        self.inner.resolved_queue.finalize();
        self.inner.resolver_queue.finalize();
    }

    /// Closes both queues immediately, dropping buffered work.
    pub fn stop(&self) {
        self.inner.resolved_queue.stop();
        self.inner.resolver_queue.stop();
    }

    /// The queue of resolved files, e.g. for listing or draining in
    /// resolve-only mode.
    #[must_use]
    pub fn resolved_queue(&self) -> &Queue {
        &self.inner.resolved_queue
    }

    /// The provider registry this client consults.
    #[must_use]
    pub fn providers(&self) -> &Providers {
        &self.inner.providers
    }

    /// Number of retriever workers. Zero means resolve-only mode.
    #[must_use]
    pub fn retriever_count(&self) -> usize {
        self.inner.retriever_count()
    }

    /// Registers a hook called once per started download.
    pub fn on_download(&self, hook: impl Fn(&Arc<Download>) + Send + Sync + 'static) {
        Hooks::locked(&self.inner.hooks.download).push(Box::new(hook));
    }

    /// Registers a hook called when a download is skipped because the
    /// local file already matches.
    pub fn on_skip(&self, hook: impl Fn(&crate::file::OnlineFile) + Send + Sync + 'static) {
        Hooks::locked(&self.inner.hooks.skip).push(Box::new(hook));
    }

    /// Registers a hook called when retrieving a file fails.
    pub fn on_error(&self, hook: impl Fn(&File, &error::FetchError) + Send + Sync + 'static) {
        Hooks::locked(&self.inner.hooks.error).push(Box::new(hook));
    }

    /// Registers a hook called when a resolve step produces a terminal
    /// outcome. The URL is the one that was being resolved; errors ride
    /// along inside the errored [`File`] variant.
    pub fn on_resolve(&self, hook: impl Fn(&Url, &File) + Send + Sync + 'static) {
        Hooks::locked(&self.inner.hooks.resolve).push(Box::new(hook));
    }

    /// Registers a hook called when an offline file is encountered by the
    /// retriever.
    pub fn on_deadend(&self, hook: impl Fn(&Url) + Send + Sync + 'static) {
        Hooks::locked(&self.inner.hooks.deadend).push(Box::new(hook));
    }

    /// Passes the current account lists to every provider with the
    /// configuration capability. Sequential, so a provider's `configure`
    /// never races itself.
    fn configure(&self) {
        let accounts = self
            .inner
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for provider in self.inner.providers.iter() {
            if let Some(configured) = provider.configured() {
                let config = ProviderConfig {
                    accounts: accounts.get(provider.name()).cloned().unwrap_or_default(),
                };
                configured.configure(&config);
            }
        }
    }
}

/// One-shot resolve: spins up a resolve-only client, submits the URLs,
/// waits for completion and returns the drained outcomes.
pub async fn resolve_all(urls: Vec<Url>) -> Vec<File> {
    resolve_all_with(Client::builder().retrievers(0).build(), urls).await
}

/// Like [`resolve_all`] but on a caller-prepared client (custom providers
/// or accounts). The client must not have been started.
pub async fn resolve_all_with(client: Client, urls: Vec<Url>) -> Vec<File> {
    let expected = urls.len();
    let container = client.add_urls(urls);
    client.resolve();
    container.wait().await;
    client.finalize();
    let mut files = Vec::with_capacity(expected);
    while let Some(batch) = client.resolved_queue().drain().await {
        files.extend(
            batch
                .into_iter()
                .filter_map(|request| request.file().cloned()),
        );
    }
    files
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::provider::error::ResolveError;
    use crate::provider::{Resolvability, ResolverRef, SingleResolver};

    struct Offline;

    impl Provider for Offline {
        fn name(&self) -> &'static str {
            "offline"
        }

        fn resolver(&self) -> Option<ResolverRef<'_>> {
            Some(ResolverRef::Single(self))
        }
    }

    #[async_trait]
    impl SingleResolver for Offline {
        fn can_resolve(&self, _url: &Url) -> Resolvability {
            Resolvability::Single
        }

        async fn resolve_one(&self, request: Request) -> Result<Vec<Request>, ResolveError> {
            Ok(request.deadend(None).wrap())
        }
    }

    fn offline_client() -> Client {
        let mut providers = Providers::default();
        providers.register(Arc::new(Offline)).unwrap();
        Client::builder().retrievers(0).providers(providers).build()
    }

    struct TestAccount;

    impl Account for TestAccount {
        fn id(&self) -> String {
            "user".into()
        }

        fn provider(&self) -> &str {
            "offline"
        }

        fn to_json(&self) -> serde_json::Value {
            serde_json::json!({"id": "user"})
        }
    }

    #[tokio::test]
    async fn test_resolve_zero_urls_completes_immediately() {
        let files = resolve_all(Vec::new()).await;
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_only_drains_outcomes() {
        let urls = vec![
            Url::parse("http://h/a").unwrap(),
            Url::parse("http://h/b").unwrap(),
        ];
        let files = resolve_all_with(offline_client(), urls).await;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(File::is_offline));
    }

    #[tokio::test]
    async fn test_container_wait_after_completion() {
        let client = offline_client();
        let container = client.add_urls(vec![Url::parse("http://h/a").unwrap()]);
        client.resolve();
        container.wait().await;
        assert_eq!(container.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_use_account_rejects_unknown_provider() {
        let client = Client::builder().build();
        let err = client.use_account(Arc::new(TestAccount)).unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[tokio::test]
    async fn test_use_account_pairs_by_name() {
        let client = offline_client();
        client.use_account(Arc::new(TestAccount)).unwrap();
    }
}
