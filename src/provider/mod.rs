//! Provider plug-in contract and registry.
//!
//! A provider is a value with a [`name`](Provider::name) plus any subset of
//! orthogonal capabilities, surfaced through accessor methods that default
//! to `None`:
//!
//! - [`ResolverRef`] turns URLs into [`Request`] outcomes, alone
//!   ([`SingleResolver`]) or batched per provider ([`MultiResolver`]),
//! - [`Retriever`] produces the HTTP request that fetches an online file,
//! - [`Accountant`] creates and (de)serializes provider accounts,
//! - [`Configured`] receives the account list at client start.
//!
//! # Object safety
//!
//! The async capabilities use `async_trait`: native async traits are not
//! object-safe, and the registry hands out `Arc<dyn Provider>`.

mod basic;
pub mod error;

pub use basic::Basic;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::debug;
use url::Url;

use crate::file::OnlineFile;
use crate::request::Request;
use error::{DuplicateProvider, PromptError, ResolveError};

/// A provider's self-assessment for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolvability {
    /// This provider cannot handle the URL; ask the next one.
    Next,
    /// This provider can resolve the URL, but only on its own.
    Single,
    /// This provider can resolve the URL together with others it also
    /// answers `Multi` for.
    Multi,
}

/// Base trait every provider implements. Capabilities are opted into by
/// overriding the accessor methods.
pub trait Provider: Send + Sync + 'static {
    /// Unique provider name.
    fn name(&self) -> &'static str;

    /// Resolver capability, if any.
    fn resolver(&self) -> Option<ResolverRef<'_>> {
        None
    }

    /// Retriever capability, if any.
    fn retriever(&self) -> Option<&dyn Retriever> {
        None
    }

    /// Account-management capability, if any.
    fn accountant(&self) -> Option<&dyn Accountant> {
        None
    }

    /// Configuration hook, if any.
    fn configured(&self) -> Option<&dyn Configured> {
        None
    }
}

/// Either resolver shape a provider can expose.
#[derive(Clone, Copy)]
pub enum ResolverRef<'a> {
    /// Resolves one request at a time.
    Single(&'a dyn SingleResolver),
    /// Resolves co-arriving requests in one call.
    Multi(&'a dyn MultiResolver),
}

impl ResolverRef<'_> {
    /// Asks the resolver whether (and how) it can handle `url`.
    #[must_use]
    pub fn can_resolve(&self, url: &Url) -> Resolvability {
        match self {
            Self::Single(resolver) => resolver.can_resolve(url),
            Self::Multi(resolver) => resolver.can_resolve(url),
        }
    }
}

/// A provider that resolves requests one by one.
#[async_trait]
pub trait SingleResolver: Send + Sync {
    /// Whether this provider can read meta information for the URL.
    /// Must answer `Next` or `Single`.
    fn can_resolve(&self, url: &Url) -> Resolvability;

    /// Resolves one request into its children. A successful return is
    /// never empty.
    async fn resolve_one(&self, request: Request) -> Result<Vec<Request>, ResolveError>;
}

/// A provider that resolves several requests in one invocation, e.g. via a
/// batched API call.
#[async_trait]
pub trait MultiResolver: Send + Sync {
    /// Whether this provider can read meta information for the URL.
    /// Must answer `Next` or `Multi`.
    fn can_resolve(&self, url: &Url) -> Resolvability;

    /// Resolves a batch of requests into their children. A successful
    /// return is never empty.
    async fn resolve_many(&self, requests: Vec<Request>) -> Result<Vec<Request>, ResolveError>;
}

/// Describes the HTTP request that fetches a file. Cookies and transport
/// are the client's concern; the provider only states method, target,
/// headers and body.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Target URL.
    pub url: Url,
    /// Extra request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
}

impl HttpRequestSpec {
    /// A plain GET of `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self {
            method: reqwest::Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A provider that can download online files.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Suitability score for fetching `file`: `0` means cannot, higher
    /// means more suitable. The basic provider always answers `1`, so any
    /// score above that takes precedence. Providers should factor in
    /// remaining traffic and the like.
    fn can_retrieve(&self, file: &OnlineFile) -> u32;

    /// Builds the request spec that leads to the file's bytes.
    async fn retrieve(&self, file: &OnlineFile) -> Result<HttpRequestSpec, ResolveError>;
}

/// A persisted credential record for one provider.
pub trait Account: Send + Sync {
    /// Unique identifier, typically the username or e-mail.
    fn id(&self) -> String;

    /// Name of the provider this account belongs to. Used to pair the
    /// account with its provider without any runtime reflection.
    fn provider(&self) -> &str;

    /// Serializes the provider-defined payload.
    fn to_json(&self) -> serde_json::Value;
}

/// A provider that stores user accounts.
pub trait Accountant: Send + Sync {
    /// Creates an account from interactive user input.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when input is exhausted or unusable.
    fn new_account(&self, prompter: &dyn Prompter) -> Result<Box<dyn Account>, PromptError>;

    /// Deserializes a persisted payload against this provider's template.
    ///
    /// # Errors
    ///
    /// Returns the JSON error when the payload does not match the
    /// template.
    fn account_from_json(&self, data: &serde_json::Value)
    -> Result<Box<dyn Account>, serde_json::Error>;
}

/// Accounts handed to a provider at configure time.
pub struct ProviderConfig {
    /// Enabled accounts for this provider, deep-copied from the store.
    pub accounts: Vec<Arc<dyn Account>>,
}

/// A provider that wants configuration at client start. `configure` may be
/// called again later but never concurrently with itself.
pub trait Configured: Send + Sync {
    /// Receives the current account list.
    fn configure(&self, config: &ProviderConfig);
}

/// A question put to the user during interactive account entry.
#[derive(Debug, Clone)]
pub struct Field {
    /// Key under which the answer is returned.
    pub key: String,
    /// Prompt shown to the user.
    pub display: String,
    /// Whether the input must not be echoed.
    pub sensitive: bool,
    /// Default value, shown when non-empty.
    pub value: String,
}

impl Field {
    /// A plain visible field.
    #[must_use]
    pub fn plain(key: &str, display: &str) -> Self {
        Self {
            key: key.into(),
            display: display.into(),
            sensitive: false,
            value: String::new(),
        }
    }

    /// A hidden field (passwords, tokens).
    #[must_use]
    pub fn sensitive(key: &str, display: &str) -> Self {
        Self {
            key: key.into(),
            display: display.into(),
            sensitive: true,
            value: String::new(),
        }
    }
}

/// Asks the user for input during account creation.
pub trait Prompter {
    /// Asks for all fields and returns the answers keyed by field key.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] when input is exhausted or unreadable.
    fn get(&self, fields: &[Field]) -> Result<HashMap<String, String>, PromptError>;

    /// Reports a failure to the user.
    fn error(&self, display: &str);

    /// Reports success to the user.
    fn success(&self);
}

/// Registry of providers owned by a [`Client`](crate::client::Client).
///
/// Lookup scans newest-registered first; the basic provider is seeded at
/// the bottom by [`Providers::default`], so it is always consulted last
/// and later registrations override earlier ones.
#[derive(Clone)]
pub struct Providers {
    list: Vec<Arc<dyn Provider>>,
}

impl Providers {
    /// A registry with no providers at all. Most callers want
    /// [`Providers::default`] instead, which seeds the basic provider.
    #[must_use]
    pub fn empty() -> Self {
        Self { list: Vec::new() }
    }

    /// Registers a provider.
    ///
    /// # Errors
    ///
    /// Rejects a provider whose name is already taken.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> Result<(), DuplicateProvider> {
        if self.get(provider.name()).is_some() {
            return Err(DuplicateProvider {
                name: provider.name().to_string(),
            });
        }
        debug!(provider = provider.name(), "registering provider");
        self.list.push(provider);
        Ok(())
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Looks up a provider by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.find(|provider| provider.name() == name)
    }

    /// Returns the first provider satisfying the predicate, scanning in
    /// reverse registration order.
    #[must_use]
    pub fn find(&self, predicate: impl Fn(&dyn Provider) -> bool) -> Option<Arc<dyn Provider>> {
        self.list
            .iter()
            .rev()
            .find(|provider| predicate(provider.as_ref()))
            .cloned()
    }

    /// Iterates providers in reverse registration order (lookup order).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.list.iter().rev()
    }

    /// Determines who resolves `url`: the first provider (in lookup
    /// order) whose resolver answers something other than `Next`.
    #[must_use]
    pub(crate) fn resolvability(&self, url: &Url) -> Option<(Arc<dyn Provider>, Resolvability)> {
        for provider in self.iter() {
            if let Some(resolver) = provider.resolver() {
                match resolver.can_resolve(url) {
                    Resolvability::Next => {}
                    answer => return Some((Arc::clone(provider), answer)),
                }
            }
        }
        None
    }

    /// Picks the retriever with the highest non-zero suitability for
    /// `file`.
    #[must_use]
    pub(crate) fn best_retriever(&self, file: &OnlineFile) -> Option<Arc<dyn Provider>> {
        let mut best: Option<(u32, Arc<dyn Provider>)> = None;
        for provider in self.iter() {
            if let Some(retriever) = provider.retriever() {
                let score = retriever.can_retrieve(file);
                debug!(
                    file = file.name(),
                    provider = provider.name(),
                    score,
                    "retriever suitability"
                );
                if score > 0 && best.as_ref().is_none_or(|(top, _)| score > *top) {
                    best = Some((score, Arc::clone(provider)));
                }
            }
        }
        best.map(|(_, provider)| provider)
    }
}

impl Default for Providers {
    /// Registry with the basic provider pre-registered, guaranteeing every
    /// URL has at least one resolver and every online file a retriever.
    fn default() -> Self {
        let mut providers = Self::empty();
        providers
            .register(Arc::new(Basic::new()))
            .unwrap_or_else(|_| unreachable!("empty registry cannot hold a duplicate"));
        providers
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.list.iter().map(|provider| provider.name()).collect();
        f.debug_struct("Providers")
            .field("count", &self.list.len())
            .field("providers", &names)
            .finish()
    }
}
