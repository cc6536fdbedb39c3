//! Request lineage trees.
//!
//! Every submitted URL becomes the root of a small append-only tree: each
//! resolve step either terminates a request with a [`File`] or generates
//! child requests. The tree itself lives in a per-container arena of
//! `{parent, order}` nodes; a [`Request`] only carries an index into it,
//! so requests are cheap to clone and parent links are consulted purely
//! for ordering, never for ownership.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use url::Url;

use crate::container::WorkCounter;
use crate::file::{ErroredFile, File, FileMeta, OfflineFile, OnlineFile, url_id};
use crate::provider::error::ResolveError;

static ARENA_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
struct Node {
    parent: Option<usize>,
    order: u32,
}

/// Per-container arena of lineage nodes.
#[derive(Debug)]
pub(crate) struct Lineage {
    seq: u64,
    nodes: Mutex<Vec<Node>>,
}

impl Lineage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            seq: ARENA_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            nodes: Mutex::new(Vec::new()),
        })
    }

    fn push(&self, parent: Option<usize>, order: u32) -> usize {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.push(Node { parent, order });
        nodes.len() - 1
    }

    fn set_order(&self, node: usize, order: u32) {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes[node].order = order;
    }

    /// Order values along the path root..=node.
    fn order_path(&self, node: usize) -> Vec<u32> {
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let mut path = Vec::new();
        let mut current = Some(node);
        while let Some(index) = current {
            let entry = nodes[index];
            path.push(entry.order);
            current = entry.parent;
        }
        path.reverse();
        path
    }
}

/// An in-flight resolution attempt for a URL.
///
/// Unresolved requests flow through the resolver queue; a request with a
/// [`File`] attached is terminal and must never be resubmitted. The four
/// generating operations ([`Self::resolves_to`], [`Self::deadend`],
/// [`Self::errs`], [`Self::yields`]) plus [`Self::bundles`] are the only
/// way new requests enter a tree, and each may be called at most once per
/// request.
#[derive(Debug, Clone)]
pub struct Request {
    arena: Arc<Lineage>,
    node: usize,
    url: Url,
    root: Arc<Url>,
    file: Option<File>,
    counter: WorkCounter,
}

impl Request {
    /// Creates the root request of a tree. `rank` is the URL's position
    /// within its submission.
    pub(crate) fn root(arena: Arc<Lineage>, url: Url, rank: u32, counter: WorkCounter) -> Self {
        let node = arena.push(None, rank);
        Self {
            arena,
            node,
            root: Arc::new(url.clone()),
            url,
            file: None,
            counter,
        }
    }

    /// The URL being asked about at this step.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The root URL of this tree, as submitted by the caller.
    #[must_use]
    pub fn root_url(&self) -> &Url {
        &self.root
    }

    /// The terminal outcome, if this request is resolved.
    #[must_use]
    pub fn file(&self) -> Option<&File> {
        self.file.as_ref()
    }

    /// Whether this request is terminal.
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.file.is_some()
    }

    /// Identifier used by the queues: hex SHA-256 of the current URL.
    #[must_use]
    pub fn id(&self) -> String {
        url_id(&self.url)
    }

    /// Wraps this request in a singleton vec. Helper for single resolvers.
    #[must_use]
    pub fn wrap(self) -> Vec<Request> {
        vec![self]
    }

    /// Terminates this request with downloadable metadata.
    ///
    /// # Panics
    ///
    /// Panics if this request is already resolved.
    #[must_use]
    pub fn resolves_to(&self, meta: FileMeta) -> Request {
        let mut child = self.child(0);
        child.file = Some(File::Online(OnlineFile::new(meta, (*self.root).clone())));
        child
    }

    /// Terminates this request as a confirmed dead end. `url` names the
    /// final URL that turned out unavailable; `None` keeps the current one.
    ///
    /// # Panics
    ///
    /// Panics if this request is already resolved.
    #[must_use]
    pub fn deadend(&self, url: Option<Url>) -> Request {
        let mut child = self.child(0);
        let current = url.unwrap_or_else(|| self.url.clone());
        child.file = Some(File::Offline(OfflineFile::new(
            (*self.root).clone(),
            current,
        )));
        child
    }

    /// Terminates this request with a resolve failure.
    ///
    /// # Panics
    ///
    /// Panics if this request is already resolved.
    #[must_use]
    pub fn errs(&self, url: Url, error: ResolveError) -> Request {
        self.errs_shared(url, Arc::new(error))
    }

    pub(crate) fn errs_shared(&self, url: Url, error: Arc<ResolveError>) -> Request {
        let mut child = self.child(0);
        child.file = Some(File::Errored(ErroredFile::new(
            (*self.root).clone(),
            url,
            error,
        )));
        child
    }

    /// Hands this request off to a downstream provider under a new URL.
    ///
    /// # Panics
    ///
    /// Panics if this request is already resolved.
    #[must_use]
    pub fn yields(&self, url: Url) -> Request {
        let mut child = self.child(0);
        child.url = url;
        child
    }

    /// Expands this request into one child per URL, e.g. when it leads to
    /// a folder. Children keep their relative submission order.
    ///
    /// The container's outstanding-work counter grows by `n - 1`: the
    /// parent slot is consumed and each child opens a new one. An empty
    /// list is therefore a terminal no-op that just consumes the slot.
    ///
    /// # Panics
    ///
    /// Panics if this request is already resolved.
    #[must_use]
    pub fn bundles(&self, urls: Vec<Url>) -> Vec<Request> {
        self.counter.add(urls.len() as i64 - 1);
        urls.into_iter()
            .enumerate()
            .map(|(position, url)| {
                let mut child = self.child(position as u32);
                child.url = url;
                child
            })
            .collect()
    }

    /// Reports one unit of work done to the container.
    pub(crate) fn done(&self) {
        self.counter.done();
    }

    /// Whether this request is delivered before `other`.
    #[must_use]
    pub fn precedes(&self, other: &Request) -> bool {
        self.order_cmp(other) == Ordering::Less
    }

    /// Total order over requests: lexicographic comparison of the order
    /// values along the path from the root. A deeper path that extends a
    /// shallower one sorts after it; trees from distinct containers are
    /// ordered by container creation.
    pub(crate) fn order_cmp(&self, other: &Request) -> Ordering {
        if !Arc::ptr_eq(&self.arena, &other.arena) {
            return self.arena.seq.cmp(&other.arena.seq);
        }
        self.arena
            .order_path(self.node)
            .cmp(&other.arena.order_path(other.node))
            .then(self.node.cmp(&other.node))
    }

    pub(crate) fn set_order(&self, order: u32) {
        self.arena.set_order(self.node, order);
    }

    fn child(&self, order: u32) -> Request {
        assert!(
            !self.resolved(),
            "child requests cannot be created from a resolved request"
        );
        let node = self.arena.push(Some(self.node), order);
        Self {
            arena: Arc::clone(&self.arena),
            node,
            url: self.url.clone(),
            root: Arc::clone(&self.root),
            file: None,
            counter: self.counter.clone(),
        }
    }
}
