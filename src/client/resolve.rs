//! The resolve stage.
//!
//! A single worker drains whole batches from the resolver queue. Each
//! batch is grouped by resolvability (one invocation per `Single`
//! request, one invocation per provider for `Multi` requests) and the
//! invocations run concurrently. Returned children are routed as they
//! arrive: terminal outcomes move to the resolved queue (or complete
//! immediately), unresolved ones re-enter the resolver queue. Children
//! that resolve as `Multi` are collected and re-enqueued as one batch so
//! multi-resolvers see co-arriving siblings together.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::file::File;
use crate::provider::error::ResolveError;
use crate::provider::{Provider, Resolvability, ResolverRef};
use crate::request::Request;

use super::ClientInner;

/// Resolver worker loop. Exactly one runs per client.
pub(crate) async fn work(client: Arc<ClientInner>) {
    while let Some(batch) = client.resolver_queue.drain().await {
        debug!(count = batch.len(), "resolving batch");
        resolve_batch(&client, batch).await;
    }
    debug!("resolver worker exiting");
}

enum Unit {
    Single {
        provider: Arc<dyn Provider>,
        request: Request,
    },
    Multi {
        provider: Arc<dyn Provider>,
        requests: Vec<Request>,
    },
}

async fn resolve_batch(client: &Arc<ClientInner>, batch: Vec<Request>) {
    let units = group(client, batch);
    let mut invocations = JoinSet::new();
    for unit in units {
        invocations.spawn(run_unit(unit));
    }

    // Children resolving as Multi are buffered and re-enqueued together
    // once the whole batch has been joined.
    let mut multis = Vec::new();
    while let Some(joined) = invocations.join_next().await {
        match joined {
            Ok(children) => {
                for child in children {
                    route_child(client, child, &mut multis);
                }
            }
            Err(join_error) => {
                error!(error = %join_error, "resolve invocation panicked");
            }
        }
    }
    client.resolver_queue.enqueue_all(multis);
}

/// Groups a batch: `Single` requests get one unit each, `Multi` requests
/// are merged into one unit per provider.
fn group(client: &ClientInner, batch: Vec<Request>) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut multi: HashMap<&'static str, Unit> = HashMap::new();
    for request in batch {
        assert!(
            !request.resolved(),
            "resolved request resubmitted to the resolver: {}",
            request.url()
        );
        let Some((provider, answer)) = client.providers.resolvability(request.url()) else {
            unreachable!("no provider claimed {} (basic always answers)", request.url());
        };
        match answer {
            Resolvability::Single => units.push(Unit::Single { provider, request }),
            Resolvability::Multi => match multi.entry(provider.name()) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    if let Unit::Multi { requests, .. } = entry.get_mut() {
                        requests.push(request);
                    }
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    entry.insert(Unit::Multi {
                        provider,
                        requests: vec![request],
                    });
                }
            },
            Resolvability::Next => unreachable!("resolvability never returns Next"),
        }
    }
    units.extend(multi.into_values());
    units
}

/// Runs one provider invocation. Provider errors are absorbed into
/// errored terminals for the offending requests, never propagated.
async fn run_unit(unit: Unit) -> Vec<Request> {
    match unit {
        Unit::Single { provider, request } => {
            let Some(ResolverRef::Single(resolver)) = provider.resolver() else {
                unreachable!("provider {} lost its single resolver", provider.name());
            };
            match resolver.resolve_one(request.clone()).await {
                Ok(children) => {
                    warn_on_empty(provider.name(), &children);
                    children
                }
                Err(resolve_error) => {
                    warn!(url = %request.url(), error = %resolve_error, "resolve failed");
                    request.errs(request.url().clone(), resolve_error).wrap()
                }
            }
        }
        Unit::Multi { provider, requests } => {
            let Some(ResolverRef::Multi(resolver)) = provider.resolver() else {
                unreachable!("provider {} lost its multi resolver", provider.name());
            };
            match resolver.resolve_many(requests.clone()).await {
                Ok(children) => {
                    warn_on_empty(provider.name(), &children);
                    children
                }
                Err(resolve_error) => {
                    warn!(
                        provider = provider.name(),
                        error = %resolve_error,
                        "multi resolve failed"
                    );
                    let shared: Arc<ResolveError> = Arc::new(resolve_error);
                    requests
                        .iter()
                        .map(|request| {
                            request.errs_shared(request.url().clone(), Arc::clone(&shared))
                        })
                        .collect()
                }
            }
        }
    }
}

fn warn_on_empty(provider: &str, children: &[Request]) {
    if children.is_empty() {
        warn!(provider, "provider returned success with no requests");
    }
}

/// Routes one child request per the pipeline rules.
fn route_child(client: &ClientInner, child: Request, multis: &mut Vec<Request>) {
    let Some(file) = child.file().cloned() else {
        // Unresolved: goes around again. Multi children are buffered so
        // the multi-resolver sees the whole sibling group at once.
        match client.providers.resolvability(child.url()) {
            Some((_, Resolvability::Multi)) => multis.push(child),
            _ => client.resolver_queue.enqueue(child),
        }
        return;
    };

    // Enqueue strictly before done: a caller may finalize the queues the
    // moment the container counter hits zero, and a file enqueued after
    // that would be lost.
    let resolve_only = client.retriever_count() == 0;
    match &file {
        File::Online(_) => {
            if resolve_only {
                // No retriever will ever call done; collapse that step
                // and keep the file queued for the caller to drain.
                client.resolved_queue.enqueue(child.clone());
                child.done();
            } else {
                client.hooks.emit_resolve(child.url(), &file);
                client.resolved_queue.enqueue(child);
            }
        }
        File::Offline(_) => {
            client.hooks.emit_resolve(child.url(), &file);
            // The retriever routes offline files to the deadend event but
            // never calls done on them.
            client.resolved_queue.enqueue(child.clone());
            child.done();
        }
        File::Errored(_) => {
            client.hooks.emit_resolve(child.url(), &file);
            // Errored files must never reach a retriever; they are queued
            // only in resolve-only mode, where the caller drains directly.
            if resolve_only {
                client.resolved_queue.enqueue(child.clone());
            }
            child.done();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use async_trait::async_trait;
    use url::Url;

    use super::*;
    use crate::client::Client;
    use crate::file::{FILE_SIZE_UNKNOWN, FileMeta};
    use crate::provider::{Providers, SingleResolver};

    /// Expands `/folder/` URLs into two file URLs, resolves everything
    /// else online.
    struct Folder;

    impl Provider for Folder {
        fn name(&self) -> &'static str {
            "folder"
        }

        fn resolver(&self) -> Option<ResolverRef<'_>> {
            Some(ResolverRef::Single(self))
        }
    }

    #[async_trait]
    impl SingleResolver for Folder {
        fn can_resolve(&self, _url: &Url) -> Resolvability {
            Resolvability::Single
        }

        async fn resolve_one(&self, request: Request) -> Result<Vec<Request>, ResolveError> {
            let url = request.url().clone();
            if url.path().starts_with("/folder/") {
                let base = url.as_str().replace("/folder/", "/file-");
                Ok(request.bundles(vec![
                    Url::parse(&format!("{base}-1")).unwrap(),
                    Url::parse(&format!("{base}-2")).unwrap(),
                ]))
            } else {
                Ok(request
                    .resolves_to(FileMeta {
                        name: url.path().trim_start_matches('/').to_string(),
                        url,
                        size: FILE_SIZE_UNKNOWN,
                        checksum: None,
                        provider: "folder".into(),
                    })
                    .wrap())
            }
        }
    }

    #[tokio::test]
    async fn test_bundled_expansion_resolves_in_submission_order() {
        let mut providers = Providers::default();
        providers.register(Arc::new(Folder)).unwrap();
        let client = Client::builder().retrievers(0).providers(providers).build();
        let files = crate::client::resolve_all_with(
            client,
            vec![Url::parse("http://h/folder/42").unwrap()],
        )
        .await;
        assert_eq!(files.len(), 2);
        let names: Vec<&Url> = files.iter().map(File::url).collect();
        assert_eq!(names[0].as_str(), "http://h/file-42-1");
        assert_eq!(names[1].as_str(), "http://h/file-42-2");
    }

    /// Fails every resolve with a provider error.
    struct Failing;

    impl Provider for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn resolver(&self) -> Option<ResolverRef<'_>> {
            Some(ResolverRef::Single(self))
        }
    }

    #[async_trait]
    impl SingleResolver for Failing {
        fn can_resolve(&self, _url: &Url) -> Resolvability {
            Resolvability::Single
        }

        async fn resolve_one(&self, _request: Request) -> Result<Vec<Request>, ResolveError> {
            Err(ResolveError::provider("failing", "always fails"))
        }
    }

    #[tokio::test]
    async fn test_provider_errors_become_errored_terminals() {
        let mut providers = Providers::default();
        providers.register(Arc::new(Failing)).unwrap();
        let client = Client::builder().retrievers(0).providers(providers).build();
        let files =
            crate::client::resolve_all_with(client, vec![Url::parse("http://h/x").unwrap()]).await;
        assert_eq!(files.len(), 1);
        let error = files[0].error().expect("errored terminal");
        assert!(error.to_string().contains("always fails"));
    }
}
