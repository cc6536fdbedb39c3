//! Persistent provider-account store.
//!
//! Accounts live in one JSON file of shape
//! `{ provider_name: { account_id: { disabled?, provider, data } } }`,
//! where `data` is an opaque payload decoded against the owning
//! provider's template. One serializer task per file owns the in-memory
//! tree: every operation is a job on its channel, every mutation is saved
//! to disk *before* the caller's completion signal fires, and a file
//! watcher reloads the tree when the file is edited externally.
//!
//! Stores for the same path are shared process-wide through
//! [`AccountStore::shared`].

pub mod error;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use notify::{RecursiveMode, Watcher};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::provider::{Account, Accountant};
use error::StoreError;

/// One persisted account record as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Whether the account is disabled for pipeline use.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    /// Owning provider name.
    pub provider: String,
    /// Provider-defined payload.
    pub data: Value,
}

/// Listing entry: a record plus its id.
#[derive(Debug, Clone, Serialize)]
pub struct AccountMetadata {
    /// Account id (typically username or e-mail).
    pub id: String,
    /// Owning provider name.
    pub provider: String,
    /// Whether the account is disabled.
    pub disabled: bool,
    /// Provider-defined payload.
    pub data: Value,
}

type Root = HashMap<String, HashMap<String, AccountRecord>>;

enum StoreJob {
    Mutate {
        apply: Box<dyn FnOnce(&mut Root) -> bool + Send>,
        done: oneshot::Sender<bool>,
    },
    Query {
        read: Box<dyn FnOnce(&Root) + Send>,
    },
}

static STORES: Lazy<Mutex<HashMap<PathBuf, AccountStore>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Handle to a file-backed account store.
#[derive(Debug, Clone)]
pub struct AccountStore {
    jobs: mpsc::UnboundedSender<StoreJob>,
    path: PathBuf,
}

impl AccountStore {
    /// The process-wide store for `path` (default: the platform accounts
    /// file). Callers naming the same path share one serializer task.
    #[must_use]
    pub fn shared(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(crate::paths::accounts_file);
        let mut stores = STORES.lock().unwrap_or_else(|e| e.into_inner());
        stores
            .entry(path.clone())
            .or_insert_with(|| Self::open(path))
            .clone()
    }

    /// Opens a dedicated store for `path`, bypassing the process-wide
    /// index. Useful for embedding and tests; regular callers want
    /// [`AccountStore::shared`].
    #[must_use]
    pub fn open(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(mkdir_error) = std::fs::create_dir_all(parent) {
                error!(path = %path.display(), error = %mkdir_error, "cannot create accounts dir");
            }
        }
        let (jobs, rx) = mpsc::unbounded_channel();
        tokio::spawn(serialize(path.clone(), rx));
        Self { jobs, path }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists an account record. Returns once the record has been saved
    /// to disk.
    pub async fn add_account(&self, account: &dyn Account) {
        let id = account.id();
        let provider = account.provider().to_string();
        let data = account.to_json();
        self.mutate(move |root| {
            root.entry(provider.clone()).or_default().insert(
                id,
                AccountRecord {
                    disabled: false,
                    provider,
                    data,
                },
            );
            true
        })
        .await;
    }

    /// Enabled accounts of one provider, decoded against the provider's
    /// template. Each call decodes fresh copies, so callers can never
    /// mutate store state through the result. Ordering is unspecified.
    pub async fn accounts(
        &self,
        provider: &str,
        accountant: &dyn Accountant,
    ) -> Vec<Box<dyn Account>> {
        let name = provider.to_string();
        let payloads: Vec<Value> = self
            .query(move |root| {
                root.get(&name)
                    .map(|records| {
                        records
                            .values()
                            .filter(|record| !record.disabled)
                            .map(|record| record.data.clone())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .await;
        payloads
            .iter()
            .filter_map(|payload| match accountant.account_from_json(payload) {
                Ok(account) => Some(account),
                Err(decode_error) => {
                    warn!(provider, error = %decode_error, "undecodable account record");
                    None
                }
            })
            .collect()
    }

    /// All records of one provider, disabled ones included. Ordering is
    /// unspecified.
    pub async fn metadata(&self, provider: &str) -> Vec<AccountMetadata> {
        let name = provider.to_string();
        self.query(move |root| {
            root.get(&name)
                .map(|records| {
                    records
                        .iter()
                        .map(|(id, record)| AccountMetadata {
                            id: id.clone(),
                            provider: record.provider.clone(),
                            disabled: record.disabled,
                            data: record.data.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
        .await
    }

    /// Disables an account. Returns whether the id existed.
    pub async fn disable(&self, provider: &str, id: &str) -> bool {
        self.toggle(provider, id, true).await
    }

    /// Enables an account. Returns whether the id existed.
    pub async fn enable(&self, provider: &str, id: &str) -> bool {
        self.toggle(provider, id, false).await
    }

    async fn toggle(&self, provider: &str, id: &str, disabled: bool) -> bool {
        let provider = provider.to_string();
        let id = id.to_string();
        self.mutate(move |root| {
            root.get_mut(&provider)
                .and_then(|records| records.get_mut(&id))
                .map(|record| {
                    record.disabled = disabled;
                    true
                })
                .unwrap_or(false)
        })
        .await
    }

    async fn mutate(&self, apply: impl FnOnce(&mut Root) -> bool + Send + 'static) -> bool {
        let (done, rx) = oneshot::channel();
        if self
            .jobs
            .send(StoreJob::Mutate {
                apply: Box::new(apply),
                done,
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    async fn query<T: Send + 'static>(&self, read: impl FnOnce(&Root) -> T + Send + 'static) -> T
    where
        T: Default,
    {
        let (reply, rx) = oneshot::channel();
        let job = StoreJob::Query {
            read: Box::new(move |root| {
                let _ = reply.send(read(root));
            }),
        };
        if self.jobs.send(job).is_err() {
            return T::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// Serializer task: owns the in-memory tree, applies jobs, saves after
/// every mutation, reloads on external file changes.
async fn serialize(path: PathBuf, mut jobs: mpsc::UnboundedReceiver<StoreJob>) {
    let mut root = load(&path);

    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel();
    let mut watcher = match notify::recommended_watcher(move |event| {
        let _ = watch_tx.send(event);
    }) {
        Ok(watcher) => Some(watcher),
        Err(watch_error) => {
            error!(path = %path.display(), error = %watch_error, "cannot initialize file watcher");
            None
        }
    };
    if let Some(watcher) = watcher.as_mut() {
        if let Err(watch_error) = watcher.watch(&path, RecursiveMode::NonRecursive) {
            error!(path = %path.display(), error = %watch_error, "cannot watch accounts file");
        }
    }
    let mut watching = watcher.is_some();

    loop {
        tokio::select! {
            event = watch_rx.recv(), if watching => match event {
                Some(Ok(event)) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        debug!(path = %path.display(), "accounts file changed, reloading");
                        root = load(&path);
                    }
                }
                Some(Err(watch_error)) => {
                    error!(path = %path.display(), error = %watch_error, "watch error");
                }
                None => watching = false,
            },
            job = jobs.recv() => match job {
                Some(StoreJob::Query { read }) => read(&root),
                Some(StoreJob::Mutate { apply, done }) => {
                    let outcome = apply(&mut root);
                    if let Err(save_error) = save(&path, &root).await {
                        error!(path = %path.display(), error = %save_error, "saving accounts failed");
                    }
                    // The completion signal deliberately fires only after
                    // the save so a caller shutting down right after a
                    // mutation cannot lose it.
                    let _ = done.send(outcome);
                }
                None => break,
            },
        }
    }
}

/// Reads the accounts file. A missing file is created holding `{}`;
/// unreadable or malformed content degrades to an empty tree.
fn load(path: &Path) -> Root {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(read_error) if read_error.kind() == std::io::ErrorKind::NotFound => {
            if let Err(create_error) = std::fs::write(path, "{}") {
                error!(path = %path.display(), error = %create_error, "cannot create accounts file");
            }
            return Root::default();
        }
        Err(read_error) => {
            error!(path = %path.display(), error = %read_error, "cannot read accounts file");
            return Root::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(root) => root,
        Err(parse_error) => {
            error!(path = %path.display(), error = %parse_error, "malformed accounts file");
            Root::default()
        }
    }
}

async fn save(path: &Path, root: &Root) -> Result<(), StoreError> {
    let pretty = serde_json::to_string_pretty(root)
        .map_err(|encode_error| StoreError::json(path, encode_error))?;
    tokio::fs::write(path, pretty)
        .await
        .map_err(|write_error| StoreError::io(path, write_error))?;
    debug!(path = %path.display(), "accounts saved");
    Ok(())
}
