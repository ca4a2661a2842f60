//! Consumer-side registry watching.
//!
//! The [`Registry`] long-polls the producer's notify key and, on change,
//! re-lists the published data tree, reconciling a per-server file cache
//! against the store's `ModifyIndex` values so only changed files are
//! gunzipped and reparsed. How a server's descriptor set becomes user
//! content is pluggable through the [`Extractor`] trait; [`RouteExtractor`]
//! is the shipped implementation producing the gateway route table.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::time::Duration;

use prost::Message;
use tokio_util::sync::CancellationToken;

use crate::descriptor::Parser;
use crate::error::{Error, Result};
use crate::kv::{Client, KvEntry, QueryOptions};
use crate::metadata::Route;
use crate::pb;
use crate::resolve::{resolve_routes, ResolvingCache};

/// Upper bound for one blocking poll of the notify key.
const WAIT_TIME: Duration = Duration::from_secs(60);
/// Delay before re-polling after an error or an unchanged index.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Turns one server's full descriptor set into user content.
///
/// The registry is parametric over the content type; it hands every
/// extractor call the server's complete current file set, in file-name
/// order. An extractor error aborts the surrounding sync.
pub trait Extractor {
    type Content;

    fn extract(&self, files: &[pb::FileDescriptorProto]) -> Result<Self::Content>;
}

/// The standard extractor: parse the server's files and resolve them into
/// routes, strictly (a server publishing a broken descriptor set fails the
/// sync rather than silently losing routes).
pub struct RouteExtractor;

impl Extractor for RouteExtractor {
    type Content = Vec<Route>;

    fn extract(&self, files: &[pb::FileDescriptorProto]) -> Result<Vec<Route>> {
        let mut parser = Parser::new();
        for f in files {
            parser.add_file(f)?;
        }
        let mut cache = ResolvingCache::new();
        resolve_routes(&mut cache, &parser, parser.services(), false)
    }
}

struct FileEntry {
    descriptor: pb::FileDescriptorProto,
    index: u64,
}

struct ServerEntry<C> {
    files: HashMap<String, FileEntry>,
    content: Option<C>,
}

impl<C> Default for ServerEntry<C> {
    fn default() -> Self {
        ServerEntry {
            files: HashMap::new(),
            content: None,
        }
    }
}

struct RegistryState<C> {
    /// Root index of the last observed data listing; advances monotonically.
    known_index: u64,
    servers: HashMap<String, ServerEntry<C>>,
}

/// Watches the registry and keeps per-server extracted content current.
///
/// One `watch` loop and any number of concurrent `sync` calls are
/// supported; the internal mutex serializes all cache mutation.
pub struct Registry<E: Extractor> {
    client: Client,
    prefix: String,
    extractor: E,
    state: tokio::sync::Mutex<RegistryState<E::Content>>,
}

impl<E: Extractor> Registry<E> {
    pub fn new(client: Client, prefix: &str, extractor: E) -> Self {
        Registry {
            client,
            prefix: prefix.to_string(),
            extractor,
            state: tokio::sync::Mutex::new(RegistryState {
                known_index: 0,
                servers: HashMap::new(),
            }),
        }
    }

    /// Reconcile the cache against the store.
    ///
    /// Returns `None` when the data tree's root index is unchanged (and
    /// `force` is off) or when re-listing produced no effective difference;
    /// otherwise returns the extracted content of every live server, in
    /// server-name order. With `force`, the cache is discarded and every
    /// file is reparsed.
    ///
    /// The new root index is recorded before reconciling, so an index whose
    /// reconcile fails is not retried forever.
    pub async fn sync(
        &self,
        cancel: &CancellationToken,
        force: bool,
    ) -> Result<Option<Vec<E::Content>>>
    where
        E::Content: Clone,
    {
        let key_prefix = format!("{}/data/", self.prefix);

        let mut state = self.state.lock().await;
        let (entries, meta) = self
            .client
            .list(cancel, &key_prefix, QueryOptions::default())
            .await?;

        if state.known_index == meta.last_index && !force {
            return Ok(None);
        }
        state.known_index = meta.last_index;

        if force {
            state.servers.clear();
        }

        let mut changed = false;
        let mut seen: HashSet<String> = HashSet::new();
        let mut i = 0;
        while i < entries.len() {
            let server = split_server(&key_prefix, &entries[i])?;
            // The listing is sorted, so one server's entries are contiguous.
            let mut j = i + 1;
            while j < entries.len()
                && split_server(&key_prefix, &entries[j]).is_ok_and(|s| s == server)
            {
                j += 1;
            }
            changed |= self.reconcile_server(&mut state, &key_prefix, server, &entries[i..j])?;
            seen.insert(server.to_string());
            i = j;
        }

        if state.servers.len() > seen.len() {
            state.servers.retain(|name, _| {
                let keep = seen.contains(name);
                if !keep {
                    tracing::debug!(server = %name, "server removed from registry");
                }
                keep
            });
            changed = true;
        }

        if !changed {
            return Ok(None);
        }

        let mut names: Vec<&String> = state.servers.keys().collect();
        names.sort();
        let mut contents = Vec::with_capacity(names.len());
        for name in names {
            if let Some(content) = &state.servers[name.as_str()].content {
                contents.push(content.clone());
            }
        }
        Ok(Some(contents))
    }

    fn reconcile_server(
        &self,
        state: &mut RegistryState<E::Content>,
        key_prefix: &str,
        server: &str,
        run: &[KvEntry],
    ) -> Result<bool> {
        let entry = state.servers.entry(server.to_string()).or_default();
        let mut changed = false;

        for e in run {
            let file = &e.key[key_prefix.len() + server.len() + 1..];
            if entry.files.get(file).is_some_and(|f| f.index == e.modify_index) {
                continue;
            }
            let raw = gzip_decompress(&e.value)?;
            let descriptor = pb::FileDescriptorProto::decode(raw.as_slice())?;
            entry.files.insert(
                file.to_string(),
                FileEntry {
                    descriptor,
                    index: e.modify_index,
                },
            );
            tracing::debug!(server, file, index = e.modify_index, "descriptor updated");
            changed = true;
        }

        if entry.files.len() > run.len() {
            // The server shrank: drop files absent from this listing.
            let inuse: HashSet<&str> = run
                .iter()
                .map(|e| &e.key[key_prefix.len() + server.len() + 1..])
                .collect();
            entry.files.retain(|name, _| inuse.contains(name.as_str()));
            changed = true;
        }

        if changed {
            let mut names: Vec<&String> = entry.files.keys().collect();
            names.sort();
            let files: Vec<pb::FileDescriptorProto> = names
                .iter()
                .map(|n| entry.files[n.as_str()].descriptor.clone())
                .collect();
            entry.content = Some(self.extractor.extract(&files)?);
        }

        Ok(changed)
    }

    /// Block on the notify key and invoke `update` whenever it changes.
    ///
    /// Transient poll errors and unchanged indices back off for
    /// [`RETRY_DELAY`] and retry. An error from `update` terminates the loop
    /// without an error of its own (the consumer already saw the failure).
    /// Cancellation exits cleanly.
    pub async fn watch<F, Fut>(&self, cancel: &CancellationToken, mut update: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let key = format!("{}/notify", self.prefix);
        let mut last_notified = 0u64;
        while !cancel.is_cancelled() {
            let polled = self
                .client
                .get(
                    cancel,
                    &key,
                    QueryOptions {
                        last_index: last_notified,
                        wait: WAIT_TIME,
                    },
                )
                .await;
            match polled {
                Err(Error::Cancelled) => break,
                Err(err) => {
                    tracing::warn!(error = %err, "notify poll failed");
                    if pause(cancel).await.is_err() {
                        break;
                    }
                }
                Ok((None, meta)) => {
                    // Bootstrapping: nothing published yet. Record the index
                    // so the next poll blocks instead of spinning.
                    last_notified = meta.last_index;
                    if pause(cancel).await.is_err() {
                        break;
                    }
                }
                Ok((Some(_), meta)) if meta.last_index == last_notified => {
                    // Poll timed out without a change.
                    if pause(cancel).await.is_err() {
                        break;
                    }
                }
                Ok((Some(_), meta)) => {
                    if update().await.is_err() {
                        return Ok(());
                    }
                    last_notified = meta.last_index;
                }
            }
        }
        Ok(())
    }
}

impl Registry<RouteExtractor> {
    /// Route-table form of [`Registry::sync`]: the per-server route lists
    /// flattened into one table.
    pub async fn sync_routes(
        &self,
        cancel: &CancellationToken,
        force: bool,
    ) -> Result<Option<Vec<Route>>> {
        Ok(self
            .sync(cancel, force)
            .await?
            .map(|contents| contents.into_iter().flatten().collect()))
    }
}

/// Extract the server component of a data key. The key must have the
/// `<prefix><server>/<file>` shape.
fn split_server<'a>(key_prefix: &str, entry: &'a KvEntry) -> Result<&'a str> {
    let rest = entry
        .key
        .strip_prefix(key_prefix)
        .ok_or_else(|| Error::MalformedKey(entry.key.clone()))?;
    match rest.find('/') {
        Some(pos) if pos > 0 => Ok(&rest[..pos]),
        _ => Err(Error::MalformedKey(entry.key.clone())),
    }
}

async fn pause(cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(RETRY_DELAY) => Ok(()),
    }
}

fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
