//! In-process Consul-compatible KV server.
//!
//! Implements just enough of the Consul HTTP API for protogate's
//! integration tests: raw and CAS puts, recursive listing, deletes, the
//! `/v1/txn` endpoint, `X-Consul-Index` metadata, and blocking queries via
//! `?index=N&wait=T`. State is a single in-memory map with a global
//! monotonic index, the same model a single-node store presents.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use tokio::sync::watch;

type Params = std::collections::HashMap<String, String>;

#[derive(Clone)]
struct StoredEntry {
    create_index: u64,
    modify_index: u64,
    value: Vec<u8>,
}

struct StoreInner {
    index: u64,
    entries: BTreeMap<String, StoredEntry>,
}

struct Store {
    inner: Mutex<StoreInner>,
    changes: watch::Sender<u64>,
}

impl Store {
    fn new() -> Self {
        Store {
            inner: Mutex::new(StoreInner {
                index: 0,
                entries: BTreeMap::new(),
            }),
            changes: watch::channel(0).0,
        }
    }

    fn notify(&self, index: u64) {
        let _ = self.changes.send(index);
    }
}

/// A running mock server. The HTTP task is aborted on drop.
pub struct MockConsul {
    addr: String,
    store: Arc<Store>,
    server: tokio::task::JoinHandle<()>,
}

impl MockConsul {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        let store = Arc::new(Store::new());
        let app = Router::new()
            .route(
                "/v1/kv/*key",
                get(kv_read).put(kv_write).delete(kv_delete),
            )
            .route("/v1/txn", put(txn))
            .with_state(store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = format!(
            "127.0.0.1:{}",
            listener.local_addr().expect("local addr").port()
        );
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock consul serve");
        });

        MockConsul {
            addr,
            store,
            server,
        }
    }

    /// Address suitable for `Client::new` ("127.0.0.1:PORT").
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn modify_index(&self, key: &str) -> Option<u64> {
        let inner = self.store.inner.lock().unwrap();
        inner.entries.get(key).map(|e| e.modify_index)
    }

    pub fn create_index(&self, key: &str) -> Option<u64> {
        let inner = self.store.inner.lock().unwrap();
        inner.entries.get(key).map(|e| e.create_index)
    }

    pub fn value(&self, key: &str) -> Option<Vec<u8>> {
        let inner = self.store.inner.lock().unwrap();
        inner.entries.get(key).map(|e| e.value.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let inner = self.store.inner.lock().unwrap();
        inner.entries.keys().cloned().collect()
    }
}

impl Drop for MockConsul {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn parse_wait(raw: &str) -> Duration {
    if let Some(ms) = raw.strip_suffix("ms") {
        return Duration::from_millis(ms.parse().unwrap_or(0));
    }
    if let Some(s) = raw.strip_suffix('s') {
        return Duration::from_secs(s.parse().unwrap_or(0));
    }
    Duration::from_secs(raw.parse().unwrap_or(0))
}

fn entry_json(key: &str, e: &StoredEntry) -> serde_json::Value {
    json!({
        "CreateIndex": e.create_index,
        "ModifyIndex": e.modify_index,
        "LockIndex": 0,
        "Key": key,
        "Flags": 0,
        "Value": BASE64.encode(&e.value),
        "Session": ""
    })
}

/// Snapshot the matching entries and the index they answer with. A single
/// key answers its own `ModifyIndex`; recurse queries answer the store
/// index, which also advances on deletions (Consul keeps tombstones for the
/// same reason). Empty results answer the store index.
fn snapshot(store: &Store, key: &str, recurse: bool) -> (u64, Option<String>) {
    let inner = store.inner.lock().unwrap();
    let matches: Vec<(&String, &StoredEntry)> = if recurse {
        inner
            .entries
            .range(key.to_string()..)
            .take_while(|(k, _)| k.starts_with(key))
            .collect()
    } else {
        inner.entries.get_key_value(key).into_iter().collect()
    };

    if matches.is_empty() {
        return (inner.index, None);
    }
    let index = if recurse {
        inner.index
    } else {
        matches[0].1.modify_index
    };
    let body = serde_json::Value::Array(
        matches.iter().map(|(k, e)| entry_json(k, e)).collect(),
    )
    .to_string();
    (index, Some(body))
}

async fn kv_read(
    State(store): State<Arc<Store>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    let recurse = params.contains_key("recurse");
    let want: Option<u64> = params.get("index").and_then(|v| v.parse().ok());
    let wait = params
        .get("wait")
        .map(|v| parse_wait(v))
        .unwrap_or(Duration::from_secs(5));
    let deadline = tokio::time::Instant::now() + wait;
    let mut rx = store.changes.subscribe();

    loop {
        let (index, body) = snapshot(&store, &key, recurse);
        // Block while the caller has already seen this index.
        if let Some(w) = want {
            if index <= w {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    changed = rx.changed() => {
                        if changed.is_ok() {
                            continue;
                        }
                    }
                }
            }
        }
        let header = [("X-Consul-Index", index.to_string())];
        return match body {
            Some(body) => (StatusCode::OK, header, body).into_response(),
            None => (StatusCode::NOT_FOUND, header, String::new()).into_response(),
        };
    }
}

async fn kv_write(
    State(store): State<Arc<Store>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
    body: Bytes,
) -> impl IntoResponse {
    let cas: Option<u64> = params.get("cas").and_then(|v| v.parse().ok());
    let (ok, index) = {
        let mut inner = store.inner.lock().unwrap();
        if apply_write(&mut inner, &key, &body, cas) {
            (true, inner.index)
        } else {
            (false, inner.index)
        }
    };
    if ok {
        store.notify(index);
    }
    (StatusCode::OK, if ok { "true" } else { "false" })
}

fn apply_write(inner: &mut StoreInner, key: &str, value: &[u8], cas: Option<u64>) -> bool {
    let existing = inner.entries.get(key);
    let allowed = match cas {
        None => true,
        Some(0) => existing.is_none(),
        Some(v) => existing.is_some_and(|e| e.modify_index == v),
    };
    if !allowed {
        return false;
    }
    inner.index += 1;
    let index = inner.index;
    match inner.entries.get_mut(key) {
        Some(e) => {
            e.modify_index = index;
            e.value = value.to_vec();
        }
        None => {
            inner.entries.insert(
                key.to_string(),
                StoredEntry {
                    create_index: index,
                    modify_index: index,
                    value: value.to_vec(),
                },
            );
        }
    }
    true
}

async fn kv_delete(
    State(store): State<Arc<Store>>,
    Path(key): Path<String>,
    Query(params): Query<Params>,
) -> impl IntoResponse {
    let recurse = params.contains_key("recurse");
    let index = {
        let mut inner = store.inner.lock().unwrap();
        let removed: Vec<String> = if recurse {
            inner
                .entries
                .range(key.clone()..)
                .take_while(|(k, _)| k.starts_with(&key))
                .map(|(k, _)| k.clone())
                .collect()
        } else {
            inner.entries.contains_key(&key).then(|| key.clone()).into_iter().collect()
        };
        if removed.is_empty() {
            None
        } else {
            for k in &removed {
                inner.entries.remove(k);
            }
            inner.index += 1;
            Some(inner.index)
        }
    };
    if let Some(index) = index {
        store.notify(index);
    }
    (StatusCode::OK, "true")
}

async fn txn(State(store): State<Arc<Store>>, body: Bytes) -> Response {
    let ops: Vec<serde_json::Value> = match serde_json::from_slice(&body) {
        Ok(ops) => ops,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };

    let (status, response, index) = {
        let mut inner = store.inner.lock().unwrap();

        // Verify every precondition before applying anything: the
        // transaction is all-or-nothing.
        let mut errors = Vec::new();
        for (i, op) in ops.iter().enumerate() {
            let kv = &op["KV"];
            let key = kv["Key"].as_str().unwrap_or("");
            match kv["Verb"].as_str().unwrap_or("") {
                "set" => {}
                "cas" => {
                    let want = kv["Index"].as_u64().unwrap_or(0);
                    let existing = inner.entries.get(key);
                    let ok = if want == 0 {
                        existing.is_none()
                    } else {
                        existing.is_some_and(|e| e.modify_index == want)
                    };
                    if !ok {
                        errors.push(json!({
                            "OpIndex": i,
                            "What": format!("failed index check for key \"{key}\""),
                        }));
                    }
                }
                verb => {
                    errors.push(json!({
                        "OpIndex": i,
                        "What": format!("unknown KV verb \"{verb}\""),
                    }));
                }
            }
        }

        if !errors.is_empty() {
            (
                StatusCode::CONFLICT,
                json!({ "Results": null, "Errors": errors }),
                None,
            )
        } else {
            let mut results = Vec::new();
            for op in &ops {
                let kv = &op["KV"];
                let key = kv["Key"].as_str().unwrap_or("");
                let value = kv["Value"]
                    .as_str()
                    .and_then(|v| BASE64.decode(v).ok())
                    .unwrap_or_default();
                apply_write(&mut inner, key, &value, None);
                let e = &inner.entries[key];
                results.push(json!({
                    "KV": {
                        "Key": key,
                        "CreateIndex": e.create_index,
                        "ModifyIndex": e.modify_index,
                    }
                }));
            }
            (
                StatusCode::OK,
                json!({ "Results": results, "Errors": null }),
                Some(inner.index),
            )
        }
    };
    if let Some(index) = index {
        store.notify(index);
    }
    (status, response.to_string()).into_response()
}
