//! Thin client for a Consul-compatible key-value store.
//!
//! Covers exactly the surface the control plane needs: plain gets, recursive
//! lists, raw puts, compare-and-set writes, deletes, and batched atomic
//! transactions. Every query reports the store's `X-Consul-Index` so callers
//! can drive blocking long-polls; see
//! <https://developer.hashicorp.com/consul/api-docs/kv> and
//! <https://developer.hashicorp.com/consul/api-docs/txn>.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Method, StatusCode};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Options for a (possibly blocking) read query.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    /// Block until the key's index advances past this value.
    pub last_index: u64,
    /// Upper bound for the block; zero disables blocking.
    pub wait: Duration,
}

/// Metadata returned with every read query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// The store's index at response time, monotonically advancing per key.
    pub last_index: u64,
}

/// One KV entry as returned by the store.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvEntry {
    pub create_index: u64,
    pub modify_index: u64,
    pub lock_index: u64,
    pub key: String,
    pub flags: u64,
    #[serde(default, deserialize_with = "deserialize_base64")]
    pub value: Vec<u8>,
    #[serde(default)]
    pub session: String,
}

fn deserialize_base64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error> {
    let encoded: Option<String> = Option::deserialize(deserializer)?;
    match encoded {
        Some(s) => BASE64.decode(s).map_err(serde::de::Error::custom),
        None => Ok(Vec::new()),
    }
}

fn serialize_base64<S: Serializer>(value: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(value))
}

/// A KV operation inside a transaction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxnOpKv {
    pub verb: TxnVerb,
    pub key: String,
    #[serde(serialize_with = "serialize_base64")]
    pub value: Vec<u8>,
    #[serde(skip_serializing_if = "is_zero")]
    pub index: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnVerb {
    Set,
    Cas,
}

#[derive(Debug, Default, Deserialize)]
pub struct TxnResponse {
    #[serde(rename = "Results")]
    pub results: Option<Vec<serde_json::Value>>,
    #[serde(rename = "Errors")]
    pub errors: Option<Vec<TxnError>>,
}

#[derive(Debug, Deserialize)]
pub struct TxnError {
    #[serde(rename = "OpIndex")]
    pub op_index: u64,
    #[serde(rename = "What")]
    pub what: String,
}

/// A batched atomic transaction, built op by op and committed once.
pub struct Txn<'a> {
    client: &'a Client,
    ops: Vec<serde_json::Value>,
}

impl Txn<'_> {
    /// Append one KV operation.
    pub fn kv(mut self, op: TxnOpKv) -> Self {
        self.ops.push(serde_json::json!({ "KV": op }));
        self
    }

    /// Commit the transaction. Returns `(true, response)` when the store
    /// committed every op, `(false, response)` on a conflict (the response
    /// carries per-op errors), and `Err` for any other failure.
    pub async fn commit(self, cancel: &CancellationToken) -> Result<(bool, TxnResponse)> {
        let req = self
            .client
            .request(Method::PUT, "/v1/txn")
            .json(&self.ops);
        let resp = race(cancel, req.send()).await??;
        let status = resp.status();
        if status == StatusCode::OK || status == StatusCode::CONFLICT {
            let body = race(cancel, resp.bytes()).await??;
            let txn_resp: TxnResponse = serde_json::from_slice(&body)?;
            return Ok((status == StatusCode::OK, txn_resp));
        }
        Err(http_error(status, race(cancel, resp.bytes()).await??.as_ref()))
    }
}

/// HTTP client for one KV store endpoint.
pub struct Client {
    http: reqwest::Client,
    addr: String,
    token: String,
}

impl Client {
    /// `addr` is the store's base address; a bare `host:port` defaults to
    /// `http://`. `token` is sent as `X-Consul-Token` when non-empty.
    pub fn new(addr: &str, token: &str) -> Self {
        let mut addr = addr.trim_end_matches('/').to_string();
        if !addr.contains("://") {
            addr = format!("http://{addr}");
        }
        Client {
            http: reqwest::Client::new(),
            addr,
            token: token.to_string(),
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.addr, path));
        if !self.token.is_empty() {
            req = req.header("X-Consul-Token", &self.token);
        }
        req
    }

    fn kv_path(key: &str) -> String {
        format!("/v1/kv/{}", key.trim_start_matches('/'))
    }

    /// Shared read path: performs the query, extracts the index metadata,
    /// and folds 404 into `None`.
    async fn query(
        &self,
        cancel: &CancellationToken,
        path: &str,
        params: &[(&str, &str)],
        options: QueryOptions,
    ) -> Result<(Option<bytes::Bytes>, QueryMeta)> {
        let mut req = self.request(Method::GET, path);
        for (k, v) in params {
            req = req.query(&[(k, v)]);
        }
        if options.last_index > 0 {
            req = req.query(&[("index", options.last_index.to_string())]);
        }
        if !options.wait.is_zero() {
            req = req.query(&[("wait", format!("{}ms", options.wait.as_millis()))]);
        }

        let resp = race(cancel, req.send()).await??;
        let meta = QueryMeta {
            last_index: consul_index(resp.headers()),
        };
        let status = resp.status();
        let body = race(cancel, resp.bytes()).await??;
        if status == StatusCode::NOT_FOUND {
            return Ok((None, meta));
        }
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok((Some(body), meta))
    }

    /// Read one key. Absent keys answer `None`; the metadata still carries
    /// the store index, which blocking callers record.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        key: &str,
        options: QueryOptions,
    ) -> Result<(Option<KvEntry>, QueryMeta)> {
        let (body, meta) = self
            .query(cancel, &Self::kv_path(key), &[], options)
            .await?;
        match body {
            Some(body) => {
                let entries: Vec<KvEntry> = serde_json::from_slice(&body)?;
                Ok((entries.into_iter().next(), meta))
            }
            None => Ok((None, meta)),
        }
    }

    /// List every key under `prefix`, lexicographically sorted by the store.
    /// An absent prefix answers an empty list.
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        prefix: &str,
        options: QueryOptions,
    ) -> Result<(Vec<KvEntry>, QueryMeta)> {
        let (body, meta) = self
            .query(cancel, &Self::kv_path(prefix), &[("recurse", "true")], options)
            .await?;
        match body {
            Some(body) => {
                let entries: Vec<KvEntry> = serde_json::from_slice(&body)?;
                Ok((entries, meta))
            }
            None => Ok((Vec::new(), meta)),
        }
    }

    /// Unconditional write. The store answers whether the write was applied.
    pub async fn put(&self, cancel: &CancellationToken, key: &str, value: Vec<u8>) -> Result<bool> {
        self.write(cancel, key, value, &[]).await
    }

    /// Compare-and-set write: applied only if the key's `ModifyIndex` still
    /// equals `index` (zero means "only if absent").
    pub async fn cas(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: Vec<u8>,
        index: u64,
    ) -> Result<bool> {
        self.write(cancel, key, value, &[("cas", &index.to_string())])
            .await
    }

    pub async fn delete(&self, cancel: &CancellationToken, key: &str) -> Result<bool> {
        let req = self.request(Method::DELETE, &Self::kv_path(key));
        let resp = race(cancel, req.send()).await??;
        Self::bool_body(cancel, resp).await
    }

    /// Remove every key under `prefix`.
    pub async fn delete_tree(&self, cancel: &CancellationToken, prefix: &str) -> Result<bool> {
        let req = self
            .request(Method::DELETE, &Self::kv_path(prefix))
            .query(&[("recurse", "true")]);
        let resp = race(cancel, req.send()).await??;
        Self::bool_body(cancel, resp).await
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: Vec<u8>,
        params: &[(&str, &str)],
    ) -> Result<bool> {
        let mut req = self.request(Method::PUT, &Self::kv_path(key));
        for (k, v) in params {
            req = req.query(&[(k, v)]);
        }
        let resp = race(cancel, req.body(value).send()).await??;
        Self::bool_body(cancel, resp).await
    }

    async fn bool_body(cancel: &CancellationToken, resp: reqwest::Response) -> Result<bool> {
        let status = resp.status();
        let body = race(cancel, resp.bytes()).await??;
        if !status.is_success() {
            return Err(http_error(status, &body));
        }
        Ok(String::from_utf8_lossy(&body).trim() == "true")
    }

    /// Start a transaction against this client.
    pub fn txn(&self) -> Txn<'_> {
        Txn {
            client: self,
            ops: Vec::new(),
        }
    }
}

/// Race a KV request against the caller's cancellation token.
async fn race<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}

fn consul_index(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get("X-Consul-Index")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn http_error(status: StatusCode, body: &[u8]) -> Error {
    Error::Http {
        code: status.as_u16(),
        content: String::from_utf8_lossy(body).into_owned(),
    }
}
