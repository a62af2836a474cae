// ABOUTME: TARP client proxy: discovery, endpoint bindings, envelope enforcement
// ABOUTME: Rust has no monkey-patch equivalent, so bindings are exposed as typed methods plus a lookup table

//! The TARP client proxy.
//!
//! [`TarpClient::connect`] issues `GET /`, decodes the discovery record, and
//! builds an [`EndpointBinding`] for every advertised endpoint. Unlike the
//! Python original — which monkey-patches one callable per endpoint onto the
//! client object — Rust has no runtime attribute injection, so bindings are
//! exposed two ways: direct typed methods (`call_get`, `call_post`,
//! `call_rpc`, `call_async_rpc`) and a lookup table (`endpoint`/`endpoints`)
//! so callers can enumerate what a server advertised without macros or
//! codegen.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::client::common::ClientConfig;
use crate::constants::{http, paths};
use crate::error::{Result, TarpError};
use crate::registry::Flavor;
use crate::rpc;

/// A discovered endpoint's metadata, parsed out of the `GET /` discovery
/// record. Mirrors [`crate::registry::EndpointDescriptor`] but client-side:
/// the client never constructs one directly, only discovers it.
#[derive(Debug, Clone)]
pub struct EndpointBinding {
    pub name: String,
    pub flavor: Flavor,
    pub description: String,
    pub result_mimetype: Option<String>,
    pub query_params: Vec<String>,
    pub payload_mimetype: Option<String>,
    pub payload_schema: Option<Value>,
    pub suggested_wait: Option<u64>,
}

/// What a GET/POST call returns: either a decoded JSON result alongside its
/// mimetype, or the raw bytes of a non-JSON response (e.g. an image).
#[derive(Debug, Clone)]
pub enum ClientResponse {
    Json { mimetype: String, result: Value },
    Raw { mimetype: String, bytes: Vec<u8> },
}

impl ClientResponse {
    pub fn mimetype(&self) -> &str {
        match self {
            ClientResponse::Json { mimetype, .. } => mimetype,
            ClientResponse::Raw { mimetype, .. } => mimetype,
        }
    }
}

/// What a POST call sends as its body.
#[derive(Debug, Clone)]
pub enum PostPayload {
    Json(Value),
    Raw(Vec<u8>),
}

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    default_retry_after: u64,
    bindings: HashMap<String, EndpointBinding>,
}

/// A connected TARP client, bound to whatever a server advertised at
/// discovery time. Cheap to clone: all state is behind an `Arc`.
#[derive(Clone)]
pub struct TarpClient {
    inner: Arc<ClientInner>,
}

impl TarpClient {
    /// Connect to `config.base_url`, discover its endpoints, and bind them.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if let Some(ca_path) = &config.server_key {
            let pem = tokio::fs::read(ca_path)
                .await
                .map_err(|e| TarpError::config(format!("failed to read server_key {ca_path:?}: {e}")))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| TarpError::config(format!("invalid server_key certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| TarpError::transport(format!("failed to build HTTP client: {e}")))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        let discovery_resp = http
            .get(&base_url)
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("discovery request failed: {e}")))?;

        let response = handle_response(discovery_resp, config.default_retry_after).await?;
        let record = match response {
            ClientResponse::Json { result, .. } => result,
            ClientResponse::Raw { .. } => {
                return Err(TarpError::dispatch("discovery response was not JSON"))
            }
        };

        let bindings = parse_discovery_record(&record);

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                default_retry_after: config.default_retry_after,
                bindings,
            }),
        })
    }

    /// Look up a discovered endpoint's metadata by name.
    pub fn endpoint(&self, name: &str) -> Option<&EndpointBinding> {
        self.inner.bindings.get(name)
    }

    /// Iterate every endpoint the server advertised at discovery time.
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointBinding> {
        self.inner.bindings.values()
    }

    /// Guarded configuration view: refuses to let a caller pick a key that
    /// collides with a discovered endpoint name, the Rust realization of the
    /// Python original's `configInfo` shadow-namespace guard.
    pub fn config(&self) -> ClientConfigView<'_> {
        ClientConfigView { client: self }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Call a discovered GET endpoint. `query` is URL-encoded verbatim.
    pub async fn call_get(&self, name: &str, query: &[(&str, &str)]) -> Result<ClientResponse> {
        let request = self.inner.http.get(self.url(&format!("/{name}")));
        let request = if query.is_empty() {
            request
        } else {
            request.query(query)
        };
        let resp = request
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("GET /{name} failed: {e}")))?;
        handle_response(resp, self.inner.default_retry_after).await
    }

    /// Call a discovered POST endpoint. A JSON payload is sent as
    /// `application/json`; anything else is sent as
    /// `application/octet-stream`, matching §4.5.
    pub async fn call_post(
        &self,
        name: &str,
        payload: PostPayload,
        query: &[(&str, &str)],
    ) -> Result<ClientResponse> {
        let mut request = self.inner.http.post(self.url(&format!("/{name}")));
        if !query.is_empty() {
            request = request.query(query);
        }
        request = match payload {
            PostPayload::Json(value) => request
                .header(reqwest::header::CONTENT_TYPE, http::CONTENT_TYPE_JSON)
                .json(&value),
            PostPayload::Raw(bytes) => request
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(bytes),
        };
        let resp = request
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("POST /{name} failed: {e}")))?;
        handle_response(resp, self.inner.default_retry_after).await
    }

    /// Call a discovered synchronous RPC endpoint, returning the decoded
    /// result value directly (not the `(mimetype, result)` pair): a non-JSON
    /// RPC response is an error per §4.5.
    pub async fn call_rpc(&self, name: &str, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value> {
        let frame = rpc::encode_frame(&args, &kwargs)?;
        let resp = self
            .inner
            .http
            .post(self.url(&format!("/{name}")))
            .header(reqwest::header::CONTENT_TYPE, http::CONTENT_TYPE_JSON)
            .json(&frame)
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("RPC /{name} failed: {e}")))?;

        match handle_response(resp, self.inner.default_retry_after).await? {
            ClientResponse::Json { result, .. } => rpc::decode_payload(&result),
            ClientResponse::Raw { .. } => Err(TarpError::dispatch("RPC response was not JSON")),
        }
    }

    /// Call a discovered asynchronous RPC endpoint, returning a handle that
    /// can be probed, polled, or blocked on.
    pub async fn call_async_rpc(
        &self,
        name: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<AsyncHandle> {
        let frame = rpc::encode_frame(&args, &kwargs)?;
        let resp = self
            .inner
            .http
            .post(self.url(&format!("/{name}")))
            .header(reqwest::header::CONTENT_TYPE, http::CONTENT_TYPE_JSON)
            .json(&frame)
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("async RPC /{name} failed: {e}")))?;

        let result = match handle_response(resp, self.inner.default_retry_after).await? {
            ClientResponse::Json { result, .. } => result,
            ClientResponse::Raw { .. } => {
                return Err(TarpError::dispatch("async RPC submission response was not JSON"))
            }
        };

        let id_str = result
            .get("ID")
            .and_then(Value::as_str)
            .ok_or_else(|| TarpError::dispatch("async RPC submission missing 'ID'"))?;
        let id = Uuid::parse_str(id_str)
            .map_err(|e| TarpError::dispatch(format!("async RPC submission has invalid id: {e}")))?;
        let suggested_wait = result
            .get("suggested_wait")
            .and_then(Value::as_u64)
            .unwrap_or(self.inner.default_retry_after);

        Ok(AsyncHandle {
            client: self.clone(),
            id,
            suggested_wait,
        })
    }

    async fn async_probe(&self, id: Uuid) -> Result<(JobStatus, u64)> {
        let resp = self
            .inner
            .http
            .get(self.url(paths::ASYNC_PROBE))
            .query(&[(paths::JOB_ID_PARAM, id.to_string())])
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("asyncProbe failed: {e}")))?;

        let result = match handle_response(resp, self.inner.default_retry_after).await? {
            ClientResponse::Json { result, .. } => result,
            ClientResponse::Raw { .. } => return Err(TarpError::dispatch("asyncProbe response was not JSON")),
        };

        let status = match result.get("status").and_then(Value::as_str) {
            Some("completed") => JobStatus::Completed,
            _ => JobStatus::InProgress,
        };
        let suggested_wait = result
            .get("suggested_wait")
            .and_then(Value::as_u64)
            .unwrap_or(self.inner.default_retry_after);
        Ok((status, suggested_wait))
    }

    async fn async_get(&self, id: Uuid) -> Result<Value> {
        let resp = self
            .inner
            .http
            .get(self.url(paths::ASYNC_GET))
            .query(&[(paths::JOB_ID_PARAM, id.to_string())])
            .send()
            .await
            .map_err(|e| TarpError::transport(format!("asyncGet failed: {e}")))?;

        match handle_response(resp, self.inner.default_retry_after).await? {
            ClientResponse::Json { result, .. } => rpc::decode_payload(&result),
            ClientResponse::Raw { .. } => Err(TarpError::dispatch("asyncGet response was not JSON")),
        }
    }
}

/// Guarded setter view returned by [`TarpClient::config`]. Refuses to shadow
/// a discovered endpoint name, the realization of the Python original's
/// `configInfo.__setattr__` guard.
pub struct ClientConfigView<'a> {
    client: &'a TarpClient,
}

impl ClientConfigView<'_> {
    /// Set a local configuration key, rejecting names that collide with a
    /// discovered endpoint binding.
    pub fn set(&self, key: &str, value: Value, store: &mut HashMap<String, Value>) -> Result<()> {
        if self.client.inner.bindings.contains_key(key) {
            return Err(TarpError::config(format!(
                "'{key}' is a bound remote endpoint name and cannot be used as a config key"
            )));
        }
        store.insert(key.to_string(), value);
        Ok(())
    }

    /// The set of names a caller may not use as a config key.
    pub fn reserved_names(&self) -> HashSet<&str> {
        self.client.inner.bindings.keys().map(String::as_str).collect()
    }
}

/// Non-destructive job status, as observed via `asyncProbe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Completed,
}

/// A handle to a submitted async RPC job, returned by
/// [`TarpClient::call_async_rpc`].
#[derive(Clone)]
pub struct AsyncHandle {
    client: TarpClient,
    id: Uuid,
    suggested_wait: u64,
}

impl AsyncHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Non-destructive status check.
    pub async fn status(&self) -> Result<JobStatus> {
        let (status, _) = self.client.async_probe(self.id).await?;
        Ok(status)
    }

    /// Alias for [`AsyncHandle::status`], matching §4.5's `probe()` naming.
    pub async fn probe(&self) -> Result<JobStatus> {
        self.status().await
    }

    /// One polling step: `Some(value)` if the job had completed and its
    /// result was just retrieved (consuming it), `None` if still running.
    pub async fn wait_cycle(&self) -> Result<Option<Value>> {
        let (status, _) = self.client.async_probe(self.id).await?;
        match status {
            JobStatus::InProgress => Ok(None),
            JobStatus::Completed => self.client.async_get(self.id).await.map(Some),
        }
    }

    /// Block, polling with the server-suggested backoff, until the job
    /// completes, then return its value.
    pub async fn wait(&self) -> Result<Value> {
        loop {
            match self.client.async_get(self.id).await {
                Ok(value) => return Ok(value),
                Err(TarpError::OperationInProgress { retry_after, .. }) => {
                    let wait = retry_after.unwrap_or(self.suggested_wait).max(1);
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn parse_discovery_record(record: &Value) -> HashMap<String, EndpointBinding> {
    let mut bindings = HashMap::new();
    for (key, flavor) in [
        ("GET", Flavor::Get),
        ("POST", Flavor::Post),
        ("RPC", Flavor::Rpc),
        ("ASYNCRPC", Flavor::AsyncRpc),
    ] {
        let Some(entries) = record.get(key).and_then(Value::as_array) else {
            continue;
        };
        for entry in entries {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                continue;
            };
            bindings.insert(
                name.to_string(),
                EndpointBinding {
                    name: name.to_string(),
                    flavor,
                    description: entry
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    result_mimetype: entry
                        .get("result_mimetype")
                        .and_then(Value::as_str)
                        .map(String::from),
                    query_params: entry
                        .get("query_params")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                    payload_mimetype: entry
                        .get("payload_mimetype")
                        .and_then(Value::as_str)
                        .map(String::from),
                    payload_schema: entry.get("payload_schema").cloned().filter(|v| !v.is_null()),
                    suggested_wait: entry.get("suggested_wait").and_then(Value::as_u64),
                },
            );
        }
    }
    bindings
}

/// Envelope enforcement shared by every request the client makes: checks
/// HTTP status first, then the envelope's `status`/`type`, per §4.5.
async fn handle_response(resp: reqwest::Response, default_retry_after: u64) -> Result<ClientResponse> {
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    let retry_after_header = resp
        .headers()
        .get(http::HEADER_RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let is_json = content_type == http::CONTENT_TYPE_JSON;

    if status == StatusCode::NOT_FOUND {
        return Err(TarpError::registry("endpoint or job not found"));
    }

    if !status.is_success() {
        if !is_json {
            return Err(TarpError::handler(format!("request failed with status {status}")));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| TarpError::transport(format!("failed to decode error envelope: {e}")))?;
        let kind = body.get("type").and_then(Value::as_str).unwrap_or("generic");
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        return Err(match kind {
            "OperationInProgress" => TarpError::operation_in_progress(
                message,
                Some(retry_after_header.unwrap_or(default_retry_after)),
            ),
            "InvalidServerState" => TarpError::invalid_server_state(message),
            _ => TarpError::handler(message),
        });
    }

    if !is_json {
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TarpError::transport(format!("failed to read response body: {e}")))?
            .to_vec();
        return Ok(ClientResponse::Raw {
            mimetype: content_type,
            bytes,
        });
    }

    let envelope: Value = resp
        .json()
        .await
        .map_err(|e| TarpError::transport(format!("failed to decode envelope: {e}")))?;

    if envelope.get("status").and_then(Value::as_str) != Some("success") {
        let message = envelope
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request did not succeed")
            .to_string();
        return Err(TarpError::handler(message));
    }

    let mimetype = envelope
        .get("mimetype")
        .and_then(Value::as_str)
        .unwrap_or(http::CONTENT_TYPE_JSON)
        .to_string();
    let result = envelope.get("result").cloned().unwrap_or(Value::Null);
    Ok(ClientResponse::Json { mimetype, result })
}
