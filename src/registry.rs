// ABOUTME: Endpoint registry: descriptors, handler type erasure, and discovery
// ABOUTME: One Registry instance per TarpServer, read-only once serving starts

//! Endpoint registry and the type-erased handler signature shared by all
//! four endpoint flavors.
//!
//! Axum's static `Router::route` table doesn't fit endpoints registered at
//! runtime, so dispatch is done by hand: every flavor's handler is erased to
//! the same `Handler` signature and looked up by name out of a plain
//! `HashMap`, mirroring how the teacher crate's REST module dispatches
//! through a single fallback handler against its own handler map instead of
//! per-route registration.

use crate::envelope::{RawPayload, ResultValue};
use crate::error::{Result, TarpError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Endpoint flavor, fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flavor {
    Get,
    Post,
    Rpc,
    #[serde(rename = "ASYNCRPC")]
    AsyncRpc,
}

/// A single query parameter value after flattening: `flatten_qs` in the
/// Python original collapses a single-element value list to a scalar and
/// leaves repeated keys as a list.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Single(String),
    Multi(Vec<String>),
}

impl QueryValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            QueryValue::Single(s) => Some(s),
            QueryValue::Multi(v) => v.first().map(String::as_str),
        }
    }
}

pub type QueryMap = HashMap<String, QueryValue>;

/// Flatten a raw list of query pairs the way the Python original's
/// `flatten_qs` does: repeated keys become a list, singletons become scalars.
pub fn flatten_query(pairs: Vec<(String, String)>) -> QueryMap {
    let mut multi: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in pairs {
        multi.entry(k).or_default().push(v);
    }
    multi
        .into_iter()
        .map(|(k, mut values)| {
            if values.len() == 1 {
                (k, QueryValue::Single(values.pop().unwrap()))
            } else {
                (k, QueryValue::Multi(values))
            }
        })
        .collect()
}

/// A parsed POST body, shaped by the request's Content-Type header.
#[derive(Debug, Clone)]
pub enum BodyValue {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// What a handler returns before it is wrapped into a response.
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    /// Wrapped in a success envelope (`{status, mimetype, result}`).
    Value(ResultValue),
    /// Bypasses the envelope entirely.
    Raw(RawPayload),
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        HandlerOutput::Value(value.into())
    }
}

impl From<ResultValue> for HandlerOutput {
    fn from(value: ResultValue) -> Self {
        HandlerOutput::Value(value)
    }
}

impl From<RawPayload> for HandlerOutput {
    fn from(value: RawPayload) -> Self {
        HandlerOutput::Raw(value)
    }
}

impl From<String> for HandlerOutput {
    fn from(value: String) -> Self {
        HandlerOutput::Value(ResultValue::String(value))
    }
}

/// The request shape passed to an erased handler. Every flavor is reduced
/// to one of these three variants so all four endpoint kinds can share a
/// single handler signature.
pub enum HandlerRequest {
    Get { query: QueryMap, body: BodyValue },
    Post { query: QueryMap, body: BodyValue },
    Rpc { args: Vec<Value>, kwargs: Map<String, Value> },
}

pub type Handler = Arc<dyn Fn(HandlerRequest) -> BoxFuture<'static, Result<HandlerOutput>> + Send + Sync>;

/// Metadata describing an endpoint, immutable once registered.
#[derive(Debug, Clone)]
pub struct EndpointDescriptor {
    pub name: String,
    pub flavor: Flavor,
    pub description: String,
    pub result_mimetype: Option<String>,
    pub query_params: Vec<String>,
    pub payload_mimetype: Option<String>,
    pub payload_schema: Option<Value>,
    pub suggested_wait: Option<u64>,
}

/// Builder for the optional parts of an [`EndpointDescriptor`].
///
/// Rust has no runtime docstring reflection, so unlike the Python original
/// a description is never inferred from a callback; omitting it falls back
/// to the literal default string, preserving the observable behavior
/// without inventing doc-comment introspection.
#[derive(Debug, Clone, Default)]
pub struct EndpointOptions {
    description: Option<String>,
    result_mimetype: Option<String>,
    query_params: Vec<String>,
    payload_mimetype: Option<String>,
    payload_schema: Option<Value>,
    suggested_wait: Option<u64>,
}

impl EndpointOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn result_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.result_mimetype = Some(mimetype.into());
        self
    }

    pub fn query_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn payload_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.payload_mimetype = Some(mimetype.into());
        self
    }

    pub fn payload_schema(mut self, schema: Value) -> Self {
        self.payload_schema = Some(schema);
        self
    }

    pub fn suggested_wait(mut self, seconds: u64) -> Self {
        self.suggested_wait = Some(seconds);
        self
    }

    fn into_descriptor(self, name: String, flavor: Flavor) -> EndpointDescriptor {
        EndpointDescriptor {
            name,
            flavor,
            description: self
                .description
                .unwrap_or_else(|| crate::constants::http::DEFAULT_DESCRIPTION.to_string()),
            result_mimetype: self.result_mimetype,
            query_params: self.query_params,
            payload_mimetype: self.payload_mimetype,
            payload_schema: self.payload_schema,
            suggested_wait: self.suggested_wait,
        }
    }
}

pub struct RegisteredEndpoint {
    pub descriptor: EndpointDescriptor,
    pub handler: Handler,
}

/// The four independent endpoint tables, one `Registry` per server. Populated
/// before `TarpServer::serve` and read-only thereafter.
#[derive(Default)]
pub struct Registry {
    get: HashMap<String, RegisteredEndpoint>,
    post: HashMap<String, RegisteredEndpoint>,
    rpc: HashMap<String, RegisteredEndpoint>,
    async_rpc: HashMap<String, RegisteredEndpoint>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_get<F, Fut>(&mut self, name: impl Into<String>, options: EndpointOptions, f: F)
    where
        F: Fn(QueryMap, BodyValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        let name = name.into();
        let descriptor = options.into_descriptor(name.clone(), Flavor::Get);
        let handler: Handler = Arc::new(move |req| match req {
            HandlerRequest::Get { query, body } => Box::pin(f(query, body)),
            _ => Box::pin(async { Err(TarpError::dispatch("GET handler received wrong request kind")) }),
        });
        self.get.insert(name, RegisteredEndpoint { descriptor, handler });
    }

    pub fn register_post<F, Fut>(&mut self, name: impl Into<String>, options: EndpointOptions, f: F)
    where
        F: Fn(QueryMap, BodyValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        let name = name.into();
        let descriptor = options.into_descriptor(name.clone(), Flavor::Post);
        let handler: Handler = Arc::new(move |req| match req {
            HandlerRequest::Post { query, body } => Box::pin(f(query, body)),
            _ => Box::pin(async { Err(TarpError::dispatch("POST handler received wrong request kind")) }),
        });
        self.post.insert(name, RegisteredEndpoint { descriptor, handler });
    }

    pub fn register_rpc<F, Fut>(&mut self, name: impl Into<String>, options: EndpointOptions, f: F)
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        let name = name.into();
        let descriptor = options.into_descriptor(name.clone(), Flavor::Rpc);
        let handler: Handler = Arc::new(move |req| match req {
            HandlerRequest::Rpc { args, kwargs } => Box::pin(f(args, kwargs)),
            _ => Box::pin(async { Err(TarpError::dispatch("RPC handler received wrong request kind")) }),
        });
        self.rpc.insert(name, RegisteredEndpoint { descriptor, handler });
    }

    pub fn register_async_rpc<F, Fut>(
        &mut self,
        name: impl Into<String>,
        options: EndpointOptions,
        f: F,
    )
    where
        F: Fn(Vec<Value>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HandlerOutput>> + Send + 'static,
    {
        let name = name.into();
        let descriptor = options.into_descriptor(name.clone(), Flavor::AsyncRpc);
        let handler: Handler = Arc::new(move |req| match req {
            HandlerRequest::Rpc { args, kwargs } => Box::pin(f(args, kwargs)),
            _ => Box::pin(async { Err(TarpError::dispatch("async RPC handler received wrong request kind")) }),
        });
        self.async_rpc.insert(name, RegisteredEndpoint { descriptor, handler });
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredEndpoint> {
        self.get.get(name)
    }

    pub fn post(&self, name: &str) -> Option<&RegisteredEndpoint> {
        self.post.get(name)
    }

    pub fn rpc(&self, name: &str) -> Option<&RegisteredEndpoint> {
        self.rpc.get(name)
    }

    pub fn async_rpc(&self, name: &str) -> Option<&RegisteredEndpoint> {
        self.async_rpc.get(name)
    }

    /// Build the `GET /` discovery record: a map with `GET`, `POST`, `RPC`,
    /// `ASYNCRPC` keys, each an ordered list of descriptor summaries exposing
    /// only the fields relevant to that flavor (§3's discovery-record shape).
    pub fn discovery(&self) -> Value {
        let summarize = |table: &HashMap<String, RegisteredEndpoint>| -> Value {
            let mut names: Vec<&String> = table.keys().collect();
            names.sort();
            Value::Array(
                names
                    .into_iter()
                    .map(|name| summarize_descriptor(&table[name].descriptor))
                    .collect(),
            )
        };

        serde_json::json!({
            "GET": summarize(&self.get),
            "POST": summarize(&self.post),
            "RPC": summarize(&self.rpc),
            "ASYNCRPC": summarize(&self.async_rpc),
        })
    }
}

/// Summarize a single endpoint for the discovery record, including only the
/// fields its flavor actually uses: GET/POST carry `query_params`, POST alone
/// carries `payload_mimetype`/`payload_schema`, and only ASYNC_RPC carries
/// `suggested_wait`.
fn summarize_descriptor(descriptor: &EndpointDescriptor) -> Value {
    let mut entry = Map::new();
    entry.insert("name".to_string(), Value::from(descriptor.name.clone()));
    entry.insert(
        "description".to_string(),
        Value::from(descriptor.description.clone()),
    );
    entry.insert(
        "result_mimetype".to_string(),
        descriptor
            .result_mimetype
            .clone()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );

    match descriptor.flavor {
        Flavor::Get | Flavor::Post => {
            entry.insert(
                "query_params".to_string(),
                Value::from(descriptor.query_params.clone()),
            );
        }
        Flavor::Rpc | Flavor::AsyncRpc => {}
    }

    if descriptor.flavor == Flavor::Post {
        entry.insert(
            "payload_mimetype".to_string(),
            descriptor
                .payload_mimetype
                .clone()
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
        entry.insert(
            "payload_schema".to_string(),
            descriptor.payload_schema.clone().unwrap_or(Value::Null),
        );
    }

    if descriptor.flavor == Flavor::AsyncRpc {
        entry.insert(
            "suggested_wait".to_string(),
            descriptor
                .suggested_wait
                .map(Value::from)
                .unwrap_or(Value::Null),
        );
    }

    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_query_singleton() {
        let qm = flatten_query(vec![("name".to_string(), "alice".to_string())]);
        assert_eq!(qm["name"], QueryValue::Single("alice".to_string()));
    }

    #[test]
    fn test_flatten_query_repeated_key_becomes_list() {
        let qm = flatten_query(vec![
            ("tag".to_string(), "a".to_string()),
            ("tag".to_string(), "b".to_string()),
        ]);
        match &qm["tag"] {
            QueryValue::Multi(values) => assert_eq!(values, &vec!["a".to_string(), "b".to_string()]),
            _ => panic!("expected Multi"),
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup_get() {
        let mut registry = Registry::new();
        registry.register_get(
            "echo",
            EndpointOptions::new().description("echoes query"),
            |query, _body| async move {
                Ok(HandlerOutput::from(serde_json::json!({ "saw": query.len() })))
            },
        );

        let endpoint = registry.get("echo").expect("endpoint registered");
        assert_eq!(endpoint.descriptor.description, "echoes query");

        let result = (endpoint.handler)(HandlerRequest::Get {
            query: QueryMap::new(),
            body: BodyValue::Bytes(Vec::new()),
        })
        .await
        .unwrap();
        assert!(matches!(result, HandlerOutput::Value(_)));
    }

    #[test]
    fn test_default_description_fallback() {
        let options = EndpointOptions::new();
        let descriptor = options.into_descriptor("x".to_string(), Flavor::Get);
        assert_eq!(descriptor.description, crate::constants::http::DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_discovery_lists_registered_names() {
        let mut registry = Registry::new();
        registry.register_get("a", EndpointOptions::new(), |_, _| async { Ok(HandlerOutput::from(Value::Null)) });
        registry.register_post("b", EndpointOptions::new(), |_, _| async { Ok(HandlerOutput::from(Value::Null)) });
        let discovery = registry.discovery();
        assert_eq!(discovery["GET"].as_array().unwrap().len(), 1);
        assert_eq!(discovery["POST"].as_array().unwrap().len(), 1);
        assert_eq!(discovery["RPC"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_discovery_summary_is_scoped_by_flavor() {
        let mut registry = Registry::new();
        registry.register_get(
            "echo",
            EndpointOptions::new().query_params(["name"]),
            |_, _| async { Ok(HandlerOutput::from(Value::Null)) },
        );
        registry.register_post(
            "upload",
            EndpointOptions::new()
                .payload_mimetype("application/json")
                .payload_schema(serde_json::json!({"type": "object"})),
            |_, _| async { Ok(HandlerOutput::from(Value::Null)) },
        );
        registry.register_rpc("add", EndpointOptions::new(), |_, _| async {
            Ok(HandlerOutput::from(Value::Null))
        });
        registry.register_async_rpc("job", EndpointOptions::new().suggested_wait(9), |_, _| async {
            Ok(HandlerOutput::from(Value::Null))
        });

        let discovery = registry.discovery();

        let get_entry = &discovery["GET"][0];
        assert_eq!(get_entry["query_params"], serde_json::json!(["name"]));
        assert!(get_entry.get("payload_mimetype").is_none());
        assert!(get_entry.get("suggested_wait").is_none());

        let post_entry = &discovery["POST"][0];
        assert_eq!(post_entry["payload_mimetype"], "application/json");
        assert_eq!(post_entry["payload_schema"], serde_json::json!({"type": "object"}));

        let rpc_entry = &discovery["RPC"][0];
        assert!(rpc_entry.get("query_params").is_none());
        assert!(rpc_entry.get("payload_mimetype").is_none());

        let async_entry = &discovery["ASYNCRPC"][0];
        assert_eq!(async_entry["suggested_wait"], 9);
        assert!(async_entry.get("query_params").is_none());
    }
}
