// ABOUTME: TARP REST dispatcher: a single fallback Axum handler implementing routing
// ABOUTME: Query flattening, body parsing, handler-result shaping, failure->HTTP mapping

//! The TARP request router/dispatcher.
//!
//! Realized as one Axum fallback handler doing manual path/method dispatch
//! against the registry: Axum's static route table doesn't fit endpoints
//! registered at runtime, so — the same problem the teacher crate's
//! `server::rest` module solves with its own `HANDLER_REGISTRY` rather than
//! per-route `Router::route` calls — every request is routed by hand
//! against the four registry tables.

use crate::config::tls::TlsConfig;
use crate::constants::{http, limits, paths, timeouts};
use crate::envelope::{Envelope, RawPayload, ResultValue};
use crate::error::{Result, TarpError};
use crate::jobs::{JobStatus, JobTable, TokioWorkerPool, WorkerPool};
use crate::registry::{
    flatten_query, BodyValue, HandlerOutput, HandlerRequest, QueryMap, QueryValue,
    RegisteredEndpoint, Registry,
};
use crate::rpc;
use crate::server::common::TarpServerConfig;
use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

struct ServerState {
    registry: Arc<Registry>,
    job_table: JobTable,
    worker_pool: Arc<dyn WorkerPool>,
}

/// A TARP server bound to a registry, ready to serve.
///
/// Construction takes ownership of a fully-populated [`Registry`]: per
/// §4.2, the registry is read-only once serving starts, so there is no
/// method to register endpoints after `TarpServer::new`.
pub struct TarpServer {
    config: TarpServerConfig,
    state: Arc<ServerState>,
}

impl TarpServer {
    pub fn new(config: TarpServerConfig, registry: Registry) -> Self {
        let worker_pool: Arc<dyn WorkerPool> = Arc::new(TokioWorkerPool::new(config.max_workers));
        let job_table = JobTable::new(config.job_table.clone());
        let state = Arc::new(ServerState {
            registry: Arc::new(registry),
            job_table,
            worker_pool,
        });
        Self { config, state }
    }

    fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .layer(tower_http::trace::TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve until `tokio::signal::ctrl_c` resolves, then drain
    /// in-flight requests before returning.
    pub async fn serve(self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let app = self.router();

        if let Some(tls_config) = self.config.tls.clone() {
            return Self::serve_tls(bind_addr, app, tls_config).await;
        }

        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| TarpError::transport(format!("failed to bind to {bind_addr}: {e}")))?;

        tracing::info!(%bind_addr, "starting TARP server");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| TarpError::transport(format!("server error: {e}")))
    }

    #[cfg(feature = "tls")]
    async fn serve_tls(bind_addr: String, app: Router, tls_config: TlsConfig) -> Result<()> {
        let rustls_config = create_axum_rustls_config(&tls_config).await?;
        let addr = bind_addr
            .parse()
            .map_err(|e| TarpError::transport(format!("invalid bind address {bind_addr}: {e}")))?;

        tracing::info!(%bind_addr, "starting TARP server (TLS)");
        axum_server::bind_rustls(addr, rustls_config)
            .serve(app.into_make_service())
            .await
            .map_err(|e| TarpError::transport(format!("TLS server error: {e}")))
    }

    #[cfg(not(feature = "tls"))]
    async fn serve_tls(_bind_addr: String, _app: Router, _tls_config: TlsConfig) -> Result<()> {
        Err(TarpError::config("TLS support requires the 'tls' feature"))
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received, draining in-flight requests");
}

#[cfg(feature = "tls")]
async fn create_axum_rustls_config(
    tls_config: &TlsConfig,
) -> Result<axum_server::tls_rustls::RustlsConfig> {
    let server_config = tls_config.create_server_config().await?;
    Ok(axum_server::tls_rustls::RustlsConfig::from_config(server_config))
}

async fn dispatch(State(state): State<Arc<ServerState>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query_string = req.uri().query().unwrap_or("").to_string();
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body = match to_bytes(req.into_body(), limits::DEFAULT_MAX_REQUEST_SIZE).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(&TarpError::dispatch(format!(
                "failed to read request body: {e}"
            )))
        }
    };

    let name = path.trim_start_matches('/').to_string();

    let result = match method {
        Method::GET => dispatch_get(&state, &name, &query_string, &content_type, &body).await,
        Method::POST => dispatch_post(&state, &name, &query_string, &content_type, &body).await,
        other => Err(TarpError::dispatch(format!(
            "method {other} is not supported"
        ))),
    };

    match result {
        Ok(response) => response,
        Err(err) => error_response(&err),
    }
}

async fn dispatch_get(
    state: &ServerState,
    name: &str,
    query_string: &str,
    content_type: &str,
    body: &[u8],
) -> Result<Response> {
    if let Some(endpoint) = state.registry.get(name) {
        let query = parse_query(query_string);
        let body_value = parse_body(content_type, body);
        let output = (endpoint.handler)(HandlerRequest::Get {
            query,
            body: body_value,
        })
        .await?;
        return Ok(shape_handler_output(
            output,
            endpoint.descriptor.result_mimetype.as_deref(),
        ));
    }

    if name == paths::ASYNC_PROBE.trim_start_matches('/') {
        return async_probe_response(state, query_string).await;
    }

    if name == paths::ASYNC_GET.trim_start_matches('/') {
        return async_get_response(state, query_string).await;
    }

    if name.is_empty() {
        return Ok(success_json(state.registry.discovery()));
    }

    Err(TarpError::registry(format!("no GET endpoint named '{name}'")))
}

async fn dispatch_post(
    state: &ServerState,
    name: &str,
    query_string: &str,
    content_type: &str,
    body: &[u8],
) -> Result<Response> {
    if let Some(endpoint) = state.registry.rpc(name) {
        require_no_query_string(query_string, "RPC")?;
        return sync_rpc_response(endpoint, body).await;
    }

    if let Some(endpoint) = state.registry.async_rpc(name) {
        require_no_query_string(query_string, "async RPC")?;
        return async_rpc_response(state, endpoint, body).await;
    }

    if let Some(endpoint) = state.registry.post(name) {
        let query = parse_query(query_string);
        let body_value = parse_body(content_type, body);
        let output = (endpoint.handler)(HandlerRequest::Post {
            query,
            body: body_value,
        })
        .await?;
        return Ok(shape_handler_output(
            output,
            endpoint.descriptor.result_mimetype.as_deref(),
        ));
    }

    Err(TarpError::registry(format!("no POST endpoint named '{name}'")))
}

fn require_no_query_string(query_string: &str, flavor: &str) -> Result<()> {
    if query_string.is_empty() {
        Ok(())
    } else {
        Err(TarpError::dispatch(format!(
            "{flavor} requests must not include a query string"
        )))
    }
}

async fn sync_rpc_response(endpoint: &RegisteredEndpoint, body: &[u8]) -> Result<Response> {
    let (args, kwargs) = decode_rpc_frame(body)?;
    let output = (endpoint.handler)(HandlerRequest::Rpc { args, kwargs }).await?;
    let value = handler_output_to_value(output)?;
    let wrapped = rpc::encode_payload(&value)?;
    Ok(success_json(wrapped))
}

async fn async_rpc_response(
    state: &ServerState,
    endpoint: &RegisteredEndpoint,
    body: &[u8],
) -> Result<Response> {
    let (args, kwargs) = decode_rpc_frame(body)?;
    let suggested_wait = endpoint
        .descriptor
        .suggested_wait
        .unwrap_or(timeouts::DEFAULT_SUGGESTED_WAIT_SECS);
    let handler = endpoint.handler.clone();

    let future: crate::registry::BoxFuture<'static, Result<HandlerOutput>> = Box::pin(async move {
        let output = (handler)(HandlerRequest::Rpc { args, kwargs }).await?;
        let value = handler_output_to_value(output)?;
        let wrapped = rpc::encode_payload(&value)?;
        Ok(HandlerOutput::from(wrapped))
    });

    let id = state
        .job_table
        .submit(state.worker_pool.as_ref(), suggested_wait, future)
        .await;
    tracing::debug!(%id, suggested_wait, "submitted async RPC job");

    Ok(success_json(serde_json::json!({
        "ID": id.to_string(),
        "suggested_wait": suggested_wait,
    })))
}

async fn async_probe_response(state: &ServerState, query_string: &str) -> Result<Response> {
    let id = parse_job_id(query_string)?;
    let (status, suggested_wait) = state.job_table.probe(id).await?;
    let status_str = match status {
        JobStatus::InProgress => "in_progress",
        JobStatus::Done => "completed",
    };
    Ok(success_json(serde_json::json!({
        "status": status_str,
        "suggested_wait": suggested_wait,
    })))
}

async fn async_get_response(state: &ServerState, query_string: &str) -> Result<Response> {
    let id = parse_job_id(query_string)?;
    let output = state.job_table.get(id).await?;
    let value = handler_output_to_value(output)?;
    Ok(success_json(value))
}

fn decode_rpc_frame(body: &[u8]) -> Result<(Vec<Value>, Map<String, Value>)> {
    let frame: Value = serde_json::from_slice(body)
        .map_err(|_| TarpError::dispatch("RPC body is not valid JSON"))?;
    rpc::decode_frame(&frame)
}

fn handler_output_to_value(output: HandlerOutput) -> Result<Value> {
    match output {
        HandlerOutput::Value(rv) => Ok(rv.into()),
        HandlerOutput::Raw(_) => Err(TarpError::handler(
            "RPC handlers cannot return a raw payload",
        )),
    }
}

fn parse_query(query_string: &str) -> QueryMap {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query_string).unwrap_or_default();
    flatten_query(pairs)
}

fn parse_job_id(query_string: &str) -> Result<Uuid> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query_string).unwrap_or_default();
    let raw = pairs
        .into_iter()
        .find(|(k, _)| k == paths::JOB_ID_PARAM)
        .map(|(_, v)| v)
        .ok_or_else(|| {
            TarpError::dispatch(format!("missing '{}' query parameter", paths::JOB_ID_PARAM))
        })?;
    Uuid::parse_str(&raw).map_err(|e| TarpError::dispatch(format!("invalid job id: {e}")))
}

fn parse_body(content_type: &str, body: &[u8]) -> BodyValue {
    let mimetype = content_type.split(';').next().unwrap_or("").trim();
    match mimetype {
        t if t == http::CONTENT_TYPE_JSON => serde_json::from_slice::<Value>(body)
            .map(BodyValue::Json)
            .unwrap_or_else(|_| BodyValue::Bytes(body.to_vec())),
        "application/x-www-form-urlencoded" => {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).unwrap_or_default();
            let mut map = Map::new();
            for (key, value) in flatten_query(pairs) {
                let value = match value {
                    QueryValue::Single(s) => Value::String(s),
                    QueryValue::Multi(items) => {
                        Value::Array(items.into_iter().map(Value::String).collect())
                    }
                };
                map.insert(key, value);
            }
            BodyValue::Json(Value::Object(map))
        }
        "text/plain" => String::from_utf8(body.to_vec())
            .map(BodyValue::Text)
            .unwrap_or_else(|_| BodyValue::Bytes(body.to_vec())),
        _ => BodyValue::Bytes(body.to_vec()),
    }
}

/// Maps a handler's `HandlerOutput` onto an HTTP response: raw payloads
/// bypass the envelope; mapping/sequence/string/byte results get the
/// mimetype the shape implies (unless the descriptor overrides it);
/// anything else is a 500 per §4.3's "Unrecognized payload type" case.
fn shape_handler_output(output: HandlerOutput, mimetype_override: Option<&str>) -> Response {
    match output {
        HandlerOutput::Raw(raw) => raw_response(raw),
        HandlerOutput::Value(rv) => match &rv {
            ResultValue::Object(_) | ResultValue::Array(_) | ResultValue::Null => {
                let mimetype = mimetype_override.unwrap_or(http::CONTENT_TYPE_JSON);
                envelope_response(Envelope::success(mimetype, rv))
            }
            ResultValue::String(_) => {
                let mimetype = mimetype_override.unwrap_or("text/plain");
                envelope_response(Envelope::success(mimetype, rv))
            }
            ResultValue::Bytes(_) => {
                let mimetype = mimetype_override.unwrap_or("application/octet-stream");
                envelope_response(Envelope::success(mimetype, rv))
            }
            ResultValue::Bool(_) | ResultValue::Number(_) => {
                error_response(&TarpError::handler("Unrecognized payload type"))
            }
        },
    }
}

fn raw_response(raw: RawPayload) -> Response {
    let mut response = (StatusCode::OK, raw.bytes).into_response();
    if let Ok(value) = HeaderValue::from_str(&raw.mimetype) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

fn envelope_response(envelope: Envelope) -> Response {
    (StatusCode::OK, Json(envelope)).into_response()
}

fn success_json(value: Value) -> Response {
    envelope_response(Envelope::success(http::CONTENT_TYPE_JSON, value))
}

fn error_response(err: &TarpError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let envelope = Envelope::error(err);
    let mut response = (status, Json(envelope)).into_response();

    if let TarpError::OperationInProgress { retry_after, .. } = err {
        let wait = retry_after.unwrap_or(timeouts::DEFAULT_RETRY_AFTER_SECS);
        if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EndpointOptions;
    use axum::body::Body;
    use tower::ServiceExt;

    fn test_server() -> TarpServer {
        let mut registry = Registry::new();
        registry.register_get(
            "echo",
            EndpointOptions::new().description("echoes query"),
            |query, _body| async move {
                let mut map = Map::new();
                for (k, v) in query {
                    let value = match v {
                        QueryValue::Single(s) => Value::String(s),
                        QueryValue::Multi(items) => {
                            Value::Array(items.into_iter().map(Value::String).collect())
                        }
                    };
                    map.insert(k, value);
                }
                Ok(HandlerOutput::from(Value::Object(map)))
            },
        );
        registry.register_get(
            "png",
            EndpointOptions::new(),
            |_query, _body| async move {
                Ok(HandlerOutput::from(RawPayload::new(
                    vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
                    "image/png",
                )))
            },
        );
        registry.register_get("slow", EndpointOptions::new(), |_query, _body| async move {
            Err::<HandlerOutput, _>(TarpError::operation_in_progress("later", Some(7)))
        });
        registry.register_get(
            "echoBody",
            EndpointOptions::new().description("echoes back whatever body was parsed"),
            |_query, body| async move {
                let value = match body {
                    BodyValue::Json(v) => v,
                    BodyValue::Text(t) => Value::String(t),
                    BodyValue::Bytes(b) => Value::from(b.len()),
                };
                Ok(HandlerOutput::from(value))
            },
        );
        registry.register_rpc("add", EndpointOptions::new(), |args, _kwargs| async move {
            let x = args[0].as_i64().unwrap_or(0);
            let y = args[1].as_i64().unwrap_or(0);
            Ok(HandlerOutput::from(Value::from(x + y)))
        });

        TarpServer::new(TarpServerConfig::default(), registry)
    }

    #[tokio::test]
    async fn test_discovery_lists_registered_endpoints() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        let names: Vec<&str> = json["result"]["RPC"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"add"));
    }

    #[tokio::test]
    async fn test_get_query_flattening() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(
                Request::get("/echo?a=1&b=2&b=3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["result"]["a"], "1");
        assert_eq!(json["result"]["b"], serde_json::json!(["2", "3"]));
    }

    #[tokio::test]
    async fn test_get_receives_parsed_body() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(
                Request::get("/echoBody")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"greeting":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["result"]["greeting"], "hi");
    }

    #[tokio::test]
    async fn test_raw_binary_bypasses_envelope() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(Request::get("/png").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A][..]);
        assert!(serde_json::from_slice::<Value>(&body).is_err());
    }

    #[tokio::test]
    async fn test_operation_in_progress_sets_retry_after() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "OperationInProgress");
    }

    #[tokio::test]
    async fn test_sync_rpc_round_trip() {
        let server = test_server();
        let frame = rpc::encode_frame(&[Value::from(2), Value::from(3)], &Map::new()).unwrap();
        let response = server
            .router()
            .oneshot(
                Request::post("/add")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&frame).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        let payload_b64 = json["result"]["payload"].as_str().unwrap();
        use base64::Engine;
        let blob = base64::engine::general_purpose::STANDARD
            .decode(payload_b64)
            .unwrap();
        let value: Value = ciborium::de::from_reader(&blob[..]).unwrap();
        assert_eq!(value, Value::from(5));
    }

    #[tokio::test]
    async fn test_malformed_rpc_frame_is_bad_request() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(
                Request::post("/add")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"args":"","kwargs":""}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_not_found() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(Request::get("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
