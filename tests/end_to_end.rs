// ABOUTME: End-to-end tests: a real TarpServer bound to a loopback port, a real TarpClient against it
// ABOUTME: Covers discovery, GET query flattening, raw passthrough, async jobs, and malformed RPC frames

use std::net::TcpListener as StdTcpListener;
use std::time::Duration;

use serde_json::{json, Map};
use tarp::prelude::*;
use tarp::registry::{EndpointOptions, QueryValue, Registry};

fn query_value_to_json(value: QueryValue) -> serde_json::Value {
    match value {
        QueryValue::Single(s) => serde_json::Value::from(s),
        QueryValue::Multi(values) => serde_json::Value::from(values),
    }
}

fn free_port() -> u16 {
    StdTcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral port")
        .local_addr()
        .expect("local addr")
        .port()
}

fn build_registry() -> Registry {
    let mut registry = Registry::new();

    registry.register_get(
        "echo",
        EndpointOptions::new().description("echoes the flattened query map"),
        |query, _body| async move {
            let obj: Map<String, serde_json::Value> = query
                .into_iter()
                .map(|(k, v)| (k, query_value_to_json(v)))
                .collect();
            Ok(HandlerOutput::from(serde_json::Value::Object(obj)))
        },
    );

    registry.register_get(
        "pixel",
        EndpointOptions::new()
            .description("returns a tiny raw PNG payload")
            .result_mimetype("image/png"),
        |_query, _body| async move {
            let bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
            Ok(HandlerOutput::from(RawPayload::new(bytes, "image/png")))
        },
    );

    registry.register_rpc(
        "add",
        EndpointOptions::new().description("adds two integers"),
        |args, _kwargs| async move {
            let x = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
            let y = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(HandlerOutput::from(serde_json::Value::from(x + y)))
        },
    );

    registry.register_rpc(
        "stillWorking",
        EndpointOptions::new().description("always reports in-progress"),
        |_args, _kwargs| async move {
            Err(TarpError::operation_in_progress("retry shortly", Some(1)))
        },
    );

    registry.register_async_rpc(
        "square",
        EndpointOptions::new()
            .description("squares a number after a short delay")
            .suggested_wait(1),
        |args, _kwargs| async move {
            let x = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(HandlerOutput::from(serde_json::Value::from(x * x)))
        },
    );

    registry
}

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let port = free_port();
    let registry = build_registry();
    let config = TarpServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    };
    let server = TarpServer::new(config, registry);
    let handle = tokio::spawn(async move {
        let _ = server.serve().await;
    });
    // give the listener a moment to bind before the client connects
    tokio::time::sleep(Duration::from_millis(100)).await;
    (format!("http://127.0.0.1:{port}"), handle)
}

#[tokio::test]
async fn test_discovery_lists_every_registered_endpoint() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let names: std::collections::HashSet<&str> = client.endpoints().map(|e| e.name.as_str()).collect();
    assert!(names.contains("echo"));
    assert!(names.contains("pixel"));
    assert!(names.contains("add"));
    assert!(names.contains("square"));
}

#[tokio::test]
async fn test_get_flattens_repeated_query_keys() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let response = client
        .call_get("echo", &[("tag", "a"), ("tag", "b"), ("name", "tarp")])
        .await
        .unwrap();

    match response {
        ClientResponse::Json { result, .. } => {
            assert_eq!(result["tag"], json!(["a", "b"]));
            assert_eq!(result["name"], json!("tarp"));
        }
        other => panic!("expected JSON response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_raw_binary_response_bypasses_envelope() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let response = client.call_get("pixel", &[]).await.unwrap();
    match response {
        ClientResponse::Raw { mimetype, bytes } => {
            assert_eq!(mimetype, "image/png");
            assert_eq!(&bytes[..4], b"\x89PNG");
        }
        other => panic!("expected raw response, got {other:?}"),
    }
}

#[tokio::test]
async fn test_operation_in_progress_surfaces_retry_after() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let err = client
        .call_rpc("stillWorking", vec![], Map::new())
        .await
        .unwrap_err();

    match err {
        TarpError::OperationInProgress { retry_after, .. } => {
            assert_eq!(retry_after, Some(1));
        }
        other => panic!("expected OperationInProgress, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sync_rpc_round_trips_via_cbor_envelope() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let result = client
        .call_rpc("add", vec![json!(7), json!(35)], Map::new())
        .await
        .unwrap();
    assert_eq!(result, json!(42));
}

#[tokio::test]
async fn test_async_job_lifecycle_is_at_most_once() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let handle = client
        .call_async_rpc("square", vec![json!(6)], Map::new())
        .await
        .unwrap();

    assert_eq!(handle.status().await.unwrap(), JobStatus::InProgress);

    let value = handle.wait().await.unwrap();
    assert_eq!(value, json!(36));

    // a second retrieval of the same job must fail: results are consumed once
    let second = handle.wait().await;
    assert!(matches!(second, Err(TarpError::Registry(_))));
}

#[tokio::test]
async fn test_malformed_rpc_frame_is_rejected() {
    let (base_url, _server) = start_server().await;
    let http = reqwest::Client::new();

    let resp = http
        .post(format!("{base_url}/add"))
        .header("content-type", "application/json")
        .body("{\"kwargs\": \"\"}")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_endpoint_is_404() {
    let (base_url, _server) = start_server().await;
    let client = TarpClient::connect(ClientConfig::new(base_url)).await.unwrap();

    let err = client.call_get("doesNotExist", &[]).await.unwrap_err();
    assert!(matches!(err, TarpError::Registry(_)));
}
