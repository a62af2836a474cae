// ABOUTME: Demo TARP server exposing one endpoint of each flavor
// ABOUTME: Mirrors the teacher crate's test-server.rs: env-driven port, tracing, graceful shutdown

use tarp::config::ServerSettings;
use tarp::prelude::*;
use tarp::registry::QueryMap;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ServerSettings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&settings.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tarp::ensure_crypto_provider()?;

    let mut registry = Registry::new();
    register_demo_endpoints(&mut registry);

    let mut builder = TarpServerBuilder::new()
        .bind_address(settings.bind_address.clone())
        .port(settings.port)
        .max_workers(settings.max_workers);

    if settings.tls_enabled {
        let mut tls = TlsConfig::builder().enabled(true);
        if let Some(cert_path) = &settings.tls_cert_path {
            tls = tls.cert_path(cert_path);
        }
        if let Some(key_path) = &settings.tls_key_path {
            tls = tls.key_path(key_path);
        }
        builder = builder.tls(tls.build()?);
    }

    let config = builder.build();
    tracing::info!(port = config.port, tls = settings.tls_enabled, "demo server configured");

    let server = TarpServer::new(config, registry);
    server.serve().await
}

fn query_value_to_json(value: tarp::registry::QueryValue) -> serde_json::Value {
    match value {
        tarp::registry::QueryValue::Single(s) => serde_json::Value::from(s),
        tarp::registry::QueryValue::Multi(values) => serde_json::Value::from(values),
    }
}

fn register_demo_endpoints(registry: &mut Registry) {
    registry.register_get(
        "echo",
        EndpointOptions::new().description("echoes the query string back as JSON"),
        |query: QueryMap, _body| async move {
            let values: serde_json::Map<String, serde_json::Value> = query
                .into_iter()
                .map(|(k, v)| (k, query_value_to_json(v)))
                .collect();
            Ok(HandlerOutput::from(serde_json::Value::Object(values)))
        },
    );

    registry.register_rpc(
        "add",
        EndpointOptions::new().description("adds two numbers"),
        |args, _kwargs| async move {
            let x = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
            let y = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(HandlerOutput::from(serde_json::Value::from(x + y)))
        },
    );

    registry.register_async_rpc(
        "slowSquare",
        EndpointOptions::new()
            .description("squares a number after a short delay, to exercise the async job lifecycle")
            .suggested_wait(2),
        |args, _kwargs| async move {
            let x = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            Ok(HandlerOutput::from(serde_json::Value::from(x * x)))
        },
    );
}
