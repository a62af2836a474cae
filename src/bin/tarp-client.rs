// ABOUTME: Demo TARP client exercising discovery plus one call of each flavor
// ABOUTME: Mirrors the teacher crate's test-client.rs: env-driven target, plain stdout reporting

use tarp::client::ClientConfig;
use tarp::config::ClientSettings;
use tarp::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ClientSettings::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&settings.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!(base_url = %settings.base_url, "connecting");
    let client = TarpClient::connect(ClientConfig::new(settings.base_url)).await?;

    println!("discovered {} endpoint(s):", client.endpoints().count());
    for endpoint in client.endpoints() {
        println!("  {:?} {} — {}", endpoint.flavor, endpoint.name, endpoint.description);
    }

    if client.endpoint("echo").is_some() {
        let response = client.call_get("echo", &[("name", "tarp")]).await?;
        println!("echo -> {response:?}");
    }

    if client.endpoint("add").is_some() {
        let result = client
            .call_rpc("add", vec![serde_json::json!(2), serde_json::json!(3)], serde_json::Map::new())
            .await?;
        println!("add(2, 3) -> {result}");
    }

    if client.endpoint("slowSquare").is_some() {
        let handle = client
            .call_async_rpc("slowSquare", vec![serde_json::json!(9)], serde_json::Map::new())
            .await?;
        println!("slowSquare(9) submitted as job {}", handle.id());
        let result = handle.wait().await?;
        println!("slowSquare(9) -> {result}");
    }

    Ok(())
}
