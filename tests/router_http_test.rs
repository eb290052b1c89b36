//! Caller-facing HTTP surface

mod common;

use common::mock_stdio;
use mcp_router::core::ServerRegistry;
use mcp_router::http_server::server::router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

async fn serve(registry: Arc<ServerRegistry>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(registry)).await.unwrap();
    });
    addr
}

async fn registry_with_mock() -> Arc<ServerRegistry> {
    let registry = Arc::new(ServerRegistry::default());
    let mut descriptor = mock_stdio("local", &[]);
    descriptor.description = "Echo tools for testing".to_string();
    descriptor.tags = vec!["testing".to_string()];
    registry.add_server(descriptor).await.wait_until_ready().await;
    registry
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = serve(Arc::new(ServerRegistry::default())).await;
    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_list_servers_and_tools() {
    let registry = registry_with_mock().await;
    let addr = serve(registry.clone()).await;

    let servers: Value = reqwest::get(format!("http://{}/servers", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers[0]["name"], "local");
    assert_eq!(servers[0]["protocol"], "stdio");
    assert_eq!(servers[0]["state"], "ready");
    assert_eq!(servers[0]["healthy"], true);

    let tools: Value = reqwest::get(format!("http://{}/servers/local/tools", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tools[0]["name"], "echo");

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_call_tool_over_http() {
    let registry = registry_with_mock().await;
    let addr = serve(registry.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/servers/local/tools/echo", addr))
        .json(&json!({"city": "Oslo"}))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let result: Value = response.json().await.unwrap();
    assert_eq!(result["content"][0]["text"], r#"{"city":"Oslo"}"#);

    let response = client
        .post(format!("http://{}/servers/local/tools/fail", addr))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "BACKEND_ERROR");

    registry.shutdown_all().await;
}

#[tokio::test]
async fn test_unknown_server_is_not_found() {
    let addr = serve(Arc::new(ServerRegistry::default())).await;
    let response = reqwest::get(format!("http://{}/servers/missing/tools", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_returns_registered_backends() {
    let registry = registry_with_mock().await;
    let addr = serve(registry.clone()).await;

    let body: Value = reqwest::get(format!("http://{}/search?q=echo%20testing&limit=3", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["servers"], json!(["local"]));

    registry.shutdown_all().await;
}
