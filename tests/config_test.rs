//! Configuration loading tests

use mcp_router::config::{ConfigFormat, ConfigManager, Endpoint, Protocol};
use mcp_router::core::ServerRegistry;
use mcp_router::discovery::{DiscoveryIndex, InMemoryIndex};
use mcp_router::McpError;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

#[tokio::test]
async fn test_load_yaml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("router.yaml");

    let config_content = r#"
server:
  host: 0.0.0.0
  port: 8080
gateway:
  retries: 3
  retry_delay_ms: 250
mcpServers:
  files:
    command: npx
    args: ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
    env:
      LOG: debug
  remote:
    protocol: mcp-sse
    url: https://tools.example.com/sse
    headers:
      Authorization: Bearer abc
"#;
    fs::write(&config_path, config_content).await.unwrap();

    let manager = ConfigManager::new(config_path.to_str().unwrap()).await.unwrap();
    assert_eq!(manager.format(), ConfigFormat::Yaml);

    let config = manager.get_config();
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.gateway.retry_policy().retries, 3);
    assert_eq!(config.gateway.retry_policy().delay, Duration::from_millis(250));
    assert_eq!(config.gateway.probe_timeout(), Duration::from_secs(5));

    let descriptors = config.descriptors().unwrap();
    assert_eq!(descriptors.len(), 2);
    match &descriptors[0].endpoint {
        Endpoint::Stdio(stdio) => {
            assert_eq!(stdio.command, "npx");
            assert_eq!(stdio.args.len(), 3);
            assert_eq!(stdio.env.get("LOG").map(String::as_str), Some("debug"));
        }
        other => panic!("unexpected endpoint: {other:?}"),
    }
    assert_eq!(descriptors[1].protocol(), Protocol::Sse);
}

#[tokio::test]
async fn test_load_toml_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("router.toml");

    let config_content = r#"
[server]
port = 9000

[mcpServers.search]
protocol = "streamable-http"
url = "http://localhost:7000/mcp"
description = "Web search"
tags = ["web"]
"#;
    fs::write(&config_path, config_content).await.unwrap();

    let manager = ConfigManager::new(config_path.to_str().unwrap()).await.unwrap();
    assert_eq!(manager.format(), ConfigFormat::Toml);

    let descriptors = manager.get_config().descriptors().unwrap();
    assert_eq!(descriptors[0].protocol(), Protocol::Streamable);
    assert_eq!(descriptors[0].description, "Web search");
    assert_eq!(descriptors[0].tags, vec!["web"]);
}

#[tokio::test]
async fn test_invalid_backend_rejected_at_load() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("router.json");
    fs::write(
        &config_path,
        r#"{"mcpServers": {"broken": {"protocol": "streamable"}}}"#,
    )
    .await
    .unwrap();

    let result = ConfigManager::new(config_path.to_str().unwrap()).await;
    assert!(matches!(result, Err(McpError::ConfigError(_))));
}

#[tokio::test]
async fn test_missing_file_is_config_error() {
    let result = ConfigManager::new("/nonexistent/mcp-router/config.json").await;
    assert!(matches!(result, Err(McpError::ConfigError(_))));
}

#[tokio::test]
async fn test_registry_from_config_indexes_backends() {
    let config = ConfigManager::parse_content(
        r#"{
            "gateway": {"probe_timeout_ms": 200},
            "mcpServers": {
                "weather": {
                    "command": "/nonexistent/weather",
                    "description": "Forecasts and alerts"
                },
                "git": {"command": "/nonexistent/git", "tags": ["vcs"]}
            }
        }"#,
        ConfigFormat::Json,
    )
    .unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let registry = ServerRegistry::from_config(&config, index.clone()).await.unwrap();

    assert_eq!(registry.list_servers(), vec!["git", "weather"]);
    assert_eq!(registry.probe_timeout(), Duration::from_millis(200));
    assert_eq!(index.list_ids().await.unwrap().len(), 2);
    assert_eq!(registry.search("alerts", 5).await.unwrap(), vec!["weather"]);

    registry.remove("git").await.unwrap();
    assert!(!index.list_ids().await.unwrap().contains("git"));
    registry.shutdown_all().await;
}
