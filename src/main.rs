use clap::Parser;
use mcp_router::config::ConfigManager;
use mcp_router::core::ServerRegistry;
use mcp_router::discovery::InMemoryIndex;
use mcp_router::http_server::HttpServer;
use mcp_router::utils::{init_tracing, ShutdownCoordinator};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcp-router")]
#[command(about = "Route MCP tool calls to stdio, SSE and streamable HTTP backends")]
#[command(version)]
enum Cli {
    /// Start the HTTP router
    Serve(ServeArgs),
    /// Start every configured backend once and report its state
    Check(CheckArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "MCP_ROUTER_CONFIG",
        default_value = "~/.config/mcp-router/config.json"
    )]
    config: String,
    /// Host to bind to, overrides the config file
    #[arg(short = 'H', long)]
    host: Option<String>,
    /// Port to bind to, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,
    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Parser)]
struct CheckArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "MCP_ROUTER_CONFIG",
        default_value = "~/.config/mcp-router/config.json"
    )]
    config: String,
    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match Cli::parse() {
        Cli::Serve(args) => {
            init_tracing(&args.log_level, args.log_json);
            info!("Config file: {}", args.config);

            let config_manager = ConfigManager::new(&args.config).await?;
            let mut config = config_manager.get_config();
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }

            let index = Arc::new(InMemoryIndex::new());
            let registry = Arc::new(ServerRegistry::from_config(&config, index).await?);
            info!("Configured {} servers", registry.list_servers().len());

            let shutdown = Arc::new(ShutdownCoordinator::new());
            HttpServer::new(config.server.clone(), registry)
                .run(shutdown)
                .await?;
        }
        Cli::Check(args) => {
            init_tracing(&args.log_level, false);

            let config_manager = ConfigManager::new(&args.config).await?;
            let config = config_manager.get_config();
            let index = Arc::new(InMemoryIndex::new());
            let registry = ServerRegistry::from_config(&config, index).await?;

            for name in registry.list_servers() {
                let manager = registry.get(&name)?;
                manager.wait_until_ready().await;
            }
            for health in registry.statuses().await {
                let status = &health.status;
                println!(
                    "{:<24} {:<11} {:<14} {}{}",
                    status.name,
                    status.protocol.to_string(),
                    status.state.to_string(),
                    if health.healthy { "healthy" } else { "unhealthy" },
                    status
                        .failure
                        .as_ref()
                        .map(|f| format!(" ({})", f))
                        .unwrap_or_default(),
                );
            }

            registry.shutdown_all().await;
        }
    }

    Ok(())
}
