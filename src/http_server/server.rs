use crate::config::ServerConfig;
use crate::core::ServerRegistry;
use crate::http_server::routes;
use crate::utils::errors::{McpError, McpResult};
use crate::utils::ShutdownCoordinator;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct AppState {
    pub registry: Arc<ServerRegistry>,
}

pub struct HttpServer {
    config: ServerConfig,
    registry: Arc<ServerRegistry>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, registry: Arc<ServerRegistry>) -> Self {
        Self { config, registry }
    }

    /// Serve until `shutdown` fires, then stop every backend.
    pub async fn run(self, shutdown: Arc<ShutdownCoordinator>) -> McpResult<()> {
        let app = self.create_router();

        let ip = self
            .config
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| {
                McpError::ConfigError(format!("Invalid host {}: {}", self.config.host, e))
            })?;
        let addr = SocketAddr::from((ip, self.config.port));

        info!("Starting HTTP server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait_for_shutdown_signal().await })
            .await?;

        info!("HTTP server stopped, shutting down backends");
        self.registry.shutdown_all().await;
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        router(self.registry.clone())
    }
}

/// Routes over `registry`, usable without binding a socket.
pub fn router(registry: Arc<ServerRegistry>) -> Router {
    let state = Arc::new(AppState { registry });

    Router::new()
        .route("/health", get(routes::health))
        .route("/servers", get(routes::list_servers))
        .route("/servers/{name}/tools", get(routes::list_tools))
        .route("/servers/{name}/tools/{tool}", post(routes::call_tool))
        .route("/search", get(routes::search))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
