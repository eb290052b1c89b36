use crate::config::{BackendDescriptor, RouterConfig};
use crate::core::gateway::{InvocationRequest, RetryPolicy};
use crate::core::health::DEFAULT_PROBE_TIMEOUT;
use crate::core::manager::{ConnectionManager, ConnectionState, ServerStatus};
use crate::core::protocol::CallToolResult;
use crate::discovery::{DiscoveryIndex, InMemoryIndex};
use crate::utils::errors::{McpError, McpResult};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Status plus the outcome of a fresh health check
#[derive(Debug, Clone, Serialize)]
pub struct ServerHealth {
    #[serde(flatten)]
    pub status: ServerStatus,
    pub healthy: bool,
}

/// Owns one `ConnectionManager` per configured backend
pub struct ServerRegistry {
    managers: DashMap<String, Arc<ConnectionManager>>,
    index: Arc<dyn DiscoveryIndex>,
    policy: RetryPolicy,
    probe_timeout: Duration,
}

impl ServerRegistry {
    pub fn new(
        index: Arc<dyn DiscoveryIndex>,
        policy: RetryPolicy,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            managers: DashMap::new(),
            index,
            policy,
            probe_timeout,
        }
    }

    /// Start a manager for every configured backend and index them.
    pub async fn from_config(
        config: &RouterConfig,
        index: Arc<dyn DiscoveryIndex>,
    ) -> McpResult<Self> {
        let registry = Self::new(
            index,
            config.gateway.retry_policy(),
            config.gateway.probe_timeout(),
        );
        for descriptor in config.descriptors()? {
            registry.add_server(descriptor).await;
        }
        registry.sync_index().await?;
        Ok(registry)
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Register a backend, replacing and shutting down any manager of the same name.
    pub async fn add_server(&self, descriptor: BackendDescriptor) -> Arc<ConnectionManager> {
        let name = descriptor.name.clone();
        info!(server = %name, "Adding server");

        let metadata = index_metadata(&descriptor);
        let document = descriptor.document();
        let manager = ConnectionManager::spawn(descriptor);

        if let Some(previous) = self.managers.insert(name.clone(), manager.clone()) {
            info!(server = %name, "Replacing existing server");
            previous.shutdown().await;
        }
        if let Err(e) = self.index.upsert(&name, metadata, &document).await {
            warn!(server = %name, "Failed to index server: {}", e);
        }
        manager
    }

    pub fn get(&self, name: &str) -> McpResult<Arc<ConnectionManager>> {
        self.managers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))
    }

    pub async fn remove(&self, name: &str) -> McpResult<()> {
        info!(server = %name, "Removing server");
        let (_, manager) = self
            .managers
            .remove(name)
            .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;
        manager.shutdown().await;
        self.index.delete(&[name.to_string()]).await
    }

    pub fn list_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Vec<Arc<ConnectionManager>> {
        let mut managers: Vec<_> = self.managers.iter().map(|e| e.value().clone()).collect();
        managers.sort_by(|a, b| a.name().cmp(b.name()));
        managers
    }

    /// Status of every backend with a health check run concurrently.
    pub async fn statuses(&self) -> Vec<ServerHealth> {
        let timeout = self.probe_timeout;
        join_all(self.snapshot().into_iter().map(|manager| async move {
            let healthy = manager.healthy(timeout).await;
            ServerHealth {
                status: manager.status(),
                healthy,
            }
        }))
        .await
    }

    /// Backends matching `query`, ranked by the index and limited to registered names.
    pub async fn search(&self, query: &str, limit: usize) -> McpResult<Vec<String>> {
        let hits = self.index.query(query, limit).await?;
        Ok(hits
            .into_iter()
            .filter(|id| self.managers.contains_key(id))
            .collect())
    }

    /// Return a manager that passed a health check, rebuilding it from its descriptor if needed.
    ///
    /// A `Failed` or `Terminated` manager is always rebuilt, since HTTP managers report
    /// healthy regardless of their handshake outcome.
    pub async fn ensure_healthy(&self, name: &str) -> McpResult<Arc<ConnectionManager>> {
        let current = self.get(name)?;
        let state = current.wait_until_ready().await;
        let usable = !matches!(state, ConnectionState::Failed | ConnectionState::Terminated);
        if usable && current.healthy(self.probe_timeout).await {
            return Ok(current);
        }

        warn!(server = %name, state = %state, "Server unhealthy, rebuilding connection");
        let replacement = {
            let mut entry = self
                .managers
                .get_mut(name)
                .ok_or_else(|| McpError::ServerNotFound(name.to_string()))?;
            if Arc::ptr_eq(entry.value(), &current) {
                let fresh = ConnectionManager::spawn(current.descriptor().clone());
                *entry.value_mut() = fresh.clone();
                Some(fresh)
            } else {
                // Another caller already rebuilt it
                None
            }
        };

        let manager = match replacement {
            Some(fresh) => {
                current.shutdown().await;
                fresh
            }
            None => self.get(name)?,
        };

        if manager.wait_until_ready().await != ConnectionState::Ready {
            warn!(server = %name, state = %manager.state(), "Rebuilt connection is not ready");
        }
        Ok(manager)
    }

    /// Health-check the backend, then run the tool through the retrying gateway.
    pub async fn use_tool(
        &self,
        name: &str,
        request: &InvocationRequest,
    ) -> McpResult<CallToolResult> {
        let manager = self.ensure_healthy(name).await?;
        manager.execute_tool(request, &self.policy).await
    }

    /// Upsert every registered descriptor and drop index ids that are no longer registered.
    pub async fn sync_index(&self) -> McpResult<()> {
        for manager in self.snapshot() {
            let descriptor = manager.descriptor();
            let metadata = index_metadata(descriptor);
            self.index
                .upsert(&descriptor.name, metadata, &descriptor.document())
                .await?;
        }

        let stale: Vec<String> = self
            .index
            .list_ids()
            .await?
            .into_iter()
            .filter(|id| !self.managers.contains_key(id))
            .collect();
        if !stale.is_empty() {
            info!("Removing {} stale index entries", stale.len());
            self.index.delete(&stale).await?;
        }
        Ok(())
    }

    pub async fn shutdown_all(&self) {
        let managers = self.snapshot();
        info!("Shutting down {} servers", managers.len());
        join_all(managers.iter().map(|m| m.shutdown())).await;
        self.managers.clear();
    }
}

fn index_metadata(descriptor: &BackendDescriptor) -> serde_json::Value {
    json!({ "protocol": descriptor.protocol().to_string(), "tags": descriptor.tags })
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(
            Arc::new(InMemoryIndex::new()),
            RetryPolicy::default(),
            DEFAULT_PROBE_TIMEOUT,
        )
    }
}
