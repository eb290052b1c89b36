//! Per-backend connection lifecycle.
//!
//! Each manager owns one adapter and one background task. The task runs the
//! handshake, publishes readiness exactly once, then parks until shutdown is
//! requested and releases the session on the way out.

use crate::config::{BackendDescriptor, Protocol};
use crate::core::gateway::{self, InvocationRequest, RetryPolicy, ToolInvoker};
use crate::core::health::{probe_connection, HealthStatus};
use crate::core::protocol::{CallToolResult, InitializeResult, ToolDescriptor};
use crate::transport::{adapter_for, Headers, TransportAdapter};
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Starting,
    Ready,
    Failed,
    ShuttingDown,
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Starting => "starting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
            ConnectionState::ShuttingDown => "shutting_down",
            ConnectionState::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

/// Snapshot of one manager for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub protocol: Protocol,
    pub state: ConnectionState,
    pub disconnected: bool,
    pub failure: Option<String>,
}

struct Shared {
    name: String,
    adapter: Arc<dyn TransportAdapter>,
    state: watch::Sender<ConnectionState>,
    failure: RwLock<Option<String>>,
    handshake: RwLock<Option<InitializeResult>>,
    disconnected: AtomicBool,
    shutdown: CancellationToken,
    shutdown_observed: CancellationToken,
    released: Mutex<bool>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move forward only; `Failed` and `Terminated` never change.
    fn transition(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            let allowed = matches!(
                (*current, next),
                (ConnectionState::Starting, ConnectionState::Ready)
                    | (ConnectionState::Starting, ConnectionState::Failed)
                    | (ConnectionState::Ready, ConnectionState::ShuttingDown)
                    | (ConnectionState::ShuttingDown, ConnectionState::Terminated)
            );
            if allowed {
                debug!(server = %self.name, "{} -> {}", current, next);
                *current = next;
            }
            allowed
        });
    }

    fn fail(&self, cause: String) {
        *self.failure.write() = Some(cause);
        self.transition(ConnectionState::Failed);
        self.shutdown_observed.cancel();
    }

    /// Release the adapter's session once, however many exit paths race here.
    async fn release(&self) {
        let mut released = self.released.lock().await;
        if *released {
            return;
        }
        if let Err(e) = self.adapter.close().await {
            error!(server = %self.name, "Error during cleanup: {}", e);
        }
        *released = true;
    }

    fn not_initialized(&self) -> McpError {
        let cause = if self.shutdown.is_cancelled() {
            "shutdown requested".to_string()
        } else {
            self.failure
                .read()
                .clone()
                .unwrap_or_else(|| format!("connection is {}", self.state()))
        };
        McpError::NotInitialized {
            server: self.name.clone(),
            cause,
        }
    }
}

pub struct ConnectionManager {
    descriptor: BackendDescriptor,
    shared: Arc<Shared>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Build the adapter for `descriptor` and start the lifecycle task.
    pub fn spawn(descriptor: BackendDescriptor) -> Arc<Self> {
        let adapter = adapter_for(&descriptor);
        Self::with_adapter(descriptor, adapter)
    }

    /// Start a manager around an existing adapter.
    pub fn with_adapter(
        descriptor: BackendDescriptor,
        adapter: Arc<dyn TransportAdapter>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Starting);
        let shared = Arc::new(Shared {
            name: descriptor.name.clone(),
            adapter,
            state,
            failure: RwLock::new(None),
            handshake: RwLock::new(None),
            disconnected: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            shutdown_observed: CancellationToken::new(),
            released: Mutex::new(false),
        });

        info!(
            server = %descriptor.name,
            protocol = %descriptor.protocol(),
            "Starting connection manager"
        );
        let task = tokio::spawn(run_lifecycle(shared.clone()));

        Arc::new(Self {
            descriptor,
            shared,
            task: parking_lot::Mutex::new(Some(task)),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    pub fn protocol(&self) -> Protocol {
        self.shared.adapter.protocol()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Handshake result from the most recent successful initialize.
    pub fn handshake(&self) -> Option<InitializeResult> {
        self.shared.handshake.read().clone()
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            name: self.shared.name.clone(),
            protocol: self.protocol(),
            state: self.state(),
            disconnected: self.shared.disconnected.load(Ordering::SeqCst),
            failure: self.shared.failure.read().clone(),
        }
    }

    /// Suspend until readiness is known and return the state observed then.
    pub async fn wait_until_ready(&self) -> ConnectionState {
        let mut rx = self.shared.state.subscribe();
        let observed = match rx
            .wait_for(|state| *state != ConnectionState::Starting)
            .await
        {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        observed
    }

    /// Resolves once the manager has stopped offering a session.
    pub async fn wait_for_shutdown_observed(&self) {
        self.shared.shutdown_observed.cancelled().await;
    }

    async fn ensure_ready(&self) -> McpResult<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(self.shared.not_initialized());
        }
        match self.wait_until_ready().await {
            ConnectionState::Ready if !self.shared.shutdown.is_cancelled() => Ok(()),
            _ => Err(self.shared.not_initialized()),
        }
    }

    pub async fn list_tools(&self, headers: &Headers) -> McpResult<Vec<ToolDescriptor>> {
        self.ensure_ready().await?;
        self.shared
            .adapter
            .list_tools(headers)
            .await
            .map_err(|e| e.for_server(self.name()))
    }

    pub async fn call_tool(&self, request: &InvocationRequest) -> McpResult<CallToolResult> {
        self.ensure_ready().await?;
        debug!(server = %self.name(), tool = %request.tool_name, "Calling tool");
        self.shared
            .adapter
            .call_tool(&request.tool_name, &request.arguments, &request.caller_headers)
            .await
            .map_err(|e| e.for_server(self.name()))
    }

    /// Call a tool through the retrying gateway.
    pub async fn execute_tool(
        &self,
        request: &InvocationRequest,
        policy: &RetryPolicy,
    ) -> McpResult<CallToolResult> {
        gateway::execute_tool(self, request, policy).await
    }

    /// Re-run the handshake on the held session.
    pub async fn reinitialize(&self) -> McpResult<InitializeResult> {
        self.ensure_ready().await?;
        let handshake = self
            .shared
            .adapter
            .initialize(&HashMap::new())
            .await
            .map_err(|e| e.for_server(self.name()))?;
        *self.shared.handshake.write() = Some(handshake.clone());
        self.shared.disconnected.store(false, Ordering::SeqCst);
        info!(server = %self.name(), "Session reinitialized");
        Ok(handshake)
    }

    /// Whether callers should keep routing here.
    ///
    /// Per-call transports hold nothing that can go stale and always report
    /// healthy. A stdio session must exist, be ready, not be shutting down,
    /// and answer a `tools/list` probe within `timeout`.
    pub async fn healthy(&self, timeout: Duration) -> bool {
        if self.protocol() != Protocol::Stdio {
            return true;
        }
        if self.shared.shutdown.is_cancelled() {
            info!(server = %self.name(), "Shutdown requested");
            return false;
        }
        if self.state() != ConnectionState::Ready {
            info!(server = %self.name(), "Not initialized");
            return false;
        }
        if !self.shared.adapter.has_session().await {
            info!(server = %self.name(), "Session object is missing");
            return false;
        }

        let status = probe_connection(
            self.name(),
            timeout,
            self.shared.adapter.list_tools(&HashMap::new()),
        )
        .await;
        self.shared
            .disconnected
            .store(!status.is_healthy(), Ordering::SeqCst);
        status == HealthStatus::Healthy
    }

    /// Ask the lifecycle task to release the session and stop. Returns immediately.
    pub fn request_shutdown(&self) {
        if !self.shared.shutdown.is_cancelled() {
            info!(server = %self.name(), "Shutdown requested");
        }
        self.shared.shutdown.cancel();
    }

    /// Request shutdown and wait for the lifecycle task to finish cleanup.
    pub async fn shutdown(&self) {
        self.request_shutdown();
        let task = self.task.lock().take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!(server = %self.name(), "Lifecycle task failed: {}", e);
                    self.shared.release().await;
                }
            }
            None => self.shared.release().await,
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[async_trait]
impl ToolInvoker for ConnectionManager {
    fn server_name(&self) -> String {
        self.shared.name.clone()
    }

    fn supports_reinitialize(&self) -> bool {
        self.shared.adapter.supports_reinitialize()
    }

    async fn invoke(&self, request: &InvocationRequest) -> McpResult<CallToolResult> {
        self.call_tool(request).await
    }

    async fn reinitialize(&self) -> McpResult<()> {
        ConnectionManager::reinitialize(self).await.map(|_| ())
    }
}

async fn run_lifecycle(shared: Arc<Shared>) {
    let no_headers = HashMap::new();
    let outcome = tokio::select! {
        biased;
        _ = shared.shutdown.cancelled() => Err(McpError::InternalError(
            "shutdown requested before initialization completed".to_string(),
        )),
        result = shared.adapter.initialize(&no_headers) => result,
    };

    match outcome {
        Ok(handshake) => {
            info!(
                server = %shared.name,
                backend = %handshake.server_info.name,
                version = %handshake.server_info.version,
                "Connection ready"
            );
            *shared.handshake.write() = Some(handshake);
            shared.transition(ConnectionState::Ready);

            shared.shutdown.cancelled().await;

            shared.transition(ConnectionState::ShuttingDown);
            shared.shutdown_observed.cancel();
            shared.release().await;
            shared.transition(ConnectionState::Terminated);
            info!(server = %shared.name, "Connection terminated");
        }
        Err(e) => {
            warn!(server = %shared.name, "Failed to init mcp server: {}", e);
            shared.fail(e.to_string());
            shared.release().await;
        }
    }
}
