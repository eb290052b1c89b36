use crate::config::StdioEndpoint;
use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::core::RequestIdGenerator;
use crate::transport::traits::Transport;
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, error, info, warn};

const KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Stdio transport for a locally spawned MCP server
pub struct StdioTransport {
    name: String,
    child: Arc<Mutex<Child>>,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    is_connected: Arc<RwLock<bool>>,
    request_id_gen: RequestIdGenerator,
}

impl StdioTransport {
    /// Spawn `command args` with `env` layered over the inherited environment.
    pub async fn spawn(name: &str, endpoint: &StdioEndpoint) -> McpResult<Self> {
        let mut cmd = Command::new(&endpoint.command);
        cmd.args(&endpoint.args)
            .envs(&endpoint.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::TransportError(format!("failed to spawn {}: {}", endpoint.command, e))
        })?;
        info!(server = %name, pid = ?child.id(), "Spawned {}", endpoint.command);

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::TransportError("Failed to open stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::TransportError("Failed to open stdout".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            Self::drain_stderr(name.to_string(), stderr);
        }

        let transport = Self {
            name: name.to_string(),
            child: Arc::new(Mutex::new(child)),
            stdin: Arc::new(Mutex::new(stdin)),
            pending: Arc::new(DashMap::new()),
            is_connected: Arc::new(RwLock::new(true)),
            request_id_gen: RequestIdGenerator::new(),
        };

        transport.start_reader(stdout);

        Ok(transport)
    }

    fn start_reader(&self, stdout: ChildStdout) {
        let name = self.name.clone();
        let pending = self.pending.clone();
        let is_connected = self.is_connected.clone();

        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();

            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                debug!(server = %name, "Received: {}", line);

                let message: Value = match serde_json::from_str(&line) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(server = %name, "Failed to parse message: {}", e);
                        continue;
                    }
                };

                if message.get("method").is_some() {
                    debug!(server = %name, "Ignoring server-initiated message");
                    continue;
                }

                match serde_json::from_value::<JsonRpcResponse>(message) {
                    Ok(response) => {
                        if let Some(id) = response.id.clone() {
                            if let Some((_, tx)) = pending.remove(&id) {
                                let _ = tx.send(response);
                            } else {
                                warn!(
                                    server = %name,
                                    "Received response with unknown id: {:?}", id
                                );
                            }
                        } else {
                            debug!(server = %name, "Received response without id, ignoring");
                        }
                    }
                    Err(e) => {
                        warn!(server = %name, "Failed to parse response: {}", e);
                    }
                }
            }

            info!(server = %name, "Stdio reader task ended");
            // Flag first so a request registered after the clear sees the disconnect
            *is_connected.write().await = false;
            pending.clear();
        });
    }

    fn drain_stderr(name: String, stderr: ChildStderr) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %name, "stderr: {}", line);
            }
        });
    }

    async fn write_line(&self, json: &str) -> McpResult<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send_request(&self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(McpError::ConnectionClosed(
                "Transport not connected".to_string(),
            ));
        }

        let mut request = request;
        if request.id.is_none() {
            request.id = Some(self.request_id_gen.next_id());
        }
        let request_id = request
            .id
            .clone()
            .ok_or_else(|| McpError::InvalidRequest("Missing request id".to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if !self.is_connected().await {
            self.pending.remove(&request_id);
            return Err(McpError::ConnectionClosed(
                "Transport not connected".to_string(),
            ));
        }

        let json = serde_json::to_string(&request)?;
        debug!(server = %self.name, "Sending: {}", json);

        if let Err(e) = self.write_line(&json).await {
            self.pending.remove(&request_id);
            return Err(e);
        }

        rx.await.map_err(|_| {
            McpError::ConnectionClosed(format!(
                "process exited before answering {}",
                request.method
            ))
        })
    }

    async fn send_notification(&self, request: JsonRpcRequest) -> McpResult<()> {
        if !self.is_connected().await {
            return Err(McpError::ConnectionClosed(
                "Transport not connected".to_string(),
            ));
        }

        let mut request = request;
        request.id = None;

        let json = serde_json::to_string(&request)?;
        debug!(server = %self.name, "Sending notification: {}", json);

        self.write_line(&json).await
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    async fn close(&self) -> McpResult<()> {
        let mut child = self.child.lock().await;

        if let Err(e) = child.start_kill() {
            warn!(server = %self.name, "Failed to kill child process: {}", e);
        }

        match tokio::time::timeout(KILL_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => info!(server = %self.name, "Child process exited with: {:?}", status),
            Ok(Err(e)) => error!(server = %self.name, "Failed to wait for child: {}", e),
            Err(_) => warn!(server = %self.name, "Timeout waiting for child process"),
        }

        *self.is_connected.write().await = false;
        self.pending.clear();
        Ok(())
    }
}
