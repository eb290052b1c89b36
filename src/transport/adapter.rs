//! Uniform `initialize` / `list_tools` / `call_tool` contract over every transport.
//!
//! Stdio keeps one subprocess and one session for the adapter's lifetime.
//! SSE and streamable HTTP open, use and tear down a fresh session for every
//! single operation, so there is never a stale connection to recover.

use crate::config::{BackendDescriptor, Endpoint, HttpEndpoint, Protocol, StdioEndpoint};
use crate::core::protocol::{CallToolResult, InitializeResult, ToolDescriptor};
use crate::core::session::McpSession;
use crate::transport::headers::forwarded_headers;
use crate::transport::{SseTransport, StdioTransport, StreamableHttpTransport, Transport};
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub type Headers = HashMap<String, String>;

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Perform the handshake. On a persistent session a second call re-runs it in place.
    async fn initialize(&self, headers: &Headers) -> McpResult<InitializeResult>;

    async fn list_tools(&self, headers: &Headers) -> McpResult<Vec<ToolDescriptor>>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        headers: &Headers,
    ) -> McpResult<CallToolResult>;

    fn protocol(&self) -> Protocol;

    fn supports_reinitialize(&self) -> bool {
        self.protocol().supports_reinitialize()
    }

    /// Whether a live session is currently held.
    async fn has_session(&self) -> bool;

    /// Release whatever the adapter holds open.
    async fn close(&self) -> McpResult<()>;
}

/// Pick the adapter variant for a descriptor.
pub fn adapter_for(descriptor: &BackendDescriptor) -> Arc<dyn TransportAdapter> {
    match &descriptor.endpoint {
        Endpoint::Stdio(endpoint) => {
            Arc::new(StdioAdapter::new(&descriptor.name, endpoint.clone()))
        }
        Endpoint::Sse(endpoint) => Arc::new(HttpAdapter::new(
            &descriptor.name,
            HttpFlavor::Sse,
            endpoint.clone(),
        )),
        Endpoint::Streamable(endpoint) => Arc::new(HttpAdapter::new(
            &descriptor.name,
            HttpFlavor::Streamable,
            endpoint.clone(),
        )),
    }
}

/// Long-lived subprocess session
pub struct StdioAdapter {
    name: String,
    endpoint: StdioEndpoint,
    session: RwLock<Option<Arc<McpSession>>>,
}

impl StdioAdapter {
    pub fn new(name: &str, endpoint: StdioEndpoint) -> Self {
        Self {
            name: name.to_string(),
            endpoint,
            session: RwLock::new(None),
        }
    }

    async fn current(&self) -> McpResult<Arc<McpSession>> {
        self.session.read().await.clone().ok_or_else(|| {
            McpError::ConnectionClosed(format!("no open session for {}", self.name))
        })
    }
}

#[async_trait]
impl TransportAdapter for StdioAdapter {
    async fn initialize(&self, _headers: &Headers) -> McpResult<InitializeResult> {
        if let Some(session) = self.session.read().await.clone() {
            debug!(server = %self.name, "Re-running handshake on existing session");
            return session.initialize().await;
        }

        let transport = StdioTransport::spawn(&self.name, &self.endpoint).await?;
        let session = McpSession::new(Box::new(transport));
        match session.initialize().await {
            Ok(handshake) => {
                *self.session.write().await = Some(Arc::new(session));
                Ok(handshake)
            }
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!(
                        server = %self.name,
                        "Failed to close session after handshake error: {}", close_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn list_tools(&self, _headers: &Headers) -> McpResult<Vec<ToolDescriptor>> {
        self.current().await?.list_tools().await
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        _headers: &Headers,
    ) -> McpResult<CallToolResult> {
        self.current().await?.call_tool(name, arguments).await
    }

    fn protocol(&self) -> Protocol {
        Protocol::Stdio
    }

    async fn has_session(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn close(&self) -> McpResult<()> {
        let session = self.session.write().await.take();
        match session {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpFlavor {
    Sse,
    Streamable,
}

/// Per-operation network session
pub struct HttpAdapter {
    name: String,
    flavor: HttpFlavor,
    endpoint: HttpEndpoint,
}

impl HttpAdapter {
    pub fn new(name: &str, flavor: HttpFlavor, endpoint: HttpEndpoint) -> Self {
        Self {
            name: name.to_string(),
            flavor,
            endpoint,
        }
    }

    /// Open a fresh transport and complete the handshake on it.
    async fn open(&self, headers: &Headers) -> McpResult<(McpSession, InitializeResult)> {
        let headers = forwarded_headers(&self.endpoint.headers, headers);
        let transport: Box<dyn Transport> = match self.flavor {
            HttpFlavor::Sse => Box::new(SseTransport::connect(&self.endpoint.url, &headers).await?),
            HttpFlavor::Streamable => {
                Box::new(StreamableHttpTransport::new(&self.endpoint.url, &headers)?)
            }
        };

        let session = McpSession::new(transport);
        match session.initialize().await {
            Ok(handshake) => Ok((session, handshake)),
            Err(e) => {
                self.release(&session).await;
                Err(e)
            }
        }
    }

    async fn release(&self, session: &McpSession) {
        if let Err(e) = session.close().await {
            debug!(server = %self.name, "Failed to close per-call session: {}", e);
        }
    }
}

#[async_trait]
impl TransportAdapter for HttpAdapter {
    async fn initialize(&self, headers: &Headers) -> McpResult<InitializeResult> {
        let (session, handshake) = self.open(headers).await?;
        self.release(&session).await;
        Ok(handshake)
    }

    async fn list_tools(&self, headers: &Headers) -> McpResult<Vec<ToolDescriptor>> {
        let (session, _) = self.open(headers).await?;
        let result = session.list_tools().await;
        self.release(&session).await;
        result
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
        headers: &Headers,
    ) -> McpResult<CallToolResult> {
        let (session, _) = self.open(headers).await?;
        let result = session.call_tool(name, arguments).await;
        self.release(&session).await;
        result
    }

    fn protocol(&self) -> Protocol {
        match self.flavor {
            HttpFlavor::Sse => Protocol::Sse,
            HttpFlavor::Streamable => Protocol::Streamable,
        }
    }

    async fn has_session(&self) -> bool {
        false
    }

    async fn close(&self) -> McpResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_selection() {
        let stdio = BackendDescriptor::stdio("local", "mock", vec![]);
        let adapter = adapter_for(&stdio);
        assert_eq!(adapter.protocol(), Protocol::Stdio);
        assert!(adapter.supports_reinitialize());

        let url: url::Url = "http://h/mcp".parse().unwrap();
        let sse = BackendDescriptor::sse("remote", url.clone(), HashMap::new());
        assert!(!adapter_for(&sse).supports_reinitialize());

        let streamable = BackendDescriptor::streamable("remote", url, HashMap::new());
        let adapter = adapter_for(&streamable);
        assert_eq!(adapter.protocol(), Protocol::Streamable);
        assert!(!adapter.supports_reinitialize());
    }

    #[tokio::test]
    async fn test_stdio_adapter_without_session() {
        let adapter = StdioAdapter::new(
            "idle",
            StdioEndpoint {
                command: "mock".into(),
                args: vec![],
                env: HashMap::new(),
            },
        );
        assert!(!adapter.has_session().await);
        let err = adapter.list_tools(&HashMap::new()).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(adapter.close().await.is_ok());
    }
}
