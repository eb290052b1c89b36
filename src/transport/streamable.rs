//! Streamable HTTP transport for MCP communication
//!
//! Every JSON-RPC message is POSTed to a single endpoint. The server answers a
//! request either with a plain JSON body or with a `text/event-stream` body
//! carrying the response as one of its events.

use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::core::RequestIdGenerator;
use crate::transport::headers::to_header_map;
use crate::transport::sse_parser::SseEventParser;
use crate::transport::traits::Transport;
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

pub const SESSION_HEADER: &str = "mcp-session-id";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streamable HTTP transport for MCP servers
pub struct StreamableHttpTransport {
    endpoint: Url,
    client: reqwest::Client,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    is_connected: RwLock<bool>,
    request_id_gen: RequestIdGenerator,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: &Url, headers: &HashMap<String, String>) -> McpResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::TransportError(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.clone(),
            client,
            headers: to_header_map(headers),
            session_id: RwLock::new(None),
            is_connected: RwLock::new(true),
            request_id_gen: RequestIdGenerator::with_uuid(),
        })
    }

    async fn post(&self, json: String) -> McpResult<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream");

        if let Some(id) = self.session_id.read().await.as_deref() {
            builder = builder.header(SESSION_HEADER, id);
        }

        let response = builder.body(json).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND && self.session_id.read().await.is_some() {
            return Err(McpError::ConnectionClosed("session expired".to_string()));
        }
        if !status.is_success() {
            return Err(McpError::TransportError(format!("HTTP error: {}", status)));
        }

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut session = self.session_id.write().await;
            if session.as_deref() != Some(id) {
                debug!("Streamable HTTP session established: {}", id);
                *session = Some(id.to_string());
            }
        }

        Ok(response)
    }

    /// Read an event-stream body until the response for `request` shows up.
    async fn read_event_stream(
        response: reqwest::Response,
        request: &JsonRpcRequest,
    ) -> McpResult<JsonRpcResponse> {
        let mut stream = response.bytes_stream();
        let mut parser = SseEventParser::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            for event in parser.push(&bytes) {
                if let Some(found) = Self::match_response(&event.data, request) {
                    return Ok(found);
                }
            }
        }

        if let Some(event) = parser.finish() {
            if let Some(found) = Self::match_response(&event.data, request) {
                return Ok(found);
            }
        }

        Err(McpError::ConnectionClosed(format!(
            "event stream ended before answering {}",
            request.method
        )))
    }

    fn match_response(data: &str, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcResponse>(data) {
            Ok(response) if response.id.is_some() && response.id == request.id => Some(response),
            Ok(_) => {
                debug!("Skipping unrelated streamable event");
                None
            }
            Err(e) => {
                debug!("Failed to parse streamable event: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
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

        let json = serde_json::to_string(&request)?;
        debug!("Sending streamable request: {}", json);

        let response = self.post(json).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        if content_type.starts_with("text/event-stream") {
            return Self::read_event_stream(response, &request).await;
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(McpError::Protocol(format!(
                "empty response body for {}",
                request.method
            )));
        }
        let parsed: JsonRpcResponse = serde_json::from_slice(&body)
            .map_err(|e| McpError::Protocol(format!("malformed response: {}", e)))?;
        if parsed.id != request.id {
            return Err(McpError::Protocol(format!(
                "response id {:?} does not match request id {:?}",
                parsed.id, request.id
            )));
        }
        Ok(parsed)
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
        debug!("Sending streamable notification: {}", json);
        self.post(json).await?;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    async fn close(&self) -> McpResult<()> {
        debug!("Closing Streamable HTTP transport");

        let session_id = self.session_id.write().await.take();
        if let Some(id) = session_id {
            let result = self
                .client
                .delete(self.endpoint.clone())
                .headers(self.headers.clone())
                .header(SESSION_HEADER, id)
                .send()
                .await;
            if let Err(e) = result {
                debug!("Session termination request failed: {}", e);
            }
        }

        *self.is_connected.write().await = false;
        Ok(())
    }
}
