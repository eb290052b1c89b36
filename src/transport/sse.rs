//! SSE (Server-Sent Events) transport for MCP communication
//!
//! The client holds a GET stream open; the server announces a POST endpoint in
//! an `endpoint` event and delivers every response as a `message` event.

use crate::core::protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::core::RequestIdGenerator;
use crate::transport::headers::to_header_map;
use crate::transport::sse_parser::{SseEvent, SseEventParser};
use crate::transport::traits::Transport;
use crate::utils::errors::{McpError, McpResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSE transport for MCP servers
pub struct SseTransport {
    post_url: Url,
    client: reqwest::Client,
    headers: HeaderMap,
    pending: Arc<DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
    is_connected: Arc<RwLock<bool>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_id_gen: RequestIdGenerator,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its POST endpoint.
    pub async fn connect(endpoint: &Url, headers: &HashMap<String, String>) -> McpResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| McpError::TransportError(e.to_string()))?;
        let headers = to_header_map(headers);

        debug!("Connecting to SSE endpoint: {}", endpoint);

        let response = client
            .get(endpoint.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(McpError::TransportError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let pending = Arc::new(DashMap::new());
        let is_connected = Arc::new(RwLock::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader =
            Self::start_reader(response, pending.clone(), is_connected.clone(), endpoint_tx);

        let announced = match tokio::time::timeout(CONNECT_TIMEOUT, endpoint_rx).await {
            Ok(Ok(path)) => path,
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::ConnectionClosed(
                    "SSE stream ended before endpoint event".to_string(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Timeout(CONNECT_TIMEOUT.as_millis() as u64));
            }
        };

        let post_url = match endpoint.join(&announced) {
            Ok(url) => url,
            Err(e) => {
                reader.abort();
                return Err(McpError::Protocol(format!(
                    "invalid endpoint event {}: {}",
                    announced, e
                )));
            }
        };
        debug!("SSE session established, posting to {}", post_url);

        Ok(Self {
            post_url,
            client,
            headers,
            pending,
            is_connected,
            reader: Mutex::new(Some(reader)),
            request_id_gen: RequestIdGenerator::with_uuid(),
        })
    }

    fn start_reader(
        response: reqwest::Response,
        pending: Arc<DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>,
        is_connected: Arc<RwLock<bool>>,
        endpoint_tx: oneshot::Sender<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseEventParser::new();
            let mut endpoint_tx = Some(endpoint_tx);

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for event in parser.push(&bytes) {
                            Self::dispatch(event, &pending, &mut endpoint_tx);
                        }
                    }
                    Err(e) => {
                        warn!("SSE stream error: {}", e);
                        break;
                    }
                }
            }

            if let Some(event) = parser.finish() {
                Self::dispatch(event, &pending, &mut endpoint_tx);
            }

            info!("SSE reader task ended");
            *is_connected.write().await = false;
            pending.clear();
        })
    }

    fn dispatch(
        event: SseEvent,
        pending: &DashMap<RequestId, oneshot::Sender<JsonRpcResponse>>,
        endpoint_tx: &mut Option<oneshot::Sender<String>>,
    ) {
        match event.event.as_str() {
            "endpoint" => {
                if let Some(tx) = endpoint_tx.take() {
                    let _ = tx.send(event.data.trim().to_string());
                }
            }
            "message" => match serde_json::from_str::<JsonRpcResponse>(&event.data) {
                Ok(response) => {
                    if let Some(id) = response.id.clone() {
                        if let Some((_, tx)) = pending.remove(&id) {
                            let _ = tx.send(response);
                        } else {
                            debug!("Received SSE response with unknown id: {:?}", id);
                        }
                    } else {
                        debug!("Received SSE message without id, ignoring");
                    }
                }
                Err(e) => debug!("Failed to parse SSE data: {}", e),
            },
            other => debug!("Ignoring SSE event {}", other),
        }
    }

    async fn post(&self, json: String) -> McpResult<()> {
        let response = self
            .client
            .post(self.post_url.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(json)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(McpError::TransportError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
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

        // The reader may have cleared pending between the check above and the insert
        if !self.is_connected().await {
            self.pending.remove(&request_id);
            return Err(McpError::ConnectionClosed(
                "Transport not connected".to_string(),
            ));
        }

        let json = serde_json::to_string(&request)?;
        debug!("Sending SSE request: {}", json);

        if let Err(e) = self.post(json).await {
            self.pending.remove(&request_id);
            return Err(e);
        }

        rx.await.map_err(|_| {
            McpError::ConnectionClosed(format!(
                "SSE stream closed before answering {}",
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
        debug!("Sending SSE notification: {}", json);
        self.post(json).await
    }

    async fn is_connected(&self) -> bool {
        *self.is_connected.read().await
    }

    async fn close(&self) -> McpResult<()> {
        debug!("Closing SSE transport");
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        *self.is_connected.write().await = false;
        self.pending.clear();
        Ok(())
    }
}
