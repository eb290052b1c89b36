use crate::core::protocol::{CallToolResult, ToolDescriptor};
use crate::core::{InvocationRequest, ServerHealth};
use crate::http_server::server::AppState;
use crate::utils::errors::McpError;
use axum::{
    extract::{Json, Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Inbound headers that describe the exchange with this router, not the caller.
const NOT_FORWARDED: [&str; 11] = [
    "accept",
    "accept-encoding",
    "connection",
    "content-type",
    "keep-alive",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Caller headers to pass on to network backends.
pub fn caller_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| !NOT_FORWARDED.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_servers(State(state): State<Arc<AppState>>) -> Json<Vec<ServerHealth>> {
    Json(state.registry.statuses().await)
}

pub async fn list_tools(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ToolDescriptor>>, McpError> {
    let manager = state.registry.ensure_healthy(&name).await?;
    let tools = manager.list_tools(&caller_headers(&headers)).await?;
    Ok(Json(tools))
}

pub async fn call_tool(
    Path((name, tool)): Path<(String, String)>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(arguments): Json<Map<String, Value>>,
) -> Result<Json<CallToolResult>, McpError> {
    debug!(server = %name, tool = %tool, "Tool call via HTTP");
    let request = InvocationRequest::new(tool, arguments).with_headers(caller_headers(&headers));
    let result = state.registry.use_tool(&name, &request).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, McpError> {
    let servers = state.registry.search(&params.q, params.limit).await?;
    Ok(Json(json!({ "query": params.q, "servers": servers })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_headers_skip_exchange_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));
        headers.insert("host", HeaderValue::from_static("router:3000"));

        let forwarded = caller_headers(&headers);
        assert_eq!(forwarded.get("authorization").map(String::as_str), Some("Bearer t"));
        assert_eq!(forwarded.get("x-tenant").map(String::as_str), Some("acme"));
        assert!(!forwarded.contains_key("content-type"));
        // host is kept here and stripped later by the transport header hygiene
        assert!(forwarded.contains_key("host"));
    }
}
