//! An MCP client session over one open transport.

use crate::core::protocol::{
    initialize_params, CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, ToolDescriptor, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST,
};
use crate::transport::Transport;
use crate::utils::errors::{McpError, McpResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// Upper bound on `tools/list` pages, guarding against a backend that loops its cursor.
const MAX_TOOL_PAGES: usize = 64;

pub struct McpSession {
    transport: Box<dyn Transport>,
}

impl McpSession {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Run the handshake: `initialize`, then the `initialized` notification.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        let result: InitializeResult = self
            .request(METHOD_INITIALIZE, Some(initialize_params()))
            .await?;
        self.transport
            .send_notification(JsonRpcRequest::new(METHOD_INITIALIZED, None))
            .await?;
        Ok(result)
    }

    /// List every tool, following pagination cursors.
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = self.request(METHOD_TOOLS_LIST, params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        Err(McpError::Protocol(format!(
            "tools/list did not terminate after {} pages",
            MAX_TOOL_PAGES
        )))
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> McpResult<CallToolResult> {
        let params = json!({ "name": name, "arguments": arguments });
        self.request(METHOD_TOOLS_CALL, Some(params)).await
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    pub async fn close(&self) -> McpResult<()> {
        self.transport.close().await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<T> {
        let response = self
            .transport
            .send_request(JsonRpcRequest::new(method, params))
            .await?;
        decode_response(method, response)
    }
}

fn decode_response<T: DeserializeOwned>(method: &str, response: JsonRpcResponse) -> McpResult<T> {
    if let Some(error) = response.error {
        return Err(McpError::Backend {
            code: error.code,
            message: error.message,
        });
    }
    let result = response.result.ok_or_else(|| {
        McpError::Protocol(format!("{} response carries neither result nor error", method))
    })?;
    serde_json::from_value(result)
        .map_err(|e| McpError::Protocol(format!("malformed {} result: {}", method, e)))
}
