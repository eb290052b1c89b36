//! Bounded retry around tool invocation.
//!
//! A failed attempt is retried after a fixed delay. Persistent sessions get a
//! re-handshake before the retry; per-call transports already start each
//! attempt on a fresh session. There is no backoff and no circuit breaker.

use crate::core::protocol::CallToolResult;
use crate::utils::errors::McpResult;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// One tool invocation as requested by a caller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationRequest {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    pub caller_headers: HashMap<String, String>,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            caller_headers: HashMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.caller_headers = headers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 2,
            delay: Duration::from_secs(1),
        }
    }
}

/// What the gateway needs from a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    fn server_name(&self) -> String;

    fn supports_reinitialize(&self) -> bool;

    async fn invoke(&self, request: &InvocationRequest) -> McpResult<CallToolResult>;

    async fn reinitialize(&self) -> McpResult<()>;
}

/// Invoke a tool with at most `policy.retries` attempts, returning the last error unchanged.
pub async fn execute_tool<I>(
    invoker: &I,
    request: &InvocationRequest,
    policy: &RetryPolicy,
) -> McpResult<CallToolResult>
where
    I: ToolInvoker + ?Sized,
{
    let attempts = policy.retries.max(1);
    let mut attempt = 1;

    loop {
        match invoker.invoke(request).await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= attempts => return Err(e),
            Err(e) => {
                warn!(
                    server = %invoker.server_name(),
                    tool = %request.tool_name,
                    attempt,
                    attempts,
                    "Tool call failed, retrying: {}",
                    e
                );
                tokio::time::sleep(policy.delay).await;

                if invoker.supports_reinitialize() {
                    match invoker.reinitialize().await {
                        Ok(()) => debug!(server = %invoker.server_name(), "Reinitialized session"),
                        Err(re) => warn!(
                            server = %invoker.server_name(),
                            "Reinitialize before retry failed: {}",
                            re
                        ),
                    }
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::McpError;
    use mockall::Sequence;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_millis(1),
        }
    }

    fn ok_result() -> CallToolResult {
        CallToolResult {
            content: vec![serde_json::json!({"type": "text", "text": "ok"})],
            structured_content: None,
            is_error: false,
        }
    }

    fn mock(reinit: bool) -> MockToolInvoker {
        let mut invoker = MockToolInvoker::new();
        invoker
            .expect_server_name()
            .return_const("backend".to_string());
        invoker
            .expect_supports_reinitialize()
            .return_const(reinit);
        invoker
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let mut invoker = mock(true);
        invoker.expect_invoke().times(1).returning(|_| Ok(ok_result()));
        invoker.expect_reinitialize().never();

        let result = execute_tool(&invoker, &InvocationRequest::default(), &policy(2)).await;
        assert_eq!(result.unwrap(), ok_result());
    }

    #[tokio::test]
    async fn test_stdio_reinitializes_between_attempts() {
        let mut invoker = mock(true);
        let mut seq = Sequence::new();
        invoker
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(McpError::ConnectionClosed("first".into())));
        invoker
            .expect_reinitialize()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(McpError::ConnectionClosed("still dead".into())));
        invoker
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(McpError::ConnectionClosed("second".into())));

        let err = execute_tool(&invoker, &InvocationRequest::default(), &policy(2))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ConnectionClosed(ref m) if m == "second"));
    }

    #[tokio::test]
    async fn test_http_never_reinitializes() {
        let mut invoker = mock(false);
        invoker
            .expect_invoke()
            .times(2)
            .returning(|_| Err(McpError::TransportError("HTTP error: 502".into())));
        invoker.expect_reinitialize().never();

        let result = execute_tool(&invoker, &InvocationRequest::default(), &policy(2)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let mut invoker = mock(false);
        let mut seq = Sequence::new();
        invoker
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(McpError::Timeout(10)));
        invoker
            .expect_invoke()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_result()));

        let result = execute_tool(&invoker, &InvocationRequest::default(), &policy(2)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let mut invoker = mock(true);
        invoker
            .expect_invoke()
            .times(1)
            .returning(|_| Err(McpError::Protocol("garbage".into())));
        invoker.expect_reinitialize().never();

        let err = execute_tool(&invoker, &InvocationRequest::default(), &policy(3))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_attempts_bounded_by_retries() {
        let mut invoker = mock(true);
        invoker
            .expect_invoke()
            .times(3)
            .returning(|_| Err(McpError::ConnectionClosed("down".into())));
        invoker.expect_reinitialize().times(2).returning(|| Ok(()));

        let result = execute_tool(&invoker, &InvocationRequest::default(), &policy(3)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_zero_retries_still_attempts_once() {
        let mut invoker = mock(true);
        invoker
            .expect_invoke()
            .times(1)
            .returning(|_| Err(McpError::ConnectionClosed("down".into())));
        invoker.expect_reinitialize().never();

        let result = execute_tool(&invoker, &InvocationRequest::default(), &policy(0)).await;
        assert!(result.is_err());
    }
}
