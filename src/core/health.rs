//! Liveness probing for persistent sessions.

use crate::utils::errors::McpResult;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Disconnected(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Run `probe` under `timeout` and classify the outcome. The probe's value is discarded.
///
/// Timeouts and connection-class errors mean the session is gone. Any other
/// error is an application failure on a connection that still answers.
pub async fn probe_connection<T, F>(server: &str, timeout: Duration, probe: F) -> HealthStatus
where
    F: Future<Output = McpResult<T>>,
{
    info!(server = %server, "Testing connection health");
    match tokio::time::timeout(timeout, probe).await {
        Err(_) => {
            warn!(server = %server, "Connection test timed out after {:?}", timeout);
            HealthStatus::Disconnected(format!("probe timed out after {:?}", timeout))
        }
        Ok(Ok(_)) => HealthStatus::Healthy,
        Ok(Err(e)) if e.is_connection_error() => {
            warn!(server = %server, "Connection error: {}", e);
            HealthStatus::Disconnected(e.to_string())
        }
        Ok(Err(e)) => {
            error!(server = %server, "Non-connection error during health check: {}", e);
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::McpError;

    #[tokio::test]
    async fn test_success_is_healthy() {
        let status = probe_connection("s", Duration::from_secs(1), async { Ok(vec![1, 2]) }).await;
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_timeout_is_disconnected() {
        let status = probe_connection("s", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, McpError>(())
        })
        .await;
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn test_closed_and_io_errors_are_disconnected() {
        let status = probe_connection("s", Duration::from_secs(1), async {
            Err::<(), _>(McpError::ConnectionClosed("stdout closed".into()))
        })
        .await;
        assert!(!status.is_healthy());

        let status = probe_connection("s", Duration::from_secs(1), async {
            Err::<(), _>(McpError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            )))
        })
        .await;
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn test_keyword_error_is_disconnected() {
        let status = probe_connection("s", Duration::from_secs(1), async {
            Err::<(), _>(McpError::InternalError("Broken session".into()))
        })
        .await;
        assert!(!status.is_healthy());
    }

    #[tokio::test]
    async fn test_application_error_is_healthy() {
        let status = probe_connection("s", Duration::from_secs(1), async {
            Err::<(), _>(McpError::Backend {
                code: -32601,
                message: "method not found".into(),
            })
        })
        .await;
        assert_eq!(status, HealthStatus::Healthy);
    }
}
