use axum::http::StatusCode;
use mcp_router::McpError;

#[test]
fn test_error_status_codes() {
    assert_eq!(
        McpError::ServerNotFound("test".to_string()).status_code(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        McpError::NotInitialized {
            server: "test".to_string(),
            cause: "spawn failed".to_string(),
        }
        .status_code(),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
        McpError::ConnectionClosed("eof".to_string()).status_code(),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(McpError::Timeout(5000).status_code(), StatusCode::GATEWAY_TIMEOUT);
}

#[test]
fn test_transient_and_fatal_kinds() {
    assert!(McpError::TransportError("HTTP error: 503".into()).is_retryable());
    assert!(McpError::ConnectionClosed("stdout closed".into()).is_retryable());
    assert!(McpError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_retryable());

    assert!(!McpError::Protocol("bad json".into()).is_retryable());
    assert!(!McpError::ConfigError("no url".into()).is_retryable());
    assert!(!McpError::Backend {
        code: -32602,
        message: "unknown tool".into()
    }
    .is_retryable());
}

#[test]
fn test_connection_classification_order() {
    assert!(McpError::Timeout(10).is_connection_error());
    let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
    assert!(McpError::Io(reset).is_connection_error());
    // Untyped errors fall back to the message
    assert!(McpError::InternalError("Connection reset by peer".into()).is_connection_error());
    assert!(McpError::TransportError("pipe is broken".into()).is_connection_error());
    assert!(!McpError::InternalError("division by zero".into()).is_connection_error());
}

#[test]
fn test_server_context_keeps_kind() {
    let err = McpError::ConnectionClosed("stdout closed".into()).for_server("files");
    assert!(matches!(err, McpError::ConnectionClosed(ref m) if m == "files: stdout closed"));
    assert_eq!(err.error_code(), "CONNECTION_CLOSED");

    let err = McpError::Timeout(10).for_server("files");
    assert!(matches!(err, McpError::Timeout(10)));
}
