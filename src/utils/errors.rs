use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Lowercase fragments that mark an otherwise untyped error as a connection problem.
const CONNECTION_KEYWORDS: [&str; 5] = ["connection", "broken", "closed", "reset", "timeout"];

#[derive(Error, Debug)]
pub enum McpError {
    #[error("server not found: {0}")]
    ServerNotFound(String),

    #[error("server {server} not initialized: {cause}")]
    NotInitialized { server: String, cause: String },

    #[error("failed to initialize server {server}: {cause}")]
    Initialization { server: String, cause: String },

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("backend error {code}: {message}")]
    Backend { code: i32, message: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for McpError {
    fn from(e: anyhow::Error) -> Self {
        McpError::InternalError(e.to_string())
    }
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            McpError::TransportError(format!("request timeout: {}", e))
        } else if e.is_connect() {
            McpError::ConnectionClosed(format!("connection failed: {}", e))
        } else {
            McpError::TransportError(e.to_string())
        }
    }
}

impl McpError {
    /// Whether a failed call may succeed if attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_) | Self::ConnectionClosed(_) | Self::Timeout(_) | Self::Io(_)
        )
    }

    /// Whether the error means the underlying connection is gone.
    ///
    /// Typed kinds are decided first; anything else falls back to scanning the
    /// message for connection-related keywords. Errors that match neither are
    /// treated as application failures on an intact connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::ConnectionClosed(_) | Self::Io(_) => true,
            Self::NotInitialized { .. } => true,
            _ => {
                let message = self.to_string().to_lowercase();
                CONNECTION_KEYWORDS.iter().any(|k| message.contains(k))
            }
        }
    }

    /// Attach the backend name to the message while keeping the error kind.
    pub fn for_server(self, server: &str) -> Self {
        match self {
            Self::TransportError(msg) => Self::TransportError(format!("{}: {}", server, msg)),
            Self::ConnectionClosed(msg) => Self::ConnectionClosed(format!("{}: {}", server, msg)),
            Self::Protocol(msg) => Self::Protocol(format!("{}: {}", server, msg)),
            Self::Backend { code, message } => Self::Backend {
                code,
                message: format!("{}: {}", server, message),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ServerNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::NotInitialized { .. } | Self::Initialization { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::TransportError(_)
            | Self::ConnectionClosed(_)
            | Self::Protocol(_)
            | Self::Backend { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ServerNotFound(_) => "SERVER_NOT_FOUND",
            Self::NotInitialized { .. } => "NOT_INITIALIZED",
            Self::Initialization { .. } => "INITIALIZATION_ERROR",
            Self::TransportError(_) => "TRANSPORT_ERROR",
            Self::ConnectionClosed(_) => "CONNECTION_CLOSED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InternalError(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl IntoResponse for McpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

pub type McpResult<T> = Result<T, McpError>;
