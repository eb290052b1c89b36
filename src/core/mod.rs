pub mod gateway;
pub mod health;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod request_id;
pub mod session;

pub use gateway::{execute_tool, InvocationRequest, RetryPolicy, ToolInvoker};
pub use health::{probe_connection, HealthStatus, DEFAULT_PROBE_TIMEOUT};
pub use manager::{ConnectionManager, ConnectionState, ServerStatus};
pub use registry::{ServerHealth, ServerRegistry};
pub use request_id::RequestIdGenerator;
pub use session::McpSession;
