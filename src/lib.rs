//! MCP router: one tool listing and invocation surface over stdio, SSE and
//! streamable HTTP backends, with per-backend lifecycle management, health
//! probing and bounded retry.

pub mod config;
pub mod core;
pub mod discovery;
pub mod http_server;
pub mod transport;
pub mod utils;

pub use config::{BackendDescriptor, RouterConfig};
pub use core::{ConnectionManager, ServerRegistry};
pub use utils::errors::{McpError, McpResult};
