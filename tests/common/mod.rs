#![allow(dead_code)]

use mcp_router::config::BackendDescriptor;
use mcp_router::core::RetryPolicy;
use std::time::Duration;

pub const MOCK_BACKEND: &str = env!("CARGO_BIN_EXE_mock-mcp-backend");

pub fn mock_stdio(name: &str, flags: &[&str]) -> BackendDescriptor {
    BackendDescriptor::stdio(
        name,
        MOCK_BACKEND,
        flags.iter().map(|f| f.to_string()).collect(),
    )
}

pub fn fast_retry(retries: u32) -> RetryPolicy {
    RetryPolicy {
        retries,
        delay: Duration::from_millis(10),
    }
}
