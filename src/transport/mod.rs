pub mod adapter;
pub mod headers;
pub mod sse;
pub mod sse_parser;
pub mod stdio;
pub mod streamable;
pub mod traits;

pub use adapter::{adapter_for, Headers, HttpAdapter, HttpFlavor, StdioAdapter, TransportAdapter};
pub use headers::{clean_headers, forwarded_headers};
pub use sse::SseTransport;
pub use stdio::StdioTransport;
pub use streamable::StreamableHttpTransport;
pub use traits::Transport;
