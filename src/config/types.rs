use crate::core::gateway::RetryPolicy;
use crate::utils::errors::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default, rename = "mcpServers", alias = "mcp_servers")]
    pub mcp_servers: BTreeMap<String, BackendConfig>,
}

impl RouterConfig {
    /// Validate every configured backend and turn it into a descriptor.
    pub fn descriptors(&self) -> McpResult<Vec<BackendDescriptor>> {
        self.mcp_servers
            .iter()
            .map(|(name, backend)| backend.to_descriptor(name))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Retry and health probe tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            retry_delay_ms: 1000,
            probe_timeout_ms: 5000,
        }
    }
}

impl GatewayConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Backend entry as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BackendConfig {
    pub protocol: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub url: Option<String>,
    pub headers: HashMap<String, String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl BackendConfig {
    pub fn to_descriptor(&self, name: &str) -> McpResult<BackendDescriptor> {
        let protocol = match &self.protocol {
            Some(p) => p.parse::<Protocol>()?,
            None => Protocol::Stdio,
        };

        let endpoint = match protocol {
            Protocol::Stdio => {
                let command = self
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| {
                        McpError::ConfigError(format!("server {} requires a command", name))
                    })?;
                Endpoint::Stdio(StdioEndpoint {
                    command,
                    args: self.args.clone(),
                    env: self.env.clone(),
                })
            }
            Protocol::Sse | Protocol::Streamable => {
                let raw = self.url.as_deref().ok_or_else(|| {
                    McpError::ConfigError(format!("server {} requires a url", name))
                })?;
                let url = raw.parse::<Url>().map_err(|e| {
                    McpError::ConfigError(format!("server {} has invalid url {}: {}", name, raw, e))
                })?;
                let http = HttpEndpoint {
                    url,
                    headers: self.headers.clone(),
                };
                if protocol == Protocol::Sse {
                    Endpoint::Sse(http)
                } else {
                    Endpoint::Streamable(http)
                }
            }
        };

        Ok(BackendDescriptor {
            name: name.to_string(),
            endpoint,
            description: self.description.clone().unwrap_or_default(),
            tags: self.tags.clone(),
        })
    }
}

/// Transport kind used to reach a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    #[default]
    Stdio,
    Sse,
    Streamable,
}

impl Protocol {
    /// Only the persistent stdio session can be re-handshaked in place.
    pub fn supports_reinitialize(self) -> bool {
        matches!(self, Protocol::Stdio)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Stdio => write!(f, "stdio"),
            Protocol::Sse => write!(f, "sse"),
            Protocol::Streamable => write!(f, "streamable"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Protocol::Stdio),
            "sse" | "mcp-sse" => Ok(Protocol::Sse),
            "streamable" | "mcp-streamable" | "streamable-http" | "streamable_http" => {
                Ok(Protocol::Streamable)
            }
            _ => Err(McpError::ConfigError(format!("Unknown protocol: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StdioEndpoint {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpEndpoint {
    pub url: Url,
    pub headers: HashMap<String, String>,
}

/// Where a backend lives; the variant fixes the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    Stdio(StdioEndpoint),
    Sse(HttpEndpoint),
    Streamable(HttpEndpoint),
}

/// Fully validated description of one backend
#[derive(Debug, Clone, PartialEq)]
pub struct BackendDescriptor {
    pub name: String,
    pub endpoint: Endpoint,
    pub description: String,
    pub tags: Vec<String>,
}

impl BackendDescriptor {
    pub fn stdio(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::Stdio(StdioEndpoint {
                command: command.into(),
                args,
                env: HashMap::new(),
            }),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn sse(name: impl Into<String>, url: Url, headers: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::Sse(HttpEndpoint { url, headers }),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn streamable(name: impl Into<String>, url: Url, headers: HashMap<String, String>) -> Self {
        Self {
            name: name.into(),
            endpoint: Endpoint::Streamable(HttpEndpoint { url, headers }),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self.endpoint {
            Endpoint::Stdio(_) => Protocol::Stdio,
            Endpoint::Sse(_) => Protocol::Sse,
            Endpoint::Streamable(_) => Protocol::Streamable,
        }
    }

    /// Text indexed for discovery: name, description and tags.
    pub fn document(&self) -> String {
        let mut doc = self.name.clone();
        if !self.description.is_empty() {
            doc.push(' ');
            doc.push_str(&self.description);
        }
        for tag in &self.tags {
            doc.push(' ');
            doc.push_str(tag);
        }
        doc
    }
}
