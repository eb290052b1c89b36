use crate::config::RouterConfig;
use crate::utils::errors::{McpError, McpResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension, falling back to content sniffing
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("yml") | Some("yaml") => ConfigFormat::Yaml,
            Some("toml") => ConfigFormat::Toml,
            _ => {
                if content.trim_start().starts_with('{') {
                    ConfigFormat::Json
                } else {
                    ConfigFormat::Yaml
                }
            }
        }
    }
}

/// Loads the router configuration from disk
pub struct ConfigManager {
    path: PathBuf,
    format: ConfigFormat,
    config: RouterConfig,
}

impl ConfigManager {
    pub async fn new(path: impl AsRef<str>) -> McpResult<Self> {
        let path = PathBuf::from(shellexpand::tilde(path.as_ref()).to_string());
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            McpError::ConfigError(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let format = ConfigFormat::detect(&path, &content);
        debug!("Detected config format: {:?}", format);

        let config = Self::parse_content(&content, format)?;
        info!(
            "Loaded {} backend(s) from {}",
            config.mcp_servers.len(),
            path.display()
        );

        Ok(Self {
            path,
            format,
            config,
        })
    }

    pub fn parse_content(content: &str, format: ConfigFormat) -> McpResult<RouterConfig> {
        let config: RouterConfig = match format {
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| McpError::ConfigError(format!("Failed to parse JSON config: {}", e)))?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| McpError::ConfigError(format!("Failed to parse YAML config: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(content)
                .map_err(|e| McpError::ConfigError(format!("Failed to parse TOML config: {}", e)))?,
        };

        // Surface descriptor errors at load time rather than on first use
        config.descriptors()?;
        Ok(config)
    }

    pub fn get_config(&self) -> RouterConfig {
        self.config.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }
}
