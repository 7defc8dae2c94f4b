//! Node configuration.
//!
//! Configuration is read from a YAML file. Every field has a default, so a
//! missing file or a partial file is fine; command-line flags override the
//! loaded values in `main`.

use crate::error::NodeError;
use crate::observability::LogFormat;
use crate::validation::{validate_http_path, validate_log_level};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use validator::Validate;

/// Configuration for the switchyard node.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP/WebSocket listen address.
    pub listen_addr: SocketAddr,
    /// Log level.
    #[validate(custom(function = "validate_log_level"))]
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Catalog publishing.
    #[validate(nested)]
    pub catalog: CatalogConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            catalog: CatalogConfig::default(),
        }
    }
}

/// Where and how the AsyncAPI catalog is served.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct CatalogConfig {
    /// Document title.
    #[validate(length(min = 1, max = 128))]
    pub title: String,
    /// Document version.
    #[validate(length(min = 1, max = 32))]
    pub version: String,
    /// Document description.
    pub description: Option<String>,
    /// Path of the JSON document.
    #[validate(custom(function = "validate_http_path"))]
    pub path: String,
    /// Path of the HTML documentation page.
    #[validate(custom(function = "validate_http_path"))]
    pub docs_path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            title: "Switchyard chat".to_string(),
            version: "1.0.0".to_string(),
            description: Some("Chat over websocket".to_string()),
            path: "/asyncapi.json".to_string(),
            docs_path: "/docs".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn check(&self) -> Result<(), NodeError> {
        self.validate()?;
        if self.catalog.path == self.catalog.docs_path {
            return Err(NodeError::InvalidConfig(
                "catalog.path and catalog.docs_path must differ".into(),
            ));
        }
        Ok(())
    }
}
