//! Error types for the node.

use switchyard_catalog::CatalogError;
use switchyard_router::RouterError;
use thiserror::Error;

/// Node errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// I/O error (config file, listener).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid YAML for [`NodeConfig`](crate::config::NodeConfig).
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Router setup failed.
    #[error("router error: {0}")]
    Router(#[from] RouterError),

    /// Catalog generation failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl From<validator::ValidationErrors> for NodeError {
    fn from(errors: validator::ValidationErrors) -> Self {
        NodeError::InvalidConfig(crate::validation::describe_errors(&errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NodeError::InvalidConfig("catalog.path: http_path".into());
        assert_eq!(err.to_string(), "invalid configuration: catalog.path: http_path");

        let err = NodeError::from(RouterError::DuplicatePath("/chat".into()));
        assert_eq!(err.to_string(), "router error: path '/chat' is already registered");
    }
}
