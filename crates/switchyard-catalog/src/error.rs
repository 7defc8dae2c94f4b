//! Error types for catalog generation.

use thiserror::Error;

/// Catalog errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Document metadata is incomplete.
    #[error("invalid catalog info: {0}")]
    InvalidInfo(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(String),
}

impl From<askama::Error> for CatalogError {
    fn from(err: askama::Error) -> Self {
        CatalogError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CatalogError::InvalidInfo("title is empty".into());
        assert_eq!(err.to_string(), "invalid catalog info: title is empty");
    }
}
