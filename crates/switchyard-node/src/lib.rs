//! # Switchyard Node
//!
//! WebSocket server hosting a switchyard [`Router`](switchyard_router::Router).
//!
//! The node wires the router to axum: every upgraded connection becomes a
//! router client, routed by its request path. It also publishes the
//! router's AsyncAPI catalog and a documentation page, and ships a demo
//! chat API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 HTTP (axum)                  │
//! │  GET /asyncapi.json   GET /docs   /api/stats │
//! │  any other path → WebSocket upgrade          │
//! └──────────────────────┬───────────────────────┘
//!                        │ frames, close codes
//! ┌──────────────────────▼───────────────────────┐
//! │              switchyard-router               │
//! │  root (*) → middleware, validator, errors    │
//! │  /        → lobby                            │
//! │  /chat    → room                             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration with validated fields
//! - [`ws_api`]: HTTP routes and the WebSocket transport
//! - [`chat`]: demo chat router
//! - [`observability`]: logging setup
//! - [`validation`]: shared field rules

pub mod chat;
pub mod config;
pub mod error;
pub mod observability;
pub mod validation;
pub mod ws_api;

pub use config::{CatalogConfig, NodeConfig};
pub use error::NodeError;
pub use ws_api::{app, serve, AppState};

use std::sync::Arc;
use switchyard_catalog::{CatalogParams, Info, Server};
use switchyard_router::Router;

/// Catalog parameters from the node configuration.
pub fn catalog_params(config: &NodeConfig) -> CatalogParams {
    let mut info = Info::new(&config.catalog.title, &config.catalog.version);
    if let Some(description) = &config.catalog.description {
        info = info.with_description(description);
    }
    CatalogParams::new(info).server("default", Server::ws(format!("ws://{}", config.listen_addr)))
}

/// Build the HTTP application serving `router`.
pub fn build_app(config: &NodeConfig, router: Arc<Router>) -> Result<axum::Router, NodeError> {
    config.check()?;
    let state = AppState::new(router, catalog_params(config), &config.catalog);
    Ok(app(state, &config.catalog))
}
