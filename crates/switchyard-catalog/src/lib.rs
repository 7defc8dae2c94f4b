//! Switchyard Catalog
//!
//! Documents a switchyard router as an AsyncAPI 2.0.0 document:
//! - one channel per routed path, with `{param}` segments as parameters
//! - client messages under `publish`, server messages under `subscribe`
//! - `$id`-tagged schemas collected under `components`
//!
//! [`html_doc`] renders a page that displays the document with the AsyncAPI
//! web component.

pub mod asyncapi;
pub mod error;
pub mod html;

pub use asyncapi::{AsyncApiBuilder, CatalogParams, Contact, Info, License, Server, ASYNCAPI_VERSION};
pub use error::CatalogError;
pub use html::{html_doc, DEFAULT_TITLE};
