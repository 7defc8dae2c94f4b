//! Documentation page rendering the catalog with the AsyncAPI web component.

use crate::error::CatalogError;
use askama::Template;

/// Title used when none is given.
pub const DEFAULT_TITLE: &str = "Websocket documentation";

/// Documentation page.
#[derive(Template)]
#[template(path = "docs.html")]
pub struct DocsTemplate<'a> {
    /// Page title.
    pub title: &'a str,
    /// URL the page loads the catalog document from.
    pub catalog_url: &'a str,
}

/// Render the documentation page for the catalog served at `catalog_url`.
pub fn html_doc(catalog_url: &str, title: Option<&str>) -> Result<String, CatalogError> {
    let page = DocsTemplate {
        title: title.unwrap_or(DEFAULT_TITLE),
        catalog_url,
    };
    Ok(page.render()?)
}
