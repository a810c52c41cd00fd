//! HTML document parsing
//!
//! This module is the boundary to the document tree library:
//! - Turning a response body into a `scraper` document
//! - Small query helpers used by the built-in tasks (title, links)

use crate::HarvestError;
use scraper::{Html, Selector};
use url::Url;

/// Parses a response body into a document tree
///
/// The body must be valid UTF-8. Markup errors are recovered the way an HTML5
/// parser does and never fail the parse.
///
/// # Example
///
/// ```
/// use sumi_harvest::crawler::{page_title, parse_document};
///
/// let root = parse_document(b"<html><head><title>Test</title></head></html>").unwrap();
/// assert_eq!(page_title(&root), Some("Test".to_string()));
/// ```
pub fn parse_document(bytes: &[u8]) -> Result<Html, HarvestError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| HarvestError::Parse(format!("body is not valid UTF-8: {}", e)))?;
    Ok(Html::parse_document(text))
}

/// Extracts the page title from the document
pub fn page_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts every followable `<a href>` link as an absolute URL
pub fn page_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL
///
/// Returns None for fragment-only links, non-HTTP(S) schemes and hrefs that
/// do not resolve.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}
