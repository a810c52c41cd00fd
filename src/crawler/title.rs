//! Built-in page title task

use crate::crawler::http::Request;
use crate::crawler::parser::{page_links, page_title};
use crate::entity;
use crate::storage::Storer;
use crate::task::{DomTask, Requester};
use crate::HarvestError;
use chrono::{DateTime, Utc};
use reqwest::Method;
use scraper::Html;
use url::Url;

/// Table the [`TitleTask`] stores into
pub const PAGE_TITLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS page_title (
    url TEXT PRIMARY KEY,
    title TEXT,
    link_count INTEGER NOT NULL,
    fetched_at TEXT NOT NULL
);
"#;

/// What the [`TitleTask`] learned about a page
#[derive(Debug, Clone, PartialEq)]
pub struct PageTitle {
    pub url: String,
    pub title: Option<String>,
    pub link_count: i64,
    pub fetched_at: DateTime<Utc>,
}

entity!(PageTitle { #[key] url, title, link_count, fetched_at });

/// Fetches a page and stores its title and outgoing link count
#[derive(Debug, Clone)]
pub struct TitleTask {
    url: Url,
}

impl TitleTask {
    pub fn new(url: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            url: Url::parse(url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds the record for a parsed page
    pub fn summarize(&self, root: &Html) -> PageTitle {
        PageTitle {
            url: self.url.to_string(),
            title: page_title(root),
            link_count: page_links(root, &self.url).len() as i64,
            fetched_at: Utc::now(),
        }
    }
}

impl Requester for TitleTask {
    fn request(&self) -> Request {
        Request::new(Method::GET, self.url.clone())
    }
}

impl DomTask for TitleTask {
    fn handle(&self, root: &Html, storer: &dyn Storer) -> Result<(), HarvestError> {
        let page = self.summarize(root);
        tracing::debug!("{} has title {:?}", page.url, page.title);
        storer.store(Box::new(page))?;
        Ok(())
    }
}
