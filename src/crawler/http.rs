//! HTTP transport boundary
//!
//! This module defines the request and response types tasks work with and the
//! [`Doer`] trait that turns one into the other, including:
//! - Building a `reqwest` client with a proper user agent string
//! - A lazily read, explicitly closable response body
//! - Transport error classification

use crate::config::UserAgentConfig;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// A request a task wants fetched
///
/// Requests are plain data so a retry can send the same request again.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Builds a GET request, failing if the URL does not parse
    pub fn get(url: &str) -> Result<Self, HarvestError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }
}

enum BodyState {
    Remote(reqwest::Response),
    Buffered(Vec<u8>),
    Closed,
}

/// A response body that is read at most once
pub struct Body {
    state: BodyState,
}

impl Body {
    /// A body backed by bytes already in memory
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            state: BodyState::Buffered(bytes.into()),
        }
    }

    fn remote(response: reqwest::Response) -> Self {
        Self {
            state: BodyState::Remote(response),
        }
    }

    /// Reads the whole body, after which it is closed
    pub async fn bytes(&mut self) -> Result<Vec<u8>, HarvestError> {
        match std::mem::replace(&mut self.state, BodyState::Closed) {
            BodyState::Buffered(bytes) => Ok(bytes),
            BodyState::Remote(response) => {
                let url = response.url().to_string();
                let bytes = response.bytes().await.map_err(|e| HarvestError::Transport {
                    url,
                    message: e.to_string(),
                })?;
                Ok(bytes.to_vec())
            }
            BodyState::Closed => Err(HarvestError::BodyClosed),
        }
    }

    /// Reads the whole body as UTF-8 text
    pub async fn text(&mut self) -> Result<String, HarvestError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes).map_err(|e| HarvestError::Parse(e.to_string()))
    }

    /// Releases the body without reading it
    pub fn close(&mut self) {
        self.state = BodyState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, BodyState::Closed)
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            BodyState::Remote(_) => "remote",
            BodyState::Buffered(_) => "buffered",
            BodyState::Closed => "closed",
        };
        f.debug_struct("Body").field("state", &state).finish()
    }
}

/// A fetched response
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub fn new(status: StatusCode, url: Url, body: Body) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// Processes a request and returns its response
#[async_trait]
pub trait Doer: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, HarvestError>;
}

#[async_trait]
impl<D: Doer + ?Sized> Doer for std::sync::Arc<D> {
    async fn fetch(&self, request: &Request) -> Result<Response, HarvestError> {
        (**self).fetch(request).await
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::UserAgentConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent(config))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Formats the user agent as `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// [`Doer`] over a `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpDoer {
    client: Client,
}

impl HttpDoer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from a user agent configuration
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, HarvestError> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Doer for HttpDoer {
    async fn fetch(&self, request: &Request) -> Result<Response, HarvestError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                format!("Connection failed: {}", e)
            } else {
                e.to_string()
            };
            HarvestError::Transport {
                url: request.url.to_string(),
                message,
            }
        })?;

        tracing::debug!("{} {} -> {}", request.method, request.url, response.status());

        Ok(Response {
            status: response.status(),
            url: response.url().clone(),
            headers: response.headers().clone(),
            body: Body::remote(response),
        })
    }
}
