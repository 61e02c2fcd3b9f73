//! Page transports the appointment pipeline runs over.
//!
//! The pipeline only ever speaks to [`Transport`]; `HttpTransport` replays
//! form posts with a cookie-aware HTTP client while `BrowserTransport` drives a
//! headless Chrome tab. Both return the same [`Page`] snapshots.

use async_trait::async_trait;
use clap::ValueEnum;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::form::FormSubmission;

pub mod http;
#[cfg(feature = "browser")]
pub mod browser;

pub use http::HttpTransport;
#[cfg(feature = "browser")]
pub use browser::BrowserTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Browser,
}

impl TransportKind {
    /// Whether pages come back rendered, with scripts run and controls live.
    pub fn renders_pages(self) -> bool {
        matches!(self, TransportKind::Browser)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "http"),
            TransportKind::Browser => write!(f, "browser"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("server responded with status {0}")]
    Status(u16),

    #[error("expected page {expected}, landed on {url}")]
    Unexpected { expected: String, url: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("browser failure: {0}")]
    Browser(String),
}

impl TransportError {
    /// Timeouts, refused connections and 5xx responses are worth another try.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Timeout | TransportError::Connect(_) => true,
            TransportError::Status(status) => *status >= 500,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Status(s) if *s >= 500 => "server_error",
            TransportError::Status(_) => "client_error",
            TransportError::Unexpected { .. } => "unexpected_page",
            TransportError::Request(_) => "request",
            TransportError::Browser(_) => "browser",
        }
    }
}

/// Snapshot of the page a transport call ended on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub content: String,
    pub url: String,
    pub status: u16,
}

impl Page {
    pub fn new(content: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            content: content.into(),
            url: url.into(),
            status,
        }
    }

    /// Final URL of the page, parsed.
    pub fn location(&self) -> Result<Url, TransportError> {
        Url::parse(&self.url).map_err(|e| TransportError::Request(format!("invalid page url '{}': {}", self.url, e)))
    }

    pub fn has_element(&self, selector: &str) -> bool {
        match Selector::parse(selector) {
            Ok(selector) => Html::parse_document(&self.content).select(&selector).next().is_some(),
            Err(_) => false,
        }
    }
}

/// What the page reached after a step must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageSignature {
    /// Final URL contains the fragment.
    UrlContains(String),
    /// An element matching the CSS selector is present.
    Element(String),
    /// No further navigation or network activity.
    Settled,
}

impl PageSignature {
    pub fn url(fragment: &str) -> Self {
        PageSignature::UrlContains(fragment.to_string())
    }

    pub fn matches(&self, page: &Page) -> bool {
        match self {
            PageSignature::UrlContains(fragment) => page.url.contains(fragment.as_str()),
            PageSignature::Element(selector) => page.has_element(selector),
            PageSignature::Settled => true,
        }
    }

    /// Check an already complete page, as a non-rendering transport does.
    pub fn check(&self, page: &Page) -> Result<Page, TransportError> {
        if self.matches(page) {
            Ok(page.clone())
        } else {
            Err(TransportError::Unexpected {
                expected: self.to_string(),
                url: page.url.clone(),
            })
        }
    }
}

impl std::fmt::Display for PageSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageSignature::UrlContains(fragment) => write!(f, "url containing '{}'", fragment),
            PageSignature::Element(selector) => write!(f, "element '{}'", selector),
            PageSignature::Settled => write!(f, "settled page"),
        }
    }
}

/// Timeouts shared by both transports.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub element_timeout: Duration,
}

/// One page-level operation against the portal.
///
/// Calls inside a check are strictly sequential; `begin_check` and
/// `end_check` bracket one province check so that no session state leaks
/// from one check into the next.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Start a fresh session (new cookie jar, new tab).
    async fn begin_check(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Release whatever `begin_check` acquired.
    async fn end_check(&self) {}

    async fn fetch(&self, url: &Url) -> Result<Page, TransportError>;

    async fn submit(&self, form: &FormSubmission) -> Result<Page, TransportError>;

    /// Wait until the page matches `signature`, returning the page as it is then.
    async fn wait_for(&self, current: &Page, signature: &PageSignature) -> Result<Page, TransportError> {
        signature.check(current)
    }
}
