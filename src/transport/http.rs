use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use std::sync::RwLock;
use url::Url;

use super::{Page, Transport, TransportError, TransportKind, TransportSettings};
use crate::form::{FormMethod, FormSubmission};

/// Plain request/response transport.
///
/// Holds one client per check; the cookie jar carries the portal's session
/// from step to step and is thrown away by `begin_check`.
pub struct HttpTransport {
    client: RwLock<Client>,
    settings: TransportSettings,
}

impl HttpTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, TransportError> {
        let client = build_client(&settings)?;
        Ok(Self {
            client: RwLock::new(client),
            settings,
        })
    }

    fn client(&self) -> Client {
        match self.client.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn into_page(response: Response) -> Result<Page, TransportError> {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        if status >= 400 {
            tracing::debug!("{} answered with status {}", url, status);
            return Err(TransportError::Status(status));
        }
        let content = response.text().await.map_err(classify)?;
        Ok(Page::new(content, url, status))
    }
}

fn build_client(settings: &TransportSettings) -> Result<Client, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"));

    Client::builder()
        .user_agent(settings.user_agent.clone())
        .default_headers(headers)
        .cookie_store(true)
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .build()
        .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {}", e)))
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if let Some(status) = err.status() {
        TransportError::Status(status.as_u16())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn begin_check(&self) -> Result<(), TransportError> {
        let fresh = build_client(&self.settings)?;
        match self.client.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        Ok(())
    }

    async fn fetch(&self, url: &Url) -> Result<Page, TransportError> {
        tracing::debug!("GET {}", url);
        let response = self.client().get(url.clone()).send().await.map_err(classify)?;
        Self::into_page(response).await
    }

    async fn submit(&self, form: &FormSubmission) -> Result<Page, TransportError> {
        tracing::debug!("{:?} {} ({} fields)", form.method, form.action, form.fields.len());
        let client = self.client();
        let request = match form.method {
            FormMethod::Get => client.get(form.action.clone()).query(form.fields.pairs()),
            FormMethod::Post => client.post(form.action.clone()).form(form.fields.pairs()),
        };
        let response = request.send().await.map_err(classify)?;
        Self::into_page(response).await
    }
}
