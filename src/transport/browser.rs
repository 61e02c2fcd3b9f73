use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use super::{Page, PageSignature, Transport, TransportError, TransportKind, TransportSettings};
use crate::form::{FormMethod, FormSubmission};
use crate::utils::error::AppError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const NAVIGATION_STATUS_JS: &str = r#"
(() => {
    const entry = performance.getEntriesByType('navigation')[0];
    return entry && entry.responseStatus ? entry.responseStatus : 200;
})()
"#;

// Set on the old document by `submit_script`; a fresh document does not carry it.
const LOAD_STATE_JS: &str = "(() => window.__citaPending === true ? 'pending' : document.readyState)()";

const SETTLED_STATE_JS: &str = r#"
(() => document.readyState === 'complete'
    ? performance.getEntriesByType('resource').length
    : -1)()
"#;

/// Headless Chrome transport. One tab per province check.
pub struct BrowserTransport {
    browser: Arc<Browser>,
    tab: Mutex<Option<Arc<Tab>>>,
    settings: TransportSettings,
}

impl BrowserTransport {
    pub fn launch(settings: TransportSettings, chrome_path: Option<&str>, headless: bool) -> Result<Self, AppError> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(headless)
            .sandbox(false)
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(path) = chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        tracing::info!("Headless browser launched");
        Ok(Self {
            browser: Arc::new(browser),
            tab: Mutex::new(None),
            settings,
        })
    }

    fn current_tab(&self) -> Result<Arc<Tab>, TransportError> {
        let guard = self.tab.lock().map_err(|_| TransportError::Browser("tab lock poisoned".into()))?;
        guard
            .clone()
            .ok_or_else(|| TransportError::Browser("no open tab, begin_check was not called".into()))
    }

    fn replace_tab(&self, tab: Option<Arc<Tab>>) -> Option<Arc<Tab>> {
        match self.tab.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, tab),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), tab),
        }
    }
}

/// Run a blocking driver call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, TransportError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TransportError::Browser(format!("driver task failed: {}", e)))?
        .map_err(classify)
}

fn classify(err: anyhow::Error) -> TransportError {
    if err.downcast_ref::<headless_chrome::util::Timeout>().is_some() {
        return TransportError::Timeout;
    }
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        TransportError::Timeout
    } else if lower.contains("net::err") {
        TransportError::Connect(message)
    } else {
        TransportError::Browser(message)
    }
}

fn snapshot(tab: &Tab) -> anyhow::Result<Page> {
    let content = tab.get_content()?;
    let url = tab.get_url();
    let status = tab
        .evaluate(NAVIGATION_STATUS_JS, false)?
        .value
        .and_then(|v| v.as_u64())
        .unwrap_or(200) as u16;
    Ok(Page::new(content, url, status))
}

/// Where the tab is after a form submission was fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    /// Still the document the form was submitted from.
    Pending,
    /// New document, not fully loaded.
    Loading,
    Complete,
}

impl LoadState {
    fn from_ready_state(value: Option<&str>) -> Self {
        match value {
            Some("complete") => LoadState::Complete,
            Some("pending") | None => LoadState::Pending,
            Some(_) => LoadState::Loading,
        }
    }
}

async fn read_load_state(tab: Arc<Tab>) -> LoadState {
    let state = blocking(move || {
        let value = tab.evaluate(LOAD_STATE_JS, false)?.value;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    })
    .await;

    match state {
        Ok(state) => LoadState::from_ready_state(state.as_deref()),
        Err(e) => {
            // The execution context goes away while the next document commits.
            tracing::debug!("load state check failed: {}", e);
            LoadState::Pending
        }
    }
}

/// Poll `check` until the new document has completely loaded.
async fn wait_for_load<F, Fut>(mut check: F, timeout: Duration) -> Result<(), TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LoadState>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await == LoadState::Complete {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(TransportError::Timeout);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn checked(page: Page) -> Result<Page, TransportError> {
    if page.status >= 400 {
        Err(TransportError::Status(page.status))
    } else {
        Ok(page)
    }
}

/// Script that posts `form` from inside the page, so cookies and referrer
/// behave exactly as a user submission would.
fn submit_script(form: &FormSubmission) -> Result<String, TransportError> {
    let action = serde_json::to_string(form.action.as_str())
        .map_err(|e| TransportError::Request(e.to_string()))?;
    let fields = serde_json::to_string(form.fields.pairs())
        .map_err(|e| TransportError::Request(e.to_string()))?;
    let method = match form.method {
        FormMethod::Get => "get",
        FormMethod::Post => "post",
    };
    Ok(format!(
        r#"
(() => {{
    window.__citaPending = true;
    const form = document.createElement('form');
    form.method = '{method}';
    form.action = {action};
    form.style.display = 'none';
    for (const [name, value] of {fields}) {{
        const input = document.createElement('input');
        input.type = 'hidden';
        input.name = name;
        input.value = value;
        form.appendChild(input);
    }}
    document.body.appendChild(form);
    HTMLFormElement.prototype.submit.call(form);
    return true;
}})()
"#
    ))
}

#[async_trait]
impl Transport for BrowserTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Browser
    }

    async fn begin_check(&self) -> Result<(), TransportError> {
        self.end_check().await;

        let browser = Arc::clone(&self.browser);
        let user_agent = self.settings.user_agent.clone();
        let element_timeout = self.settings.element_timeout;
        let tab = blocking(move || {
            let tab = browser.new_tab()?;
            tab.set_user_agent(&user_agent, Some("es-ES,es;q=0.9"), None)?;
            tab.set_default_timeout(element_timeout);
            Ok(tab)
        })
        .await?;

        self.replace_tab(Some(tab));
        Ok(())
    }

    async fn end_check(&self) {
        if let Some(tab) = self.replace_tab(None) {
            let closed = blocking(move || tab.close(true)).await;
            if let Err(e) = closed {
                tracing::debug!("Failed to close tab: {}", e);
            }
        }
    }

    async fn fetch(&self, url: &Url) -> Result<Page, TransportError> {
        let tab = self.current_tab()?;
        let target = url.to_string();
        tracing::debug!("navigate {}", target);
        let page = blocking(move || {
            tab.navigate_to(&target)?;
            tab.wait_until_navigated()?;
            snapshot(&tab)
        })
        .await?;
        checked(page)
    }

    async fn submit(&self, form: &FormSubmission) -> Result<Page, TransportError> {
        let tab = self.current_tab()?;
        let script = submit_script(form)?;
        tracing::debug!("submit {} ({} fields)", form.action, form.fields.len());

        let submit_tab = Arc::clone(&tab);
        blocking(move || {
            submit_tab.evaluate(&script, false)?;
            Ok(())
        })
        .await?;

        wait_for_load(|| read_load_state(Arc::clone(&tab)), self.settings.request_timeout).await?;
        let page = blocking(move || snapshot(&tab)).await?;
        checked(page)
    }

    async fn wait_for(&self, current: &Page, signature: &PageSignature) -> Result<Page, TransportError> {
        let tab = self.current_tab()?;
        let deadline = Instant::now() + self.settings.element_timeout;

        if let PageSignature::Element(selector) = signature {
            let selector = selector.clone();
            let timeout = self.settings.element_timeout;
            return match blocking(move || {
                tab.wait_for_element_with_custom_timeout(&selector, timeout)?;
                snapshot(&tab)
            })
            .await
            {
                // The page is there, it just is not the expected one.
                Err(TransportError::Timeout) => Err(TransportError::Unexpected {
                    expected: signature.to_string(),
                    url: current.url.clone(),
                }),
                other => other,
            };
        }

        let mut last_resources: Option<i64> = None;
        loop {
            let settled_tab = Arc::clone(&tab);
            let (url, resources) = blocking(move || {
                let resources = settled_tab
                    .evaluate(SETTLED_STATE_JS, false)?
                    .value
                    .and_then(|v| v.as_i64())
                    .unwrap_or(-1);
                Ok((settled_tab.get_url(), resources))
            })
            .await?;

            let reached = match signature {
                PageSignature::UrlContains(fragment) => url.contains(fragment.as_str()),
                PageSignature::Settled => resources >= 0 && last_resources == Some(resources),
                PageSignature::Element(_) => false,
            };
            if reached {
                let snapshot_tab = Arc::clone(&tab);
                return blocking(move || snapshot(&snapshot_tab)).await;
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Unexpected {
                    expected: signature.to_string(),
                    url: if url.is_empty() { current.url.clone() } else { url },
                });
            }
            last_resources = Some(resources);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
