//! Chromium over the DevTools protocol.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chromiumoxide::{
    Browser, BrowserConfig, Element, Handler, Page,
    cdp::{
        browser_protocol::{
            network::SetUserAgentOverrideParams, page::AddScriptToEvaluateOnNewDocumentParams,
        },
        js_protocol::runtime::EvaluateParams,
    },
    error::CdpError,
};
use futures::StreamExt;
use log::{info, warn};
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinHandle, time::Instant};

use crate::{
    driver::{BrowserDriver, ElementTarget, PageDriver},
    error::DriverError,
    site::PAGE_PRELUDE,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long the resource count must hold still to count as quiescent.
const IDLE_MS: u64 = 1000;

/// Protocol messages Chromium sends once a tab or its renderer is gone.
const TARGET_GONE: [&str; 5] = [
    "Target closed",
    "Target crashed",
    "No target with given id",
    "Session with given id not found",
    "Inspected target navigated or closed",
];

fn protocol(err: CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

/// `Closed` when the page can no longer be driven, `Protocol` otherwise.
fn classify(err: &CdpError) -> DriverError {
    match err {
        CdpError::NoResponse | CdpError::ChannelSendError(_) => DriverError::Closed,
        other => {
            let text = other.to_string();
            if TARGET_GONE.iter().any(|marker| text.contains(marker)) {
                DriverError::Closed
            } else {
                DriverError::Protocol(text)
            }
        }
    }
}

/// Evaluated as a plain expression; promises are awaited.
fn expression(script: &str) -> Result<EvaluateParams, DriverError> {
    EvaluateParams::builder()
        .expression(script)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(DriverError::Protocol)
}

/// The one browser process shared by every session.
pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl ChromiumBrowser {
    pub async fn launch(headless: bool) -> Result<Self, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(DriverError::Launch)?;

        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|err| DriverError::Launch(err.to_string()))?;
        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));
        info!("browser launched (headless: {headless})");

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!("closing browser failed: {err}");
        }
        let _ = browser.wait().await;
        self.handler_task.abort();
        info!("browser closed");
    }
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                warn!("browser handler event error: {err}");
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

#[async_trait]
impl BrowserDriver for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn PageDriver>, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Closed);
        }
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(protocol)?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(PAGE_PRELUDE))
            .await
            .map_err(protocol)?;
        Ok(Box::new(ChromiumPage {
            page,
            browser_closed: Arc::clone(&self.closed),
            gone: AtomicBool::new(false),
        }))
    }
}

pub struct ChromiumPage {
    page: Page,
    browser_closed: Arc<AtomicBool>,
    /// Set once the tab is closed or a call reports its target gone.
    gone: AtomicBool,
}

impl ChromiumPage {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.browser_closed.load(Ordering::SeqCst) || self.gone.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        Ok(())
    }

    fn fail(&self, err: CdpError) -> DriverError {
        let mapped = classify(&err);
        if matches!(mapped, DriverError::Closed) {
            warn!("page target is gone: {err}");
            self.gone.store(true, Ordering::SeqCst);
        }
        mapped
    }

    /// Lookup misses become `NotFound`; a dead target stays `Closed`.
    fn lookup_failed(&self, err: CdpError, what: impl FnOnce() -> String) -> DriverError {
        match self.fail(err) {
            DriverError::Closed => DriverError::Closed,
            _ => DriverError::NotFound(what()),
        }
    }

    async fn find(&self, target: &ElementTarget) -> Result<Element, DriverError> {
        self.ensure_open()?;
        match target {
            ElementTarget::First(selector) => self
                .page
                .find_element(selector.as_str())
                .await
                .map_err(|err| self.lookup_failed(err, || selector.clone())),
            ElementTarget::Nested {
                container,
                container_index,
                item,
                item_index,
            } => {
                let describe = || format!("{container}[{container_index}] {item}[{item_index}]");
                let containers = self
                    .page
                    .find_elements(container.as_str())
                    .await
                    .map_err(|err| self.lookup_failed(err, describe))?;
                let parent = containers
                    .get(*container_index)
                    .ok_or_else(|| DriverError::NotFound(describe()))?;
                let mut items = parent
                    .find_elements(item.as_str())
                    .await
                    .map_err(|err| self.lookup_failed(err, describe))?;
                if *item_index >= items.len() {
                    return Err(DriverError::NotFound(describe()));
                }
                Ok(items.swap_remove(*item_index))
            }
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.page.goto(url).await.map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn set_user_agent(
        &self,
        user_agent: &str,
        accept_language: &str,
    ) -> Result<(), DriverError> {
        let mut params = SetUserAgentOverrideParams::new(user_agent);
        params.accept_language = Some(accept_language.to_string());
        self.ensure_open()?;
        self.page
            .set_user_agent(params)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn wait_for_element(&self, selector: &str, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            match self.page.find_element(selector).await {
                Ok(_) => return Ok(()),
                Err(err) => {
                    if let DriverError::Closed = self.fail(err) {
                        return Err(DriverError::Closed);
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout {
                    what: format!("element `{selector}`"),
                    secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self.find(&ElementTarget::first(selector)).await?;
        element.click().await.map_err(|err| self.fail(err))?;
        element.type_str(text).await.map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn click(&self, target: &ElementTarget) -> Result<(), DriverError> {
        let element = self.find(target).await?;
        element.click().await.map_err(|err| self.fail(err))?;
        Ok(())
    }

    async fn eval(&self, script: &str) -> Result<Value, DriverError> {
        self.ensure_open()?;
        let result = self
            .page
            .evaluate_expression(expression(script)?)
            .await
            .map_err(|err| self.fail(err))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Polls readyState and the resource-timing count in the page until both
    /// hold still for a second. A timeout is logged, not returned.
    async fn wait_stable(&self, timeout: Duration) -> Result<(), DriverError> {
        let timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        let script = format!(
            r#"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = {IDLE_MS};
                const interval = 250;
                const start = Date.now();
                const count = () => {{
                    try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }}
                }};
                let last = count();
                let stableMs = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const current = count();
                    if (document.readyState === 'complete' && current === last) {{
                        stableMs += interval;
                        if (stableMs >= idleMs) {{ return true; }}
                    }} else {{
                        stableMs = 0;
                    }}
                    last = current;
                }}
                return false;
            }})()"#
        );

        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            // Evaluation fails while a navigation swaps the document; retry on the new one.
            match self.page.evaluate_expression(expression(&script)?).await {
                Ok(result) => {
                    if result.value().and_then(Value::as_bool) != Some(true) {
                        warn!("page did not settle within {}s", timeout.as_secs());
                    }
                    return Ok(());
                }
                Err(err) => match self.fail(err) {
                    DriverError::Closed => return Err(DriverError::Closed),
                    err if Instant::now() >= deadline => return Err(err),
                    err => {
                        warn!("stability probe failed, retrying: {err}");
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                },
            }
        }
    }

    async fn url(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        let url = self.page.url().await.map_err(|err| self.fail(err))?;
        Ok(url.unwrap_or_default())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.ensure_open()?;
        self.page.content().await.map_err(|err| self.fail(err))
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.gone.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.page.clone().close().await.map_err(protocol)
    }
}
