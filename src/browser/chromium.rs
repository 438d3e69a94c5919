//! chromiumoxide (CDP) driver with stealth patches.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::BrowserSettings;
use super::stealth::{STEALTH_ARGS, STEALTH_SCRIPTS};
use super::types::BrowserCookie;
use super::{BrowserLauncher, ElementHandle, PageDriver};
use crate::error::{DriverError, DriverResult};

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

const IS_DISPLAYED_FN: &str = "function() { const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";

/// Messages CDP uses when a node reference outlived a re-render.
const STALE_MARKERS: &[&str] = &[
    "No node with given id",
    "Could not find node with given id",
    "Node is detached",
    "Cannot find context with specified id",
];

fn map_cdp(err: CdpError) -> DriverError {
    let message = err.to_string();
    if STALE_MARKERS.iter().any(|m| message.contains(m)) {
        DriverError::Stale
    } else {
        DriverError::Protocol(message)
    }
}

/// CDP cookie for `cookie`, keeping its expiry when it has one.
fn cookie_param(cookie: &BrowserCookie) -> Result<CookieParam, String> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .path(cookie.path.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(expires) = cookie.expires {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    builder.build()
}

fn find_chrome(settings: &BrowserSettings) -> Result<PathBuf, DriverError> {
    if let Some(ref path) = settings.executable {
        return Ok(path.clone());
    }

    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    // Check if in PATH via `which`
    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(DriverError::Protocol(
        "Chrome/Chromium not found; install it or set browser.executable".to_string(),
    ))
}

/// Launches (or attaches to) Chrome with stealth configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    async fn launch_local(
        settings: &BrowserSettings,
    ) -> Result<(Browser, chromiumoxide::Handler), DriverError> {
        let chrome_path = find_chrome(settings)?;
        info!("Launching browser (headless={})", settings.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(settings.window_width, settings.window_height)
            .viewport(None)
            .request_timeout(settings.page_load_timeout());

        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = settings.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder.arg(format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ));
        for arg in STEALTH_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &settings.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| DriverError::Protocol(format!("Failed to build browser config: {}", e)))?;

        Browser::launch(config).await.map_err(map_cdp)
    }

    async fn connect_remote(
        settings: &BrowserSettings,
        url: &str,
    ) -> Result<(Browser, chromiumoxide::Handler), DriverError> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, settings.page_load_timeout
        );

        // Get WebSocket URL from the /json/version endpoint
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| DriverError::Protocol(format!("Failed to reach remote browser: {}", e)))?
            .json()
            .await
            .map_err(|e| DriverError::Protocol(format!("Bad browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::Protocol("No webSocketDebuggerUrl in response".into()))?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: settings.page_load_timeout(),
            ..Default::default()
        };

        Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(map_cdp)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn launch(&self, settings: &BrowserSettings) -> Result<ChromiumDriver, DriverError> {
        let remote = settings.remote_url.is_some();
        let (browser, mut handler) = match settings.remote_url {
            Some(ref url) => Self::connect_remote(settings, url).await?,
            None => Self::launch_local(settings).await?,
        };

        let handler_task = HandlerTask(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));

        let page = browser.new_page("about:blank").await.map_err(map_cdp)?;

        if let Err(e) = page
            .execute(SetUserAgentOverrideParams::new(settings.user_agent.clone()))
            .await
        {
            warn!("Failed to set user agent: {}", e);
        }

        for script in STEALTH_SCRIPTS {
            if let Err(e) = page
                .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                .await
            {
                debug!("Stealth script registration skipped: {}", e);
            }
        }

        Ok(ChromiumDriver {
            browser: Mutex::new(Some(browser)),
            page,
            handler: handler_task,
            remote,
            closed: AtomicBool::new(false),
            page_load_timeout: settings.page_load_timeout(),
        })
    }
}

/// CDP event loop task, aborted when dropped.
struct HandlerTask(JoinHandle<()>);

impl HandlerTask {
    fn abort(&self) {
        self.0.abort();
    }
}

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A single Chrome tab.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler: HandlerTask,
    remote: bool,
    closed: AtomicBool,
    page_load_timeout: Duration,
}

impl ChromiumDriver {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    async fn evaluate_f64(&self, script: &str) -> DriverResult<f64> {
        self.page
            .evaluate(script)
            .await
            .map_err(map_cdp)?
            .into_value::<f64>()
            .map_err(|e| DriverError::Protocol(e.to_string()))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    type Element = ChromiumElement;

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<ChromiumElement>> {
        self.ensure_open()?;
        let elements = self.page.find_elements(selector).await.map_err(map_cdp)?;
        Ok(elements.into_iter().map(ChromiumElement).collect())
    }

    async fn find_one(&self, selector: &str) -> DriverResult<Option<ChromiumElement>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn current_address(&self) -> DriverResult<String> {
        self.ensure_open()?;
        Ok(self
            .page
            .url()
            .await
            .map_err(map_cdp)?
            .unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        self.ensure_open()?;
        debug!("Navigating to {}", url);
        tokio::time::timeout(self.page_load_timeout, self.page.goto(url))
            .await
            .map_err(|_| DriverError::Timeout(self.page_load_timeout))?
            .map_err(|e| DriverError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.ensure_open()?;
        tokio::time::timeout(self.page_load_timeout, self.page.reload())
            .await
            .map_err(|_| DriverError::Timeout(self.page_load_timeout))?
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<BrowserCookie>> {
        self.ensure_open()?;
        let cookies = self.page.get_cookies().await.map_err(map_cdp)?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                secure: c.secure,
                http_only: c.http_only,
                expires: (c.expires > 0.0).then_some(c.expires),
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> DriverResult<()> {
        self.ensure_open()?;
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            match cookie_param(cookie) {
                Ok(param) => params.push(param),
                Err(e) => warn!("Failed to build cookie {}: {}", cookie.name, e),
            }
        }
        self.page.set_cookies(params).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn scroll_height(&self) -> DriverResult<u64> {
        self.ensure_open()?;
        let height = self.evaluate_f64("document.body.scrollHeight").await?;
        Ok(height.max(0.0) as u64)
    }

    async fn scroll_to(&self, offset: u64) -> DriverResult<()> {
        self.ensure_open()?;
        self.page
            .evaluate(format!(
                "window.scrollTo({{top: {}, behavior: 'smooth'}})",
                offset
            ))
            .await
            .map_err(map_cdp)?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if self.remote {
                // Leave an attached browser running for its owner
                let _ = self.page.clone().close().await;
            } else if let Err(e) = browser.close().await {
                warn!("Error closing browser: {}", e);
            } else {
                let _ = browser.wait().await;
            }
        }
        self.handler.abort();
        info!("Browser closed");
        Ok(())
    }
}

/// A DOM element inside a [`ChromiumDriver`] tab.
pub struct ChromiumElement(Element);

#[async_trait]
impl ElementHandle for ChromiumElement {
    async fn text(&self) -> DriverResult<String> {
        Ok(self.0.inner_text().await.map_err(map_cdp)?.unwrap_or_default())
    }

    async fn find_one(&self, selector: &str) -> DriverResult<Option<Self>> {
        let found = self.0.find_elements(selector).await.map_err(map_cdp)?;
        Ok(found.into_iter().next().map(ChromiumElement))
    }

    async fn hover(&self) -> DriverResult<()> {
        self.0.hover().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn click(&self) -> DriverResult<()> {
        self.0.click().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn is_displayed(&self) -> DriverResult<bool> {
        let result = self
            .0
            .call_js_fn(IS_DISPLAYED_FN, false)
            .await
            .map_err(map_cdp)?;
        Ok(result
            .result
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }
}
