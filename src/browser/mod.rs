//! Browser-control capability.
//!
//! The crawler only talks to a browser through [`PageDriver`] and
//! [`ElementHandle`]. The chromiumoxide implementation (CDP with stealth
//! patches) lives behind the `browser` feature; [`fake`] serves static HTML
//! for the test suites.

#[cfg(feature = "browser")]
mod chromium;
mod config;
mod cookies;
pub mod fake;
mod stealth;
mod types;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumDriver, ChromiumElement, ChromiumLauncher};
pub use config::{BrowserSettings, DEFAULT_USER_AGENT};
pub use cookies::{read_cookie_file, write_cookie_file};
pub use stealth::{STEALTH_ARGS, STEALTH_SCRIPTS};
pub use types::BrowserCookie;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DriverError, DriverResult};

/// How often `wait_for` re-checks the DOM.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One element of the rendered page.
#[async_trait]
pub trait ElementHandle: Send + Sync + Sized {
    /// Rendered text, with block boundaries as line breaks.
    async fn text(&self) -> DriverResult<String>;

    /// First descendant matching `selector`.
    async fn find_one(&self, selector: &str) -> DriverResult<Option<Self>>;

    /// Move the pointer over the element.
    async fn hover(&self) -> DriverResult<()>;

    async fn click(&self) -> DriverResult<()>;

    async fn is_displayed(&self) -> DriverResult<bool>;
}

/// A controllable browser tab.
#[async_trait]
pub trait PageDriver: Send + Sync {
    type Element: ElementHandle;

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<Self::Element>>;

    async fn find_one(&self, selector: &str) -> DriverResult<Option<Self::Element>>;

    /// Poll for `selector` until it appears or `timeout` elapses.
    /// Timing out is reported as `Ok(None)`.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> DriverResult<Option<Self::Element>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_one(selector).await? {
                return Ok(Some(element));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Address currently shown in the location bar.
    async fn current_address(&self) -> DriverResult<String>;

    /// Load `url`, failing with [`DriverError::Timeout`] past the page-load timeout.
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    async fn reload(&self) -> DriverResult<()>;

    async fn cookies(&self) -> DriverResult<Vec<BrowserCookie>>;

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> DriverResult<()>;

    /// Full scrollable height of the document in pixels.
    async fn scroll_height(&self) -> DriverResult<u64>;

    async fn scroll_to(&self, offset: u64) -> DriverResult<()>;

    /// Shut the browser down. Further calls fail with [`DriverError::Closed`].
    async fn close(&self) -> DriverResult<()>;
}

/// Produces fresh drivers, one per crawl attempt.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Driver: PageDriver;

    async fn launch(&self, settings: &BrowserSettings) -> Result<Self::Driver, DriverError>;
}
