//! Browser launch configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Realistic desktop Chrome identification string.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Browser launch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Run without a visible window. Off by default so an operator can
    /// dismiss consent dialogs by hand.
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    pub proxy: Option<String>,

    /// User agent presented to the site.
    pub user_agent: String,

    /// Window width in pixels.
    pub window_width: u32,

    /// Window height in pixels.
    pub window_height: u32,

    /// Page load timeout in seconds.
    pub page_load_timeout: u64,

    /// How long to wait for an element before treating it as absent, in seconds.
    pub element_timeout: u64,

    /// Additional Chrome arguments.
    pub chrome_args: Vec<String>,

    /// Explicit Chrome executable. Common install locations are probed when unset.
    pub executable: Option<PathBuf>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    pub remote_url: Option<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            proxy: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            window_width: 1920,
            window_height: 1080,
            page_load_timeout: 30,
            element_timeout: 10,
            chrome_args: Vec::new(),
            executable: None,
            remote_url: None,
        }
    }
}

impl BrowserSettings {
    pub fn page_load_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.page_load_timeout)
    }

    pub fn element_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.element_timeout)
    }
}
