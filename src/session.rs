//! Crawl sessions: target validation, file naming, browser launch, cookie
//! reuse and human-like scrolling.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{read_cookie_file, write_cookie_file, BrowserLauncher, BrowserSettings, PageDriver};
use crate::config::Config;
use crate::error::{DriverResult, HarvestError, Result};
use crate::pacing::Pacer;

/// Fallback category when the URL has no usable last segment.
const DEFAULT_CATEGORY: &str = "items";

/// Everything fixed for one category crawl.
#[derive(Debug, Clone)]
pub struct CrawlSession {
    target_url: Url,
    category: String,
    output_path: PathBuf,
    cookie_path: PathBuf,
    browser: BrowserSettings,
}

/// Category tag from the last path segment ("motorcycles_c81" → "motorcycles").
pub fn category_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.split('_').next())
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string()
}

impl CrawlSession {
    /// Validate `target` against the configured origin and derive file names.
    pub fn new(target: &str, config: &Config) -> Result<Self> {
        let invalid = |reason: &str| HarvestError::InvalidTarget {
            url: target.to_string(),
            reason: reason.to_string(),
        };

        let target_url = Url::parse(target.trim()).map_err(|e| invalid(&e.to_string()))?;
        let allowed = Url::parse(&config.site.allowed_origin)
            .map_err(|e| HarvestError::Config(format!("bad allowed_origin: {}", e)))?;

        if target_url.origin() != allowed.origin() {
            return Err(invalid(&format!(
                "only {} URLs are supported",
                config.site.allowed_origin
            )));
        }

        let category = category_from_url(&target_url);
        let prefix = &config.site.file_prefix;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");

        let output_path = config
            .crawl
            .output_dir
            .join(format!("{}_{}_{}.csv", prefix, category, timestamp));
        let cookie_path = config
            .crawl
            .cookie_dir
            .join(format!("{}_{}_cookies.json", prefix, category));

        Ok(Self {
            target_url,
            category,
            output_path,
            cookie_path,
            browser: config.browser.clone(),
        })
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn cookie_path(&self) -> &Path {
        &self.cookie_path
    }

    pub fn browser_settings(&self) -> &BrowserSettings {
        &self.browser
    }

    /// Launch a browser for this session.
    pub async fn open<L: BrowserLauncher>(&self, launcher: &L) -> Result<L::Driver> {
        launcher.launch(&self.browser).await.map_err(|e| {
            warn!("Failed to set up browser: {}", e);
            HarvestError::Launch(e.to_string())
        })
    }

    /// Inject the saved cookie jar and reload. Returns how many cookies were
    /// injected; every failure degrades to zero.
    pub async fn load_cookies<D: PageDriver>(&self, driver: &D) -> usize {
        let cookies = match read_cookie_file(&self.cookie_path) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Error loading cookies: {}", e);
                return 0;
            }
        };

        if cookies.is_empty() {
            debug!("No saved cookies for {}", self.category);
            return 0;
        }

        if let Err(e) = driver.set_cookies(&cookies).await {
            warn!("Error loading cookies: {}", e);
            return 0;
        }
        if let Err(e) = driver.reload().await {
            warn!("Reload after cookie injection failed: {}", e);
        }

        info!("Loaded {} cookies from {:?}", cookies.len(), self.cookie_path);
        cookies.len()
    }

    /// Persist the browser's cookies if there are any. Returns how many were written.
    pub async fn save_cookies<D: PageDriver>(&self, driver: &D) -> usize {
        let cookies = match driver.cookies().await {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!("Could not read browser cookies: {}", e);
                return 0;
            }
        };
        if cookies.is_empty() {
            return 0;
        }

        match write_cookie_file(&self.cookie_path, &cookies) {
            Ok(()) => {
                debug!("Saved {} cookies to {:?}", cookies.len(), self.cookie_path);
                cookies.len()
            }
            Err(e) => {
                warn!("Error saving cookies: {}", e);
                0
            }
        }
    }
}

/// Scroll to the bottom in random steps with random pauses, to trigger
/// lazy-loaded content. Returns the number of steps taken.
pub async fn simulate_scroll<D: PageDriver>(driver: &D, pacer: &Pacer) -> DriverResult<u32> {
    let total = driver.scroll_height().await?;
    let mut position = 0;
    let mut steps = 0;

    while position < total {
        position = (position + pacer.scroll_step()).min(total);
        driver.scroll_to(position).await?;
        pacer.scroll_pause().await;
        steps += 1;
    }

    debug!("Scrolled {}px in {} steps", total, steps);
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::fake::{FakeLauncher, FakeSite};
    use crate::browser::BrowserCookie;
    use tempfile::tempdir;

    const BASE: &str = "https://www.olx.in/en-in/bengaluru_g4058803/motorcycles_c81";

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.crawl.output_dir = dir.join("out");
        config.crawl.cookie_dir = dir.join("cookies");
        config
    }

    #[test]
    fn test_category_from_url() {
        let url = Url::parse(BASE).unwrap();
        assert_eq!(category_from_url(&url), "motorcycles");
        let url = Url::parse("https://www.olx.in/").unwrap();
        assert_eq!(category_from_url(&url), "items");
        let url = Url::parse("https://www.olx.in/en-in/cars").unwrap();
        assert_eq!(category_from_url(&url), "cars");
    }

    #[test]
    fn test_session_paths() {
        let dir = tempdir().unwrap();
        let session = CrawlSession::new(BASE, &config_in(dir.path())).unwrap();

        assert_eq!(session.category(), "motorcycles");
        assert_eq!(
            session.cookie_path(),
            dir.path().join("cookies").join("olx_motorcycles_cookies.json")
        );
        let name = session.output_path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("olx_motorcycles_"));
        assert!(name.ends_with(".csv"));
    }

    #[test]
    fn test_foreign_origin_rejected() {
        let config = Config::default();
        for url in [
            "https://www.example.com/motorcycles_c81",
            "http://www.olx.in/motorcycles_c81",
            "https://www.olx.in.evil.com/motorcycles_c81",
            "not a url",
        ] {
            assert!(
                matches!(
                    CrawlSession::new(url, &config),
                    Err(HarvestError::InvalidTarget { .. })
                ),
                "{} should be rejected",
                url
            );
        }
    }

    #[tokio::test]
    async fn test_corrupt_cookie_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let session = CrawlSession::new(BASE, &config_in(dir.path())).unwrap();
        std::fs::create_dir_all(session.cookie_path().parent().unwrap()).unwrap();
        std::fs::write(session.cookie_path(), "[{broken").unwrap();

        let driver = FakeSite::new(BASE).driver();
        driver.navigate(BASE).await.unwrap();
        assert_eq!(session.load_cookies(&driver).await, 0);
        assert_eq!(driver.reloads(), 0);
    }

    #[tokio::test]
    async fn test_missing_cookie_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let session = CrawlSession::new(BASE, &config_in(dir.path())).unwrap();
        let driver = FakeSite::new(BASE).driver();
        assert_eq!(session.load_cookies(&driver).await, 0);
    }

    #[tokio::test]
    async fn test_cookies_saved_then_reloaded() {
        let dir = tempdir().unwrap();
        let session = CrawlSession::new(BASE, &config_in(dir.path())).unwrap();
        let site = FakeSite::new(BASE).sets_cookie(BrowserCookie::new("sid", "42", ".olx.in"));

        let first = site.driver();
        assert_eq!(session.save_cookies(&first).await, 0);
        first.navigate(BASE).await.unwrap();
        assert_eq!(session.save_cookies(&first).await, 1);

        let second = FakeSite::new(BASE).driver();
        second.navigate(BASE).await.unwrap();
        assert_eq!(session.load_cookies(&second).await, 1);
        assert_eq!(second.reloads(), 1);
        assert_eq!(second.cookie_jar()[0].value, "42");
    }

    #[tokio::test]
    async fn test_open_maps_launch_failure() {
        let dir = tempdir().unwrap();
        let session = CrawlSession::new(BASE, &config_in(dir.path())).unwrap();
        let launcher = FakeLauncher::new(FakeSite::new(BASE)).fail_first(1);
        assert!(matches!(
            session.open(&launcher).await,
            Err(HarvestError::Launch(_))
        ));
        assert!(session.open(&launcher).await.is_ok());
    }

    #[tokio::test]
    async fn test_simulate_scroll_reaches_bottom() {
        let driver = FakeSite::new(BASE).scroll_height(1000).driver();
        driver.navigate(BASE).await.unwrap();
        let pacer = Pacer::instant(3);

        let steps = simulate_scroll(&driver, &pacer).await.unwrap();
        assert_eq!(driver.scroll_offset(), 1000);
        // 100-400px steps over 1000px
        assert!((3..=10).contains(&steps));
        assert!(pacer.total_paused() >= std::time::Duration::from_millis(500 * steps as u64));
    }

    #[tokio::test]
    async fn test_simulate_scroll_terminates_with_zero_step_config() {
        use crate::pacing::{JitterRange, PacingSettings};

        let driver = FakeSite::new(BASE).scroll_height(100).driver();
        driver.navigate(BASE).await.unwrap();
        let settings = PacingSettings {
            scroll_pause: JitterRange::new(0, 0),
            scroll_step_min: 0,
            scroll_step_max: 0,
            ..PacingSettings::default()
        };
        let pacer = Pacer::seeded(settings, 1);

        let steps = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            simulate_scroll(&driver, &pacer),
        )
        .await
        .expect("scroll should finish")
        .unwrap();
        assert_eq!(steps, 100);
        assert_eq!(driver.scroll_offset(), 100);
    }
}
