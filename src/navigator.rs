//! Moving between catalogue pages.
//!
//! Clicking the pagination controls is tried first since it looks like a
//! person browsing; loading `?page=N` directly is the fallback.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::browser::{ElementHandle, PageDriver};
use crate::config::Selectors;
use crate::error::DriverResult;
use crate::pacing::Pacer;

static PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"page=(\d+)").expect("valid regex"));

/// Page number carried by an address, if any.
pub fn page_from_address(address: &str) -> Option<u32> {
    PAGE_MARKER
        .captures(address)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `base` with its `page` query parameter set to `page`.
pub fn page_url(base: &Url, page: u32) -> Url {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut url = base.clone();
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        for (k, v) in &retained {
            query.append_pair(k, v);
        }
        query.append_pair("page", &page.to_string());
    }
    url
}

/// Pagination strategies over one catalogue.
pub struct PageNavigator<'a> {
    base_url: &'a Url,
    selectors: &'a Selectors,
    pacer: &'a Pacer,
}

impl<'a> PageNavigator<'a> {
    pub fn new(base_url: &'a Url, selectors: &'a Selectors, pacer: &'a Pacer) -> Self {
        Self {
            base_url,
            selectors,
            pacer,
        }
    }

    /// Highest numeric page control, or 1 when there is none or it cannot be read.
    pub async fn discover_total_pages<D: PageDriver>(&self, driver: &D) -> u32 {
        match self.read_page_labels(driver).await {
            Ok(labels) => {
                let total = labels
                    .iter()
                    .filter_map(|l| l.trim().parse::<u32>().ok())
                    .max()
                    .unwrap_or(1)
                    .max(1);
                info!("Total pages found: {}", total);
                total
            }
            Err(e) => {
                warn!("Error getting total pages, assuming 1: {}", e);
                1
            }
        }
    }

    async fn read_page_labels<D: PageDriver>(&self, driver: &D) -> DriverResult<Vec<String>> {
        let items = driver.find_all(&self.selectors.page_item).await?;
        let mut labels = Vec::with_capacity(items.len());
        for item in &items {
            labels.push(item.text().await?);
        }
        Ok(labels)
    }

    /// Click through to `target` via the pagination controls.
    ///
    /// Without an exact page control the "next" control is clicked once.
    /// Either way the address must name `target` afterwards, so "next" only
    /// succeeds when `target` is the following page.
    pub async fn navigate_ui<D: PageDriver>(&self, driver: &D, target: u32) -> bool {
        match self.try_navigate_ui(driver, target).await {
            Ok(reached) => reached,
            Err(e) => {
                error!("Error in UI navigation to page {}: {}", target, e);
                false
            }
        }
    }

    async fn try_navigate_ui<D: PageDriver>(&self, driver: &D, target: u32) -> DriverResult<bool> {
        let label = target.to_string();
        let buttons = driver.find_all(&self.selectors.page_item).await?;

        for button in &buttons {
            if button.text().await?.trim() != label {
                continue;
            }

            button.hover().await?;
            self.pacer.hover_pause().await;
            let clicked = button.click().await;
            self.pacer.click_pause().await;
            clicked?;

            return self.landed_on(driver, target).await;
        }

        debug!("No control for page {}, trying the next button", target);
        let Some(next) = driver.find_one(&self.selectors.next_page).await? else {
            return Ok(false);
        };
        if !next.is_displayed().await? {
            return Ok(false);
        }

        let clicked = next.click().await;
        self.pacer.click_pause().await;
        clicked?;
        self.landed_on(driver, target).await
    }

    /// Whether the browser address now names page `target`.
    async fn landed_on<D: PageDriver>(&self, driver: &D, target: u32) -> DriverResult<bool> {
        let address = driver.current_address().await?;
        match page_from_address(&address) {
            Some(page) if page == target => Ok(true),
            observed => {
                warn!(
                    "Clicked towards page {} but landed on {:?} ({})",
                    target, observed, address
                );
                Ok(false)
            }
        }
    }

    /// Load `?page=target` directly. The site drops the page marker when it
    /// refuses the request, so its presence afterwards means success.
    pub async fn navigate_url<D: PageDriver>(&self, driver: &D, target: u32) -> bool {
        let url = page_url(self.base_url, target);
        let loaded = driver.navigate(url.as_str()).await;
        self.pacer.url_pause().await;

        if let Err(e) = loaded {
            error!("Error in URL navigation to {}: {}", url, e);
            return false;
        }

        match driver.current_address().await {
            Ok(address) if address.contains("page=") => true,
            Ok(address) => {
                error!("URL navigation failed - redirected to {}", address);
                false
            }
            Err(e) => {
                error!("Could not read address after URL navigation: {}", e);
                false
            }
        }
    }

    /// UI navigation with URL fallback.
    pub async fn advance<D: PageDriver>(&self, driver: &D, target: u32) -> NavigationOutcome {
        if self.navigate_ui(driver, target).await {
            return NavigationOutcome::Ui;
        }
        warn!("UI navigation to page {} failed, trying direct URL...", target);
        if self.navigate_url(driver, target).await {
            NavigationOutcome::Url
        } else {
            NavigationOutcome::Failed
        }
    }
}

/// Which strategy reached the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    Ui,
    Url,
    Failed,
}

impl NavigationOutcome {
    pub fn reached(&self) -> bool {
        !matches!(self, NavigationOutcome::Failed)
    }
}
