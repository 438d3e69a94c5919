//! In-memory browser backed by static HTML.
//!
//! Each page of a [`FakeSite`] is a complete HTML document. Selectors are
//! real CSS selectors evaluated with `scraper`, clicks follow `href`
//! attributes, and every navigation invalidates previously returned
//! elements the same way a re-render does in a real browser.
//!
//! Markup hooks:
//! - `data-stale` on an element makes reading its text fail as stale.
//! - `data-broken` on an element makes clicking it fail.
//! - `data-hidden` on an element reports it as not displayed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::config::BrowserSettings;
use super::types::BrowserCookie;
use super::{BrowserLauncher, ElementHandle, PageDriver};
use crate::error::{DriverError, DriverResult};

/// A paginated site served from fixed HTML.
#[derive(Debug, Clone)]
pub struct FakeSite {
    base_url: String,
    pages: BTreeMap<u32, String>,
    scroll_height: u64,
    reject_url_navigation: bool,
    visit_cookies: Vec<BrowserCookie>,
    failing_selectors: HashMap<String, u32>,
    /// Shared by every tab on the site, so failures span relaunches.
    failing_pages: Arc<Mutex<HashMap<u32, u32>>>,
}

impl FakeSite {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            pages: BTreeMap::new(),
            scroll_height: 2400,
            reject_url_navigation: false,
            visit_cookies: Vec::new(),
            failing_selectors: HashMap::new(),
            failing_pages: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serve `html` as page `number` (page 1 is the bare base URL).
    pub fn page(mut self, number: u32, html: impl Into<String>) -> Self {
        self.pages.insert(number, html.into());
        self
    }

    pub fn scroll_height(mut self, height: u64) -> Self {
        self.scroll_height = height;
        self
    }

    /// Redirect every directly loaded `?page=` URL back to the base URL.
    pub fn reject_url_navigation(mut self) -> Self {
        self.reject_url_navigation = true;
        self
    }

    /// Cookie the site sets on the first visit.
    pub fn sets_cookie(mut self, cookie: BrowserCookie) -> Self {
        self.visit_cookies.push(cookie);
        self
    }

    /// Make the next `times` lookups of `selector` fail with a protocol error.
    pub fn fail_selector(mut self, selector: impl Into<String>, times: u32) -> Self {
        self.failing_selectors.insert(selector.into(), times);
        self
    }

    /// Make the next `times` element lookups on page `number` fail, counted
    /// across every tab opened on this site.
    pub fn fail_page(self, number: u32, times: u32) -> Self {
        self.failing_pages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(number, times);
        self
    }

    /// Open a fresh tab on this site, positioned on `about:blank`.
    pub fn driver(&self) -> FakeDriver {
        FakeDriver {
            state: Arc::new(Mutex::new(SiteState {
                site: self.clone(),
                address: "about:blank".to_string(),
                generation: 0,
                cookies: Vec::new(),
                scroll_offset: 0,
                navigations: Vec::new(),
                clicks: 0,
                hovers: 0,
                reloads: 0,
                closed: false,
            })),
        }
    }
}

#[derive(Debug)]
struct SiteState {
    site: FakeSite,
    address: String,
    generation: u64,
    cookies: Vec<BrowserCookie>,
    scroll_offset: u64,
    navigations: Vec<String>,
    clicks: u32,
    hovers: u32,
    reloads: u32,
    closed: bool,
}

impl SiteState {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    fn current_page(&self) -> Option<u32> {
        if self.address == "about:blank" {
            return None;
        }
        Some(page_param(&self.address).unwrap_or(1))
    }

    fn current_html(&self) -> &str {
        self.current_page()
            .and_then(|n| self.site.pages.get(&n))
            .map(String::as_str)
            .unwrap_or("<html><body></body></html>")
    }

    /// Move to `url`. Unknown pages (and, when configured, direct page
    /// loads) land on the base URL instead.
    fn go_to(&mut self, url: &str, direct: bool) -> DriverResult<()> {
        let parsed =
            Url::parse(url).map_err(|e| DriverError::Navigation(format!("{}: {}", url, e)))?;
        let page = page_param(parsed.as_str());

        let served = match page {
            Some(_) if direct && self.site.reject_url_navigation => false,
            Some(n) => self.site.pages.contains_key(&n),
            None => true,
        };

        self.address = if served {
            parsed.to_string()
        } else {
            self.site.base_url.clone()
        };
        self.generation += 1;
        self.scroll_offset = 0;
        self.navigations.push(self.address.clone());

        for cookie in std::mem::take(&mut self.site.visit_cookies) {
            upsert_cookie(&mut self.cookies, cookie);
        }
        Ok(())
    }

    fn take_failure(&mut self, selector: &str) -> DriverResult<()> {
        if let Some(remaining) = self.site.failing_selectors.get_mut(selector) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Protocol(format!(
                    "simulated renderer failure for {}",
                    selector
                )));
            }
        }
        if let Some(page) = self.current_page() {
            let mut pages = self
                .site
                .failing_pages
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let Some(remaining) = pages.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DriverError::Protocol(format!(
                        "simulated renderer failure on page {}",
                        page
                    )));
                }
            }
        }
        Ok(())
    }
}

fn page_param(address: &str) -> Option<u32> {
    Url::parse(address)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

fn upsert_cookie(jar: &mut Vec<BrowserCookie>, cookie: BrowserCookie) {
    jar.retain(|c| !(c.name == cookie.name && c.domain == cookie.domain));
    jar.push(cookie);
}

fn parse_selector(selector: &str) -> DriverResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| DriverError::Protocol(format!("invalid selector {}: {:?}", selector, e)))
}

/// Outer HTML of every match of `selector` in `html`.
fn select_outer(html: &str, selector: &Selector, fragment: bool) -> Vec<String> {
    if fragment {
        let doc = Html::parse_fragment(html);
        let Some(root) = fragment_root(&doc) else {
            return Vec::new();
        };
        root.select(selector)
            .filter(|el| el.id() != root.id())
            .map(|el| el.html())
            .collect()
    } else {
        let doc = Html::parse_document(html);
        doc.select(selector).map(|el| el.html()).collect()
    }
}

fn fragment_root(doc: &Html) -> Option<ElementRef<'_>> {
    doc.root_element().children().find_map(ElementRef::wrap)
}

/// Text of the element, one line per non-empty text node.
fn fragment_text(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    match fragment_root(&doc) {
        Some(root) => root
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

fn fragment_attr(html: &str, name: &str) -> Option<String> {
    let doc = Html::parse_fragment(html);
    fragment_root(&doc).and_then(|root| root.value().attr(name).map(str::to_string))
}

/// Handle to a fake browser tab. Clones share the same tab.
#[derive(Debug, Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<SiteState>>,
}

impl FakeDriver {
    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Page number the tab is showing, `None` before the first navigation.
    pub fn current_page(&self) -> Option<u32> {
        self.lock().current_page()
    }

    /// Every address the tab landed on, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn clicks(&self) -> u32 {
        self.lock().clicks
    }

    pub fn hovers(&self) -> u32 {
        self.lock().hovers
    }

    pub fn reloads(&self) -> u32 {
        self.lock().reloads
    }

    pub fn scroll_offset(&self) -> u64 {
        self.lock().scroll_offset
    }

    pub fn cookie_jar(&self) -> Vec<BrowserCookie> {
        self.lock().cookies.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn element(&self, html: String, generation: u64) -> FakeElement {
        FakeElement {
            html,
            generation,
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    type Element = FakeElement;

    async fn find_all(&self, selector: &str) -> DriverResult<Vec<FakeElement>> {
        let parsed = parse_selector(selector)?;
        let (matches, generation) = {
            let mut state = self.lock();
            state.ensure_open()?;
            state.take_failure(selector)?;
            (
                select_outer(state.current_html(), &parsed, false),
                state.generation,
            )
        };
        Ok(matches
            .into_iter()
            .map(|html| self.element(html, generation))
            .collect())
    }

    async fn find_one(&self, selector: &str) -> DriverResult<Option<FakeElement>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn current_address(&self) -> DriverResult<String> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.address.clone())
    }

    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.go_to(url, true)
    }

    async fn reload(&self) -> DriverResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.reloads += 1;
        state.generation += 1;
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<BrowserCookie>> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[BrowserCookie]) -> DriverResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        for cookie in cookies {
            upsert_cookie(&mut state.cookies, cookie.clone());
        }
        Ok(())
    }

    async fn scroll_height(&self) -> DriverResult<u64> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state.site.scroll_height)
    }

    async fn scroll_to(&self, offset: u64) -> DriverResult<()> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.scroll_offset = offset.min(state.site.scroll_height);
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.lock().closed = true;
        Ok(())
    }
}

/// Snapshot of one element, tied to the render it came from.
#[derive(Debug, Clone)]
pub struct FakeElement {
    html: String,
    generation: u64,
    state: Arc<Mutex<SiteState>>,
}

impl FakeElement {
    fn lock(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_fresh(&self, state: &SiteState) -> DriverResult<()> {
        state.ensure_open()?;
        if state.generation != self.generation {
            return Err(DriverError::Stale);
        }
        Ok(())
    }
}

#[async_trait]
impl ElementHandle for FakeElement {
    async fn text(&self) -> DriverResult<String> {
        self.ensure_fresh(&self.lock())?;
        if fragment_attr(&self.html, "data-stale").is_some() {
            return Err(DriverError::Stale);
        }
        Ok(fragment_text(&self.html))
    }

    async fn find_one(&self, selector: &str) -> DriverResult<Option<Self>> {
        self.ensure_fresh(&self.lock())?;
        let parsed = parse_selector(selector)?;
        Ok(select_outer(&self.html, &parsed, true)
            .into_iter()
            .next()
            .map(|html| FakeElement {
                html,
                generation: self.generation,
                state: Arc::clone(&self.state),
            }))
    }

    async fn hover(&self) -> DriverResult<()> {
        let mut state = self.lock();
        self.ensure_fresh(&state)?;
        state.hovers += 1;
        Ok(())
    }

    async fn click(&self) -> DriverResult<()> {
        let mut state = self.lock();
        self.ensure_fresh(&state)?;
        if fragment_attr(&self.html, "data-broken").is_some() {
            return Err(DriverError::Protocol("element click intercepted".into()));
        }
        state.clicks += 1;

        // In-page anchors do not navigate
        if let Some(href) = fragment_attr(&self.html, "href").filter(|h| !h.starts_with('#')) {
            let target = Url::parse(&state.address)
                .and_then(|base| base.join(&href))
                .map_err(|e| DriverError::Navigation(format!("{}: {}", href, e)))?;
            state.go_to(target.as_str(), false)?;
        }
        Ok(())
    }

    async fn is_displayed(&self) -> DriverResult<bool> {
        self.ensure_fresh(&self.lock())?;
        Ok(fragment_attr(&self.html, "data-hidden").is_none())
    }
}

/// Hands out tabs on a [`FakeSite`], optionally failing the first launches.
#[derive(Debug)]
pub struct FakeLauncher {
    site: FakeSite,
    failures_remaining: AtomicU32,
    launched: Mutex<Vec<FakeDriver>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            failures_remaining: AtomicU32::new(0),
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` launches.
    pub fn fail_first(self, times: u32) -> Self {
        self.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Tabs handed out so far, oldest first.
    pub fn drivers(&self) -> Vec<FakeDriver> {
        self.launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn launch_count(&self) -> usize {
        self.drivers().len()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Driver = FakeDriver;

    async fn launch(&self, _settings: &BrowserSettings) -> Result<FakeDriver, DriverError> {
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DriverError::Protocol("simulated launch failure".into()));
        }

        let driver = self.site.driver();
        self.launched
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(driver.clone());
        Ok(driver)
    }
}
