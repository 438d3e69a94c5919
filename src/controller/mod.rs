//! End-to-end crawl of one category.
//!
//! A [`Harvester`] runs a single attempt with [`Harvester::run`]: bootstrap
//! the browser, optionally seek the start page, then process pages until the
//! bound is reached or navigation dead-ends. [`Harvester::run_with_retries`]
//! wraps that in the whole-run retry envelope.

mod retry;
mod state;

pub use retry::RetryPolicy;
pub use state::{CrawlState, StateTracker};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::browser::{BrowserLauncher, PageDriver};
use crate::config::Config;
use crate::error::{DriverResult, HarvestError, Result};
use crate::extractor::FieldExtractor;
use crate::navigator::{NavigationOutcome, PageNavigator};
use crate::operator::{Checkpoint, ConsoleOperator, OperatorSignal};
use crate::pacing::Pacer;
use crate::session::{simulate_scroll, CrawlSession};
use crate::sink::RecordSink;

const CONSENT_PROMPT: &str = "Please close any popups if present.";
const RECOVERY_PROMPT: &str = "Error occurred. Please check if everything is okay.";

/// Which pages to crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlRequest {
    /// First page to process (1-based).
    pub start_page: u32,
    /// Highest page number to process, if bounded.
    pub max_pages: Option<u32>,
}

impl Default for CrawlRequest {
    fn default() -> Self {
        Self {
            start_page: 1,
            max_pages: None,
        }
    }
}

/// Totals for one successful attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub pages_processed: u32,
    pub listings_seen: usize,
    pub records_written: usize,
    pub listings_skipped: usize,
    /// Navigations that needed the direct-URL fallback.
    pub ui_fallbacks: u32,
    pub recoveries: u32,
    /// Navigation dead-ended before the page bound.
    pub halted: bool,
    pub last_page: Option<u32>,
}

/// Crawls one category with an injected browser, pacing, operator and sink.
pub struct Harvester<L: BrowserLauncher> {
    session: CrawlSession,
    launcher: L,
    config: Config,
    pacer: Arc<Pacer>,
    operator: Arc<dyn OperatorSignal>,
    sink: Arc<dyn RecordSink>,
    /// First page not yet written by any attempt.
    next_unfinished: AtomicU32,
}

impl<L: BrowserLauncher> Harvester<L> {
    /// Harvester with real-time pacing from `config` and a console operator.
    pub fn new(session: CrawlSession, launcher: L, config: Config, sink: Arc<dyn RecordSink>) -> Self {
        let pacer = Arc::new(Pacer::new(config.pacing.clone()));
        Self {
            session,
            launcher,
            config,
            pacer,
            operator: Arc::new(ConsoleOperator),
            sink,
            next_unfinished: AtomicU32::new(0),
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_operator(mut self, operator: Arc<dyn OperatorSignal>) -> Self {
        self.operator = operator;
        self
    }

    pub fn session(&self) -> &CrawlSession {
        &self.session
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Run attempts until one succeeds, a non-retryable error occurs, or the
    /// policy is exhausted. Later attempts resume from the first page no
    /// earlier attempt finished, so rows already written are not repeated.
    pub async fn run_with_retries(
        &self,
        request: &CrawlRequest,
        policy: &RetryPolicy,
    ) -> Result<CrawlReport> {
        self.next_unfinished.store(request.start_page, Ordering::SeqCst);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let resume = CrawlRequest {
                start_page: self
                    .next_unfinished
                    .load(Ordering::SeqCst)
                    .max(request.start_page),
                ..*request
            };
            if resume.start_page > request.start_page {
                info!(
                    "Starting crawl attempt {}/{} from page {}",
                    attempt, policy.max_attempts, resume.start_page
                );
            } else {
                info!("Starting crawl attempt {}/{}", attempt, policy.max_attempts);
            }

            let err = match self.run(&resume).await {
                Ok(report) => return Ok(report),
                Err(e) => e,
            };
            error!("Attempt {} failed: {}", attempt, err);

            if !err.is_retryable() {
                return Err(err);
            }
            if !policy.allows_retry_after(attempt) {
                error!("Max retries reached. Please check the issues and try again.");
                return Err(HarvestError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            info!("Retrying in {:?}...", policy.backoff);
            tokio::time::sleep(policy.backoff).await;
        }
    }

    /// One crawl attempt. The browser is closed on every exit path.
    pub async fn run(&self, request: &CrawlRequest) -> Result<CrawlReport> {
        if request.start_page < 1 {
            return Err(HarvestError::InvalidStartPage(request.start_page));
        }

        let mut tracker = StateTracker::new();
        tracker.enter(CrawlState::Bootstrapping);
        info!("Starting crawl of {}", self.session.target_url());

        let driver = self.session.open(&self.launcher).await?;
        let outcome = self.drive(&driver, request, &mut tracker).await;

        tracker.enter(CrawlState::Done);
        self.session.save_cookies(&driver).await;
        if let Err(e) = driver.close().await {
            warn!("Error closing browser: {}", e);
        }

        match &outcome {
            Ok(report) => info!(
                "Crawl finished: {} records from {} pages",
                report.records_written, report.pages_processed
            ),
            Err(e) => error!("Fatal error: {}", e),
        }
        outcome
    }

    async fn drive<D: PageDriver>(
        &self,
        driver: &D,
        request: &CrawlRequest,
        tracker: &mut StateTracker,
    ) -> Result<CrawlReport> {
        let target = self.session.target_url();
        driver
            .navigate(target.as_str())
            .await
            .map_err(|source| HarvestError::Bootstrap {
                url: target.to_string(),
                source,
            })?;
        info!("Loaded first page");

        self.session.load_cookies(driver).await;
        self.operator
            .acknowledge(Checkpoint::SessionStart, CONSENT_PROMPT)
            .await;
        self.session.save_cookies(driver).await;

        let navigator = PageNavigator::new(target, &self.config.selectors, &self.pacer);
        let mut report = CrawlReport::default();

        if request.start_page > 1 {
            tracker.enter(CrawlState::SeekStartPage {
                target: request.start_page,
            });
            info!("Navigating to start page {}", request.start_page);
            match navigator.advance(driver, request.start_page).await {
                NavigationOutcome::Ui => {}
                NavigationOutcome::Url => report.ui_fallbacks += 1,
                NavigationOutcome::Failed => {
                    error!("Failed to reach start page {}", request.start_page);
                    return Err(HarvestError::StartPageUnreachable(request.start_page));
                }
            }
        }

        let discovered = navigator.discover_total_pages(driver).await;
        let total_pages = match request.max_pages {
            Some(max) => discovered.min(max),
            None => discovered,
        };
        info!(
            "Will scrape {} pages starting from page {}",
            total_pages, request.start_page
        );

        let extractor = FieldExtractor::new(self.config.selectors.clone());
        let recovery_cap = self.config.crawl.max_page_recoveries;
        let mut page = request.start_page;
        let mut failures_here = 0;

        while page <= total_pages {
            tracker.enter(CrawlState::PageLoop { page });
            info!("Processing page {}/{}", page, total_pages);

            if let Err(source) = self.process_page(driver, &extractor, page, &mut report).await {
                error!("Error processing page {}: {}", page, source);
                failures_here += 1;
                if failures_here > recovery_cap {
                    return Err(HarvestError::PageUnrecoverable {
                        page,
                        recoveries: recovery_cap,
                        source,
                    });
                }

                tracker.enter(CrawlState::Recovering { page });
                report.recoveries += 1;
                self.operator
                    .acknowledge(Checkpoint::PageRecovery, RECOVERY_PROMPT)
                    .await;
                continue;
            }

            failures_here = 0;
            report.pages_processed += 1;
            report.last_page = Some(page);
            self.next_unfinished.fetch_max(page + 1, Ordering::SeqCst);

            if page < total_pages {
                match navigator.advance(driver, page + 1).await {
                    NavigationOutcome::Ui => {}
                    NavigationOutcome::Url => report.ui_fallbacks += 1,
                    NavigationOutcome::Failed => {
                        error!("Navigation to page {} failed. Stopping crawl.", page + 1);
                        report.halted = true;
                        break;
                    }
                }
                self.pacer.page_pause().await;
            }
            page += 1;
        }

        Ok(report)
    }

    /// Scroll, enumerate and extract one page. Errors here are page-level;
    /// a failing listing is only skipped.
    async fn process_page<D: PageDriver>(
        &self,
        driver: &D,
        extractor: &FieldExtractor,
        page: u32,
        report: &mut CrawlReport,
    ) -> DriverResult<()> {
        let selector = &self.config.selectors.listing;

        if self.config.crawl.scroll_pages {
            simulate_scroll(driver, &self.pacer).await?;
        }

        let timeout = self.session.browser_settings().element_timeout();
        if driver.wait_for(selector, timeout).await?.is_none() {
            warn!("No listings appeared on page {} within {:?}", page, timeout);
        }

        let listings = driver.find_all(selector).await?;
        info!("Found {} listings on page {}", listings.len(), page);
        report.listings_seen += listings.len();

        let mut written = 0;
        for (idx, listing) in listings.iter().enumerate() {
            let idx = idx + 1;
            match extractor.extract(listing, page, self.sink.as_ref()).await {
                Ok(Some(_)) => written += 1,
                Ok(None) => {
                    warn!("Failed to extract data for listing {} on page {}", idx, page);
                    report.listings_skipped += 1;
                }
                Err(e) if e.is_stale() => {
                    warn!("Listing {} on page {} became stale, skipping...", idx, page);
                    report.listings_skipped += 1;
                }
                Err(e) => {
                    warn!("Listing {} on page {} could not be read: {}", idx, page, e);
                    report.listings_skipped += 1;
                }
            }
        }

        report.records_written += written;
        info!(
            "Page {}: saved {} of {} listings",
            page,
            written,
            listings.len()
        );
        Ok(())
    }
}
