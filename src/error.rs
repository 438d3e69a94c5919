//! Error types for the harvesting pipeline.

use std::time::Duration;

use thiserror::Error;

/// Failures reported by a browser driver.
///
/// "Element not found" is not an error: lookups return `Ok(None)` instead.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("element is no longer attached to the document")]
    Stale,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("browser protocol error: {0}")]
    Protocol(String),
    #[error("browser session is closed")]
    Closed,
}

impl DriverError {
    pub fn is_stale(&self) -> bool {
        matches!(self, DriverError::Stale)
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid target URL {url}: {reason}")]
    InvalidTarget { url: String, reason: String },
    #[error("start page must be at least 1 (got {0})")]
    InvalidStartPage(u32),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("could not load {url}: {source}")]
    Bootstrap {
        url: String,
        #[source]
        source: DriverError,
    },
    #[error("could not reach start page {0}")]
    StartPageUnreachable(u32),
    #[error("page {page} still failing after {recoveries} recoveries: {source}")]
    PageUnrecoverable {
        page: u32,
        recoveries: u32,
        #[source]
        source: DriverError,
    },
    #[error("output file error: {0}")]
    Output(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("cookie file {path}: {reason}")]
    CookieFile { path: String, reason: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("crawl failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<HarvestError>,
    },
}

impl HarvestError {
    /// Whether the outer retry envelope should try the whole run again.
    ///
    /// Bad input and an unreachable start page fail the same way on every
    /// attempt, so they end the run immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            HarvestError::InvalidTarget { .. }
                | HarvestError::InvalidStartPage(_)
                | HarvestError::StartPageUnreachable(_)
                | HarvestError::Config(_)
                | HarvestError::RetriesExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
