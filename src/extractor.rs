//! Per-listing field extraction.
//!
//! Every field except the title falls back to a default when its element is
//! missing or unreadable. A listing without a title is not a listing.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::browser::ElementHandle;
use crate::config::Selectors;
use crate::error::DriverResult;
use crate::models::{ListingRecord, UNKNOWN};
use crate::sink::RecordSink;

/// Thousands separator between two digits.
static DIGIT_GROUPING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d),(\d)").expect("valid regex"));

/// Detail separators with any surrounding whitespace.
static DETAIL_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[-|]\s*").expect("valid regex"));

/// Strip everything but digits and parse. Empty or overflowing input is 0.
pub fn clean_price(text: &str) -> u64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Split a details line such as "2019 - 12,017 km" into its tokens.
pub fn split_details(text: &str) -> Vec<String> {
    // Applied twice so overlapping groups like "1,234,567" collapse fully
    let once = DIGIT_GROUPING.replace_all(text.trim(), "$1$2");
    let normalized = DIGIT_GROUPING.replace_all(&once, "$1$2");
    DETAIL_SEPARATOR
        .split(&normalized)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Year and distance tokens, empty when absent.
pub fn year_and_distance(text: &str) -> (String, String) {
    let mut tokens = split_details(text).into_iter();
    let year = tokens.next().unwrap_or_default();
    let distance = tokens.next().unwrap_or_default();
    (year, distance)
}

/// Location (first line, before any "==") and posting date (last line).
pub fn split_meta(text: &str) -> (String, String) {
    let text = text.trim();
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.first().copied().unwrap_or_default();
    let last = lines.last().copied().unwrap_or_default();
    let location = first.split("==").next().unwrap_or_default().trim();
    (location.to_string(), last.trim().to_string())
}

/// Format a price with thousands separators for log output.
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Text of the first `selector` match under `listing`, if it can be read.
async fn optional_text<E: ElementHandle>(listing: &E, selector: &str) -> Option<String> {
    match listing.find_one(selector).await {
        Ok(Some(element)) => match element.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!("Could not read {}: {}", selector, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            debug!("Lookup of {} failed: {}", selector, e);
            None
        }
    }
}

/// Reads listing elements into records.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    selectors: Selectors,
}

impl FieldExtractor {
    pub fn new(selectors: Selectors) -> Self {
        Self { selectors }
    }

    /// Extract one listing and hand it to `sink` before returning it.
    ///
    /// Returns `Ok(None)` when the element has no title. An error reading the
    /// title (typically a stale element) is returned so the caller can skip
    /// the listing.
    pub async fn extract<E: ElementHandle>(
        &self,
        listing: &E,
        page_number: u32,
        sink: &dyn RecordSink,
    ) -> DriverResult<Option<ListingRecord>> {
        let Some(title_element) = listing.find_one(&self.selectors.title).await? else {
            debug!("Element on page {} has no title, not a listing", page_number);
            return Ok(None);
        };
        let title = title_element.text().await?.trim().to_string();

        let price = optional_text(listing, &self.selectors.price)
            .await
            .map(|t| clean_price(&t))
            .unwrap_or(0);

        let (year, distance) = optional_text(listing, &self.selectors.details)
            .await
            .map(|t| year_and_distance(&t))
            .unwrap_or_default();

        let (location, posting_date) = optional_text(listing, &self.selectors.meta)
            .await
            .map(|t| split_meta(&t))
            .unwrap_or_else(|| (UNKNOWN.to_string(), UNKNOWN.to_string()));

        let record = ListingRecord {
            title,
            price,
            year,
            distance,
            location,
            posting_date,
            page_number,
        };

        sink.append(&record);

        let details = [record.year.as_str(), record.distance.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        info!(
            "Scraped: {} - {} ({}) ({}, {})",
            record.title,
            group_thousands(record.price),
            details,
            record.location,
            record.posting_date
        );

        Ok(Some(record))
    }
}
