//! Harvested data.

use serde::Serialize;

/// Placeholder for location and posting date when they cannot be read.
pub const UNKNOWN: &str = "Unknown";

/// Output columns, in file order.
pub const LISTING_COLUMNS: [&str; 7] = [
    "title",
    "price",
    "year",
    "kilometers",
    "location",
    "listing_date",
    "page_number",
];

/// One classified ad as stored in the output file.
///
/// Field order matches [`LISTING_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingRecord {
    pub title: String,
    /// Asking price with currency symbols and separators removed; 0 when unreadable.
    pub price: u64,
    /// Raw first token of the details line, not validated.
    pub year: String,
    /// Raw second token of the details line, e.g. "12017 km".
    #[serde(rename = "kilometers")]
    pub distance: String,
    pub location: String,
    #[serde(rename = "listing_date")]
    pub posting_date: String,
    /// Catalogue page the listing was read from, as counted by the crawler.
    pub page_number: u32,
}
