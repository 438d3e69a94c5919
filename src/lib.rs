//! listharvest - resumable classifieds listing harvester.
//!
//! Drives a stealth browser through a paginated category, extracting one
//! record per listing into an append-only CSV file.

pub mod browser;
pub mod config;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod models;
pub mod navigator;
pub mod operator;
pub mod pacing;
pub mod session;
pub mod sink;
pub mod telemetry;

pub use config::Config;
pub use controller::{CrawlReport, CrawlRequest, Harvester, RetryPolicy};
pub use error::{DriverError, HarvestError};
pub use models::ListingRecord;
