//! Configuration management for listharvest.
//!
//! Every section has working defaults for the OLX India catalogue, so a
//! config file only needs the values that differ.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::BrowserSettings;
use crate::error::{HarvestError, Result};
use crate::pacing::PacingSettings;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteSettings,
    pub browser: BrowserSettings,
    pub selectors: Selectors,
    pub pacing: PacingSettings,
    pub crawl: CrawlSettings,

    /// Path the config was loaded from, if any.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Target site identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    /// Only URLs with exactly this origin are accepted.
    pub allowed_origin: String,
    /// Prefix for output and cookie file names.
    pub file_prefix: String,
    /// Category URL used when the operator does not supply one.
    pub default_url: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            allowed_origin: "https://www.olx.in".to_string(),
            file_prefix: "olx".to_string(),
            default_url: "https://www.olx.in/en-in/bengaluru_g4058803/motorcycles_c81".to_string(),
        }
    }
}

/// CSS selectors for the catalogue markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub listing: String,
    pub title: String,
    pub price: String,
    pub details: String,
    pub meta: String,
    pub page_item: String,
    pub next_page: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            listing: "div._2v8Tq".to_string(),
            title: r#"div._2Gr10[data-aut-id="itemTitle"]"#.to_string(),
            price: r#"span._1zgtX[data-aut-id="itemPrice"]"#.to_string(),
            details: r#"div._21gnE[data-aut-id="itemSubTitle"]"#.to_string(),
            meta: r#"div._3VRSm[data-aut-id="itemDetails"]"#.to_string(),
            page_item: r#"a[data-aut-id="pageItem"]"#.to_string(),
            next_page: r#"a[data-aut-id="pagination-next"]"#.to_string(),
        }
    }
}

/// Crawl loop and retry envelope settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    /// Directory receiving CSV output.
    pub output_dir: PathBuf,
    /// Directory holding per-category cookie jars.
    pub cookie_dir: PathBuf,
    /// Scroll each page to the bottom before reading listings.
    pub scroll_pages: bool,
    /// Whole-run attempts before giving up.
    pub max_attempts: u32,
    /// Pause between whole-run attempts, in seconds.
    pub retry_backoff_secs: u64,
    /// Consecutive recoveries allowed on a single page before the error
    /// is handed to the retry envelope.
    pub max_page_recoveries: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            cookie_dir: PathBuf::from("."),
            scroll_pages: true,
            max_attempts: 3,
            retry_backoff_secs: 30,
            max_page_recoveries: 5,
        }
    }
}

impl CrawlSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(&resolve_path(path)).await,
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports TOML and JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            HarvestError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        let mut config: Config = match ext {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| HarvestError::Config(format!("Failed to parse JSON config: {}", e)))?,
            _ => toml::from_str(&contents)
                .map_err(|e| HarvestError::Config(format!("Failed to parse TOML config: {}", e)))?,
        };

        config.crawl.output_dir = resolve_path(&config.crawl.output_dir);
        config.crawl.cookie_dir = resolve_path(&config.crawl.cookie_dir);
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }
}

/// Expand `~` in a user-supplied path.
pub fn resolve_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}
