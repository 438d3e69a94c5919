//! Cookie jar files.
//!
//! Jars are JSON arrays of cookie objects. Reading is permissive: entries
//! exported by other tools (`key` instead of `name`, missing path) are
//! accepted, and entries without a name or domain are skipped.

use std::path::Path;

use tracing::debug;

use super::types::BrowserCookie;
use crate::error::{HarvestError, Result};

fn cookie_error(path: &Path, reason: impl ToString) -> HarvestError {
    HarvestError::CookieFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Read a cookie jar. A missing file is an empty jar.
pub fn read_cookie_file(path: &Path) -> Result<Vec<BrowserCookie>> {
    if !path.exists() {
        debug!("No cookie file at {:?}", path);
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| cookie_error(path, e))?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&content).map_err(|e| cookie_error(path, e))?;

    let mut cookies = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry
            .get("name")
            .or_else(|| entry.get("key"))
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let domain = entry
            .get("domain")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        if name.is_empty() || domain.is_empty() {
            continue;
        }

        let value = entry
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let mut cookie = BrowserCookie::new(name, value, domain);
        if let Some(path) = entry.get("path").and_then(|v| v.as_str()) {
            cookie.path = path.to_string();
        }
        cookie.secure = entry
            .get("secure")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        cookie.http_only = entry
            .get("httpOnly")
            .or_else(|| entry.get("http_only"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        cookie.expires = entry
            .get("expires")
            .or_else(|| entry.get("expiry"))
            .and_then(|v| v.as_f64());

        cookies.push(cookie);
    }

    Ok(cookies)
}

/// Write a cookie jar, creating parent directories as needed.
pub fn write_cookie_file(path: &Path, cookies: &[BrowserCookie]) -> Result<()> {
    let json = serde_json::to_string_pretty(cookies).map_err(|e| cookie_error(path, e))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| cookie_error(path, e))?;
        }
    }
    std::fs::write(path, json).map_err(|e| cookie_error(path, e))?;
    Ok(())
}
