//! Append-only CSV output.
//!
//! The file is reopened for every record so a crash after N records leaves
//! exactly N complete rows on disk.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::Result;
use crate::models::{ListingRecord, LISTING_COLUMNS};

/// Destination for extracted records.
pub trait RecordSink: Send + Sync {
    /// Persist one record. Failures are the sink's to report; callers carry on.
    fn append(&self, record: &ListingRecord);
}

/// CSV file with a fixed header.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Create (or truncate) the file and write the header row.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(LISTING_COLUMNS)?;
        writer.flush()?;
        debug!("Created output file {:?}", path);

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_row(&self, record: &ListingRecord) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}

impl RecordSink for CsvSink {
    fn append(&self, record: &ListingRecord) {
        if let Err(e) = self.write_row(record) {
            error!("Error saving to {:?}: {}", self.path, e);
        }
    }
}
