//! File collectors for the gold price pipeline.
//!
//! Every source — the external web scraper's JSON drops, CSV exports,
//! spreadsheet extracts saved as CSV — is an interchangeable producer of
//! [`RawPriceRecord`] behind the single [`Collector`] seam. Field-name
//! variance is left intact here; the normalizer resolves it.

pub mod csv_file;
pub mod json_file;

use std::path::{Path, PathBuf};

use anyhow::Result;
use gold_etl_transform::RawPriceRecord;
use tracing::{info, warn};

pub use csv_file::CsvFileCollector;
pub use json_file::JsonFileCollector;

pub trait Collector {
    /// Human-readable source name used in logs.
    fn name(&self) -> &str;

    /// Produces the raw records held by this source.
    ///
    /// # Errors
    /// Returns an error if the source cannot be read or parsed at all;
    /// individual malformed entries are skipped with a warning instead.
    fn collect(&self) -> Result<Vec<RawPriceRecord>>;
}

/// Lists regular files in `dir` with the given extension, sorted by name
/// for deterministic processing order. A missing directory is an empty
/// listing, not an error.
///
/// # Errors
/// Returns an error if the directory exists but cannot be read.
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Sweeps a directory for CSV and JSON price files and gathers every record
/// they produce. A file that fails to parse is skipped with a warning so
/// one bad drop cannot block the rest of the sweep.
///
/// # Errors
/// Returns an error if the directory exists but cannot be listed.
pub fn sweep_data_dir(dir: &Path) -> Result<Vec<RawPriceRecord>> {
    let mut records = Vec::new();

    for path in list_files(dir, "csv")? {
        gather(&CsvFileCollector::new(&path), &mut records);
    }
    for path in list_files(dir, "json")? {
        gather(&JsonFileCollector::new(&path), &mut records);
    }

    info!("swept {:?}: {} raw records", dir, records.len());
    Ok(records)
}

fn gather(collector: &impl Collector, records: &mut Vec<RawPriceRecord>) {
    match collector.collect() {
        Ok(mut found) => records.append(&mut found),
        Err(err) => warn!("skipping {}: {:#}", collector.name(), err),
    }
}
