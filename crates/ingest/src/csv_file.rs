use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gold_etl_transform::RawPriceRecord;
use serde_json::Value as JsonValue;

use crate::Collector;

/// Reads a CSV file into raw records, one per data row, keyed by the
/// header names exactly as the source spelled them.
pub struct CsvFileCollector {
    path: PathBuf,
    name: String,
}

impl CsvFileCollector {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            name: format!("csv:{}", path.display()),
        }
    }
}

impl Collector for CsvFileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> Result<Vec<RawPriceRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open CSV file: {}", self.path.display()))?;
        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read CSV headers: {}", self.path.display()))?
            .clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row.with_context(|| {
                format!("Failed to read CSV row in {}", self.path.display())
            })?;
            let mut record = RawPriceRecord::new();
            for (header, cell) in headers.iter().zip(row.iter()) {
                record.insert(header, JsonValue::String(cell.to_string()));
            }
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_rows_keep_source_header_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gold_price.csv");
        fs::write(
            &path,
            "type,buy,sell,update\nSJC 1L,\"73,500,000\",\"74,300,000\",15/01/2024 09:30:00\n",
        )
        .unwrap();

        let records = CsvFileCollector::new(&path).collect().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["type"], "SJC 1L");
        assert_eq!(records[0].fields["buy"], "73,500,000");
        assert_eq!(records[0].fields["update"], "15/01/2024 09:30:00");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = CsvFileCollector::new(Path::new("/no/such/file.csv")).collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_body_yields_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "type,buy,sell\n").unwrap();

        let records = CsvFileCollector::new(&path).collect().unwrap();
        assert!(records.is_empty());
    }
}
