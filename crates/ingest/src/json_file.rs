use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use gold_etl_transform::RawPriceRecord;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::Collector;

/// Wrapper keys some vendor feeds nest their price array under.
const WRAPPER_KEYS: &[&str] = &["DGPlist", "IGPList"];

/// Reads a JSON file into raw records. Accepts either a top-level array of
/// objects or an object wrapping that array under a known vendor key.
pub struct JsonFileCollector {
    path: PathBuf,
    name: String,
}

impl JsonFileCollector {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            name: format!("json:{}", path.display()),
        }
    }
}

impl Collector for JsonFileCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self) -> Result<Vec<RawPriceRecord>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read JSON file: {}", self.path.display()))?;
        let value: JsonValue = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON file: {}", self.path.display()))?;

        let items = match value {
            JsonValue::Array(items) => items,
            JsonValue::Object(mut object) => {
                let wrapped = WRAPPER_KEYS.iter().find_map(|key| object.remove(*key));
                match wrapped {
                    Some(JsonValue::Array(items)) => items,
                    _ => anyhow::bail!(
                        "JSON file {} is neither an array nor a known wrapper object",
                        self.path.display()
                    ),
                }
            }
            _ => anyhow::bail!(
                "JSON file {} does not contain price records",
                self.path.display()
            ),
        };

        let mut records = Vec::new();
        for item in items {
            match item {
                JsonValue::Object(fields) => records.push(RawPriceRecord { fields }),
                other => warn!("skipping non-object entry in {}: {other}", self.path.display()),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_top_level_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.json");
        fs::write(
            &path,
            r#"[{"GoldType": "SJC 1L", "BuyPrice": 100, "SellPrice": 110}]"#,
        )
        .unwrap();

        let records = JsonFileCollector::new(&path).collect().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["GoldType"], "SJC 1L");
    }

    #[test]
    fn test_vendor_wrapper_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendor.json");
        fs::write(
            &path,
            r#"{"DGPlist": [{"Type": "DOJI", "Buy": "200", "Sell": "220"}]}"#,
        )
        .unwrap();

        let records = JsonFileCollector::new(&path).collect().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["Type"], "DOJI");
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.json");
        fs::write(&path, r#"[{"Type": "SJC"}, 42, "noise"]"#).unwrap();

        let records = JsonFileCollector::new(&path).collect().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_unknown_shape_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalar.json");
        fs::write(&path, "42").unwrap();

        assert!(JsonFileCollector::new(&path).collect().is_err());
    }
}
