//! Raw and canonical price record shapes.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A price observation exactly as a collector handed it over, keyed by
/// whatever field names the source used (`type`/`buy`/`sell`/`update`,
/// `GoldType`/`BuyPrice`/..., and friends). Only the normalizer ever looks
/// at these keys; downstream components see [`CleanPriceRecord`] only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPriceRecord {
    #[serde(flatten)]
    pub fields: serde_json::Map<String, JsonValue>,
}

impl RawPriceRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a record from `(field, value)` pairs.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, JsonValue)>,
        K: Into<String>,
    {
        let mut fields = serde_json::Map::new();
        for (key, value) in pairs {
            fields.insert(key.into(), value);
        }
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        self.fields.insert(key.into(), value);
    }
}

/// A validated, canonically shaped price observation.
///
/// Invariants: `gold_type` is non-empty, both prices are non-negative, and
/// `update_time` is always concrete (the normalizer substitutes processing
/// time when the source timestamp cannot be parsed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanPriceRecord {
    pub gold_type: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub update_time: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_record_round_trips_through_json() {
        let record = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!("73,500,000")),
            ("sell", json!(74_300_000)),
        ]);

        let text = serde_json::to_string(&record).unwrap();
        let back: RawPriceRecord = serde_json::from_str(&text).unwrap();

        assert_eq!(back.fields.len(), 3);
        assert_eq!(back.fields["type"], json!("SJC 1L"));
        assert_eq!(back.fields["sell"], json!(74_300_000));
    }

    #[test]
    fn test_raw_record_serializes_flat() {
        let record = RawPriceRecord::from_pairs([("GoldType", json!("PNJ"))]);
        let value = serde_json::to_value(&record).unwrap();
        // The map is the object itself, not nested under a "fields" key.
        assert_eq!(value, json!({"GoldType": "PNJ"}));
    }
}
