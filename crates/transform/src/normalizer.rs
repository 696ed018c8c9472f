//! Record normalization: field-name alias resolution, price parsing, and
//! timestamp canonicalization.

use std::collections::HashSet;
use std::fmt;

use chrono::{Local, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::warn;

use gold_etl_core::EtlError;

use crate::record::{CleanPriceRecord, RawPriceRecord};

/// Field-name variants seen across sources, matched case-insensitively
/// after trimming. Consulted once at ingestion; downstream code never sees
/// source-specific names.
const GOLD_TYPE_ALIASES: &[&str] = &["goldtype", "gold_type", "type", "name"];
const BUY_PRICE_ALIASES: &[&str] = &["buyprice", "buy_price", "buy"];
const SELL_PRICE_ALIASES: &[&str] = &["sellprice", "sell_price", "sell"];
const UPDATE_TIME_ALIASES: &[&str] = &["updatetime", "update_time", "update", "datetime"];

/// Ordered timestamp formats. Day-first comes before ISO so that
/// `02/01/2024` reads as January 2nd, matching the sources' convention.
const TIMESTAMP_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Why a single row was dropped. Rejections never abort the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingField(&'static str),
    EmptyGoldType,
    NegativePrice { field: &'static str, value: String },
    UnparsablePrice { field: &'static str, value: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing required field {field}"),
            Self::EmptyGoldType => write!(f, "empty GoldType"),
            Self::NegativePrice { field, value } => {
                write!(f, "negative {field}: {value}")
            }
            Self::UnparsablePrice { field, value } => {
                write!(f, "unparsable {field}: {value}")
            }
        }
    }
}

/// Cleans raw records into [`CleanPriceRecord`]s.
///
/// The processing time is captured at construction and used as the fallback
/// for unparsable timestamps, so every record of one batch falls back to the
/// same instant.
pub struct RecordNormalizer {
    processing_time: NaiveDateTime,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            processing_time: Local::now().naive_local(),
        }
    }

    #[must_use]
    pub fn with_processing_time(processing_time: NaiveDateTime) -> Self {
        Self { processing_time }
    }

    /// Normalizes a single raw record.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectReason`] when the record must be dropped. An
    /// unparsable timestamp is never a rejection cause; it falls back to the
    /// processing time.
    pub fn normalize(&self, raw: &RawPriceRecord) -> Result<CleanPriceRecord, RejectReason> {
        let gold_type = lookup(raw, GOLD_TYPE_ALIASES)
            .ok_or(RejectReason::MissingField("GoldType"))?
            .as_str()
            .map(str::trim)
            .ok_or(RejectReason::MissingField("GoldType"))?
            .to_string();
        if gold_type.is_empty() {
            return Err(RejectReason::EmptyGoldType);
        }

        let buy_price = parse_price(
            lookup(raw, BUY_PRICE_ALIASES).ok_or(RejectReason::MissingField("BuyPrice"))?,
            "BuyPrice",
        )?;
        let sell_price = parse_price(
            lookup(raw, SELL_PRICE_ALIASES).ok_or(RejectReason::MissingField("SellPrice"))?,
            "SellPrice",
        )?;
        let update_time = self.parse_timestamp(lookup(raw, UPDATE_TIME_ALIASES));

        Ok(CleanPriceRecord {
            gold_type,
            buy_price,
            sell_price,
            update_time,
        })
    }

    /// Normalizes a batch, dropping rejected rows with a warning and
    /// deduplicating exact repeats.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Schema`] when every record lacked the required
    /// fields (the batch shape is wrong, retrying cannot help), and
    /// [`EtlError::NoValidData`] when the shape was fine but no row survived
    /// validation.
    pub fn normalize_batch(&self, raws: &[RawPriceRecord]) -> Result<Vec<CleanPriceRecord>, EtlError> {
        let mut accepted = Vec::new();
        let mut seen = HashSet::new();
        let mut missing_field_rejects = 0usize;

        for raw in raws {
            match self.normalize(raw) {
                Ok(record) => {
                    let key = (
                        record.gold_type.clone(),
                        record.buy_price,
                        record.sell_price,
                        record.update_time,
                    );
                    if seen.insert(key) {
                        accepted.push(record);
                    }
                }
                Err(reason) => {
                    if matches!(reason, RejectReason::MissingField(_)) {
                        missing_field_rejects += 1;
                    }
                    warn!("dropping record: {reason}");
                }
            }
        }

        if accepted.is_empty() {
            if !raws.is_empty() && missing_field_rejects == raws.len() {
                return Err(EtlError::Schema(
                    "no record carried the required GoldType/BuyPrice/SellPrice columns".to_string(),
                ));
            }
            return Err(EtlError::NoValidData);
        }

        Ok(accepted)
    }

    fn parse_timestamp(&self, value: Option<&JsonValue>) -> NaiveDateTime {
        let Some(text) = value.and_then(JsonValue::as_str).map(str::trim) else {
            return self.processing_time;
        };
        for format in TIMESTAMP_FORMATS {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
                return parsed;
            }
        }
        warn!("unparsable timestamp {text:?}, falling back to processing time");
        self.processing_time
    }
}

fn lookup<'a>(raw: &'a RawPriceRecord, aliases: &[&str]) -> Option<&'a JsonValue> {
    raw.fields
        .iter()
        .find(|(key, _)| {
            let key = key.trim().to_lowercase();
            aliases.contains(&key.as_str())
        })
        .map(|(_, value)| value)
}

fn parse_price(value: &JsonValue, field: &'static str) -> Result<Decimal, RejectReason> {
    let parsed = match value {
        JsonValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                Some(Decimal::from(int))
            } else {
                number.as_f64().and_then(|float| Decimal::try_from(float).ok())
            }
        }
        JsonValue::String(text) => {
            let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
            cleaned.parse::<Decimal>().ok()
        }
        _ => None,
    };

    let price = parsed.ok_or_else(|| RejectReason::UnparsablePrice {
        field,
        value: value.to_string(),
    })?;
    if price < Decimal::ZERO {
        return Err(RejectReason::NegativePrice {
            field,
            value: value.to_string(),
        });
    }
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn processing_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::with_processing_time(processing_time())
    }

    #[test]
    fn test_canonical_field_names_pass_through() {
        let raw = RawPriceRecord::from_pairs([
            ("GoldType", json!("SJC 1L")),
            ("BuyPrice", json!("73,500,000")),
            ("SellPrice", json!("74,300,000")),
            ("UpdateTime", json!("2024-01-15 09:30:00")),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.gold_type, "SJC 1L");
        assert_eq!(record.buy_price, dec!(73_500_000));
        assert_eq!(record.sell_price, dec!(74_300_000));
        assert_eq!(
            record.update_time,
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_source_aliases_resolve_case_insensitively() {
        let raw = RawPriceRecord::from_pairs([
            ("Type", json!("PNJ 24K")),
            (" buy ", json!(7_350_000)),
            ("SELL", json!(7_430_000)),
            ("update", json!("15/01/2024 09:30:00")),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.gold_type, "PNJ 24K");
        assert_eq!(record.buy_price, dec!(7_350_000));
    }

    #[test]
    fn test_day_first_format_wins_over_iso_ambiguity() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
            ("update", json!("02/01/2024 09:30:00")),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        // Day-first: January 2nd, not February 1st.
        assert_eq!(
            record.update_time.date(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_iso_t_separator_is_accepted() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
            ("update", json!("2024-03-04T10:20:30")),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(
            record.update_time,
            NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(10, 20, 30)
                .unwrap()
        );
    }

    #[test]
    fn test_unparsable_timestamp_falls_back_to_processing_time() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
            ("update", json!("yesterday-ish")),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.update_time, processing_time());
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_processing_time() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.update_time, processing_time());
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!("-5")),
            ("sell", json!(110)),
        ]);

        let reject = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(
            reject,
            RejectReason::NegativePrice { field: "BuyPrice", .. }
        ));
    }

    #[test]
    fn test_unparsable_price_is_rejected() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!("n/a")),
            ("sell", json!(110)),
        ]);

        let reject = normalizer().normalize(&raw).unwrap_err();
        assert!(matches!(
            reject,
            RejectReason::UnparsablePrice { field: "BuyPrice", .. }
        ));
    }

    #[test]
    fn test_empty_gold_type_is_rejected() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("   ")),
            ("buy", json!(100)),
            ("sell", json!(110)),
        ]);

        assert_eq!(
            normalizer().normalize(&raw).unwrap_err(),
            RejectReason::EmptyGoldType
        );
    }

    #[test]
    fn test_batch_drops_bad_rows_and_keeps_good_ones() {
        let good = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
        ]);
        let bad = RawPriceRecord::from_pairs([
            ("type", json!("SJC 5c")),
            ("buy", json!("-5")),
            ("sell", json!(110)),
        ]);

        let records = normalizer().normalize_batch(&[good, bad]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gold_type, "SJC 1L");
    }

    #[test]
    fn test_batch_deduplicates_exact_repeats() {
        let record = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100)),
            ("sell", json!(110)),
            ("update", json!("2024-01-15 09:30:00")),
        ]);

        let records = normalizer()
            .normalize_batch(&[record.clone(), record])
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_all_rejected_batch_is_no_valid_data() {
        let bad = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!("-5")),
            ("sell", json!(110)),
        ]);

        let err = normalizer().normalize_batch(&[bad]).unwrap_err();
        assert!(matches!(err, EtlError::NoValidData));
    }

    #[test]
    fn test_wrong_columns_everywhere_is_schema_error() {
        let unrelated = RawPriceRecord::from_pairs([
            ("symbol", json!("XAU")),
            ("open", json!(100)),
            ("close", json!(110)),
        ]);

        let err = normalizer()
            .normalize_batch(&[unrelated.clone(), unrelated])
            .unwrap_err();
        assert!(matches!(err, EtlError::Schema(_)));
    }

    #[test]
    fn test_empty_batch_is_no_valid_data() {
        let err = normalizer().normalize_batch(&[]).unwrap_err();
        assert!(matches!(err, EtlError::NoValidData));
    }

    #[test]
    fn test_float_prices_are_accepted() {
        let raw = RawPriceRecord::from_pairs([
            ("type", json!("SJC 1L")),
            ("buy", json!(100.25)),
            ("sell", json!(110.75)),
        ]);

        let record = normalizer().normalize(&raw).unwrap();
        assert_eq!(record.buy_price, dec!(100.25));
        assert_eq!(record.sell_price, dec!(110.75));
    }
}
