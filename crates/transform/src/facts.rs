//! Fact construction: dimension key resolution and derived price metrics.

use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dimensions::{date_key_for, GoldTypeDimensionRow};
use crate::record::CleanPriceRecord;

/// One fact per clean record. Monetary fields are rounded to 2 decimals
/// with banker's rounding (midpoint-nearest-even).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub gold_type_key: i32,
    pub date_key: i32,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub price_difference: Decimal,
    pub price_difference_percentage: Decimal,
}

pub struct FactBuilder;

impl FactBuilder {
    /// Joins records against the batch gold-type dimension and computes the
    /// derived metrics. A record whose gold type is missing from the
    /// dimension fails that row, not the batch; this should not occur when
    /// dimensions were built from the same batch.
    #[must_use]
    pub fn build(
        records: &[CleanPriceRecord],
        gold_type_dim: &[GoldTypeDimensionRow],
    ) -> Vec<FactRow> {
        let keys: HashMap<&str, i32> = gold_type_dim
            .iter()
            .map(|row| (row.gold_type.as_str(), row.gold_type_key))
            .collect();

        records
            .iter()
            .filter_map(|record| {
                let Some(&gold_type_key) = keys.get(record.gold_type.as_str()) else {
                    warn!(
                        "skipping fact for {:?}: not present in gold type dimension",
                        record.gold_type
                    );
                    return None;
                };

                let difference = record.sell_price - record.buy_price;
                let percentage = if record.buy_price.is_zero() {
                    Decimal::ZERO
                } else {
                    difference / record.buy_price * Decimal::ONE_HUNDRED
                };

                Some(FactRow {
                    gold_type_key,
                    date_key: date_key_for(record.update_time.date()),
                    buy_price: round2(record.buy_price),
                    sell_price: round2(record.sell_price),
                    price_difference: round2(difference),
                    price_difference_percentage: round2(percentage),
                })
            })
            .collect()
    }
}

pub(crate) fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(gold_type: &str, buy: Decimal, sell: Decimal) -> CleanPriceRecord {
        CleanPriceRecord {
            gold_type: gold_type.to_string(),
            buy_price: buy,
            sell_price: sell,
            update_time: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    fn dim(entries: &[(&str, i32)]) -> Vec<GoldTypeDimensionRow> {
        entries
            .iter()
            .map(|(gold_type, key)| GoldTypeDimensionRow {
                gold_type_key: *key,
                gold_type: (*gold_type).to_string(),
                created_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            })
            .collect()
    }

    #[test]
    fn test_derived_metrics_match_reference_values() {
        let facts = FactBuilder::build(
            &[record("SJC 1L", dec!(73_500_000), dec!(74_300_000))],
            &dim(&[("SJC 1L", 1)]),
        );

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].price_difference, dec!(800_000.00));
        assert_eq!(facts[0].price_difference_percentage, dec!(1.09));
    }

    #[test]
    fn test_zero_buy_price_guards_percentage() {
        let facts = FactBuilder::build(
            &[record("SJC 1L", dec!(0), dec!(100))],
            &dim(&[("SJC 1L", 1)]),
        );

        assert_eq!(facts[0].price_difference, dec!(100.00));
        assert_eq!(facts[0].price_difference_percentage, Decimal::ZERO);
    }

    #[test]
    fn test_date_key_comes_from_update_time() {
        let facts = FactBuilder::build(
            &[record("SJC 1L", dec!(100), dec!(110))],
            &dim(&[("SJC 1L", 1)]),
        );
        assert_eq!(facts[0].date_key, 20_240_115);
    }

    #[test]
    fn test_missing_dimension_entry_skips_row_not_batch() {
        let facts = FactBuilder::build(
            &[
                record("SJC 1L", dec!(100), dec!(110)),
                record("UNKNOWN", dec!(100), dec!(110)),
            ],
            &dim(&[("SJC 1L", 1)]),
        );

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].gold_type_key, 1);
    }

    #[test]
    fn test_rounding_is_half_to_even() {
        assert_eq!(round2(dec!(1.005)), dec!(1.00));
        assert_eq!(round2(dec!(1.015)), dec!(1.02));
        assert_eq!(round2(dec!(1.0051)), dec!(1.01));
    }

    #[test]
    fn test_negative_difference_is_preserved() {
        let facts = FactBuilder::build(
            &[record("SJC 1L", dec!(110), dec!(100))],
            &dim(&[("SJC 1L", 1)]),
        );

        assert_eq!(facts[0].price_difference, dec!(-10.00));
        assert!(facts[0].price_difference_percentage < Decimal::ZERO);
    }
}
