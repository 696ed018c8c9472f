use chrono::NaiveDateTime;
use gold_etl_transform::CleanPriceRecord;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One persisted price observation, as stored in both the staging and the
/// canonical table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GoldPriceRow {
    pub gold_id: i64,
    pub gold_type: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub update_time: NaiveDateTime,
}

impl GoldPriceRow {
    /// Drops the storage key, returning the canonical record shape the
    /// transform engine consumes.
    #[must_use]
    pub fn to_clean(&self) -> CleanPriceRecord {
        CleanPriceRecord {
            gold_type: self.gold_type.clone(),
            buy_price: self.buy_price,
            sell_price: self.sell_price,
            update_time: self.update_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_clean_preserves_values() {
        let row = GoldPriceRow {
            gold_id: 7,
            gold_type: "SJC 1L".to_string(),
            buy_price: dec!(73_500_000),
            sell_price: dec!(74_300_000),
            update_time: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        };

        let clean = row.to_clean();
        assert_eq!(clean.gold_type, "SJC 1L");
        assert_eq!(clean.buy_price, dec!(73_500_000));
        assert_eq!(clean.sell_price, dec!(74_300_000));
        assert_eq!(clean.update_time, row.update_time);
    }
}
