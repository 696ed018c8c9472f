//! Warehouse repository: dimensions, facts, and aggregate marts.
//!
//! Dimension writes follow a lookup-or-insert discipline; surrogate keys
//! are assigned once per natural key and never renumbered. Batch-local
//! gold type keys are remapped to their persisted values before any fact
//! insert, and the remapping is total: an unmapped key aborts the load.

use std::collections::HashMap;

use anyhow::{Context, Result};
use gold_etl_core::EtlError;
use gold_etl_transform::{
    DailyAggregateRow, DateDimensionRow, FactRow, GoldTypeDimensionRow, MonthlyAggregateRow,
};
use rust_decimal::Decimal;
use sqlx::PgPool;

/// Batch-local gold type key -> persisted warehouse key.
pub type KeyMap = HashMap<i32, i32>;

#[derive(Debug, Clone)]
pub struct WarehouseRepository {
    pool: PgPool,
}

impl WarehouseRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts date dimension rows that are not present yet. Existing rows
    /// are immutable and left untouched.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_dates(&self, rows: &[DateDimensionRow]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin date dimension transaction")?;
        let mut inserted = 0u64;

        for row in rows {
            let result = sqlx::query(
                r"
                INSERT INTO dim_date (date_key, date, year, month, day, quarter)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (date_key) DO NOTHING
                ",
            )
            .bind(row.date_key)
            .bind(row.date)
            .bind(row.year)
            .bind(i32::try_from(row.month)?)
            .bind(i32::try_from(row.day)?)
            .bind(i32::try_from(row.quarter)?)
            .execute(&mut *tx)
            .await
            .context("Failed to insert date dimension row")?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit date dimension transaction")?;
        Ok(inserted)
    }

    /// Looks up or inserts each gold type and returns the mapping from the
    /// batch-local surrogate key to the persisted one.
    ///
    /// # Errors
    /// Returns an error if the transaction fails or a persisted key cannot
    /// be read back.
    pub async fn upsert_gold_types(&self, rows: &[GoldTypeDimensionRow]) -> Result<KeyMap> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin gold type dimension transaction")?;
        let mut key_map = KeyMap::new();

        for row in rows {
            sqlx::query(
                r"
                INSERT INTO dim_gold_type (gold_type, created_at)
                VALUES ($1, $2)
                ON CONFLICT (gold_type) DO NOTHING
                ",
            )
            .bind(&row.gold_type)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert gold type dimension row")?;

            let (persisted_key,): (i32,) = sqlx::query_as(
                "SELECT gold_type_key FROM dim_gold_type WHERE gold_type = $1",
            )
            .bind(&row.gold_type)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to resolve key for gold type {:?}", row.gold_type))?;

            key_map.insert(row.gold_type_key, persisted_key);
        }

        tx.commit()
            .await
            .context("Failed to commit gold type dimension transaction")?;
        Ok(key_map)
    }

    /// Inserts fact rows, rewriting each batch-local gold type key through
    /// `key_map`.
    ///
    /// # Errors
    /// Returns [`EtlError::MergeIntegrity`] if a fact references a batch key
    /// with no persisted mapping; no facts are inserted in that case.
    pub async fn insert_facts(&self, facts: &[FactRow], key_map: &KeyMap) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin fact transaction")?;
        let mut inserted = 0u64;

        for fact in facts {
            let persisted_key = key_map.get(&fact.gold_type_key).ok_or_else(|| {
                EtlError::MergeIntegrity(format!(
                    "fact references unmapped gold type key {}",
                    fact.gold_type_key
                ))
            })?;

            let result = sqlx::query(
                r"
                INSERT INTO fact_gold_prices
                (gold_type_key, date_key, buy_price, sell_price, price_difference, price_difference_percentage)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(*persisted_key)
            .bind(fact.date_key)
            .bind(fact.buy_price)
            .bind(fact.sell_price)
            .bind(fact.price_difference)
            .bind(fact.price_difference_percentage)
            .execute(&mut *tx)
            .await
            .context("Failed to insert fact row")?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit fact transaction")?;
        Ok(inserted)
    }

    /// Fetches the full fact set.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn fetch_facts(&self) -> Result<Vec<FactRow>> {
        let rows: Vec<(i32, i32, Decimal, Decimal, Decimal, Decimal)> = sqlx::query_as(
            r"
            SELECT gold_type_key, date_key, buy_price, sell_price,
                   price_difference, price_difference_percentage
            FROM fact_gold_prices
            ORDER BY fact_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch fact rows")?;

        Ok(rows
            .into_iter()
            .map(
                |(gold_type_key, date_key, buy, sell, difference, percentage)| FactRow {
                    gold_type_key,
                    date_key,
                    buy_price: buy,
                    sell_price: sell,
                    price_difference: difference,
                    price_difference_percentage: percentage,
                },
            )
            .collect())
    }

    /// Fetches the date dimension.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored month/day/quarter is
    /// out of range.
    pub async fn fetch_date_dimension(&self) -> Result<Vec<DateDimensionRow>> {
        let rows: Vec<(i32, chrono::NaiveDate, i32, i32, i32, i32)> = sqlx::query_as(
            r"
            SELECT date_key, date, year, month, day, quarter
            FROM dim_date
            ORDER BY date_key ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch date dimension")?;

        rows.into_iter()
            .map(|(date_key, date, year, month, day, quarter)| {
                Ok(DateDimensionRow {
                    date_key,
                    date,
                    year,
                    month: u32::try_from(month)?,
                    day: u32::try_from(day)?,
                    quarter: u32::try_from(quarter)?,
                })
            })
            .collect()
    }

    /// Replaces the daily aggregate mart with the given rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; the previous mart is kept.
    pub async fn replace_daily_aggregates(&self, rows: &[DailyAggregateRow]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin daily mart transaction")?;

        sqlx::query("TRUNCATE TABLE agg_daily_gold_prices")
            .execute(&mut *tx)
            .await
            .context("Failed to truncate daily mart")?;

        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r"
                INSERT INTO agg_daily_gold_prices
                (date_key, avg_buy_price, min_buy_price, max_buy_price,
                 avg_sell_price, min_sell_price, max_sell_price, avg_price_difference)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(row.date_key)
            .bind(row.avg_buy_price)
            .bind(row.min_buy_price)
            .bind(row.max_buy_price)
            .bind(row.avg_sell_price)
            .bind(row.min_sell_price)
            .bind(row.max_sell_price)
            .bind(row.avg_price_difference)
            .execute(&mut *tx)
            .await
            .context("Failed to insert daily aggregate row")?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit daily mart transaction")?;
        Ok(inserted)
    }

    /// Replaces the monthly aggregate mart with the given rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; the previous mart is kept.
    pub async fn replace_monthly_aggregates(&self, rows: &[MonthlyAggregateRow]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin monthly mart transaction")?;

        sqlx::query("TRUNCATE TABLE agg_monthly_gold_prices")
            .execute(&mut *tx)
            .await
            .context("Failed to truncate monthly mart")?;

        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r"
                INSERT INTO agg_monthly_gold_prices
                (year, month, avg_buy_price, min_buy_price, max_buy_price,
                 avg_sell_price, min_sell_price, max_sell_price, avg_price_difference)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ",
            )
            .bind(row.year)
            .bind(i32::try_from(row.month)?)
            .bind(row.avg_buy_price)
            .bind(row.min_buy_price)
            .bind(row.max_buy_price)
            .bind(row.avg_sell_price)
            .bind(row.min_sell_price)
            .bind(row.max_sell_price)
            .bind(row.avg_price_difference)
            .execute(&mut *tx)
            .await
            .context("Failed to insert monthly aggregate row")?;

            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .context("Failed to commit monthly mart transaction")?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_map_remapping_is_total() {
        // The remapping contract: every batch key must resolve or the load
        // aborts. Exercised here at the map level; the repository raises
        // MergeIntegrity on the same condition.
        let mut key_map = KeyMap::new();
        key_map.insert(1, 41);
        key_map.insert(2, 7);

        assert_eq!(key_map.get(&1), Some(&41));
        assert_eq!(key_map.get(&2), Some(&7));
        assert_eq!(key_map.get(&3), None);
    }

    #[test]
    fn test_unmapped_key_produces_integrity_error() {
        let key_map = KeyMap::new();
        let missing = key_map.get(&9).ok_or_else(|| {
            EtlError::MergeIntegrity("fact references unmapped gold type key 9".to_string())
        });

        let err = missing.unwrap_err();
        assert!(err.to_string().contains("unmapped gold type key"));
        assert!(!err.is_transient());
    }
}
