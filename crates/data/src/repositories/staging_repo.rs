//! Staging table repository.
//!
//! The staging table holds the latest normalized batch pending
//! reconciliation into the canonical table; loading it is always a full
//! replacement of its previous contents.

use anyhow::{Context, Result};
use gold_etl_transform::CleanPriceRecord;
use sqlx::PgPool;

use crate::models::GoldPriceRow;

#[derive(Debug, Clone)]
pub struct StagingRepository {
    pool: PgPool,
}

impl StagingRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Replaces the staging table's contents with the given batch.
    ///
    /// Truncate and reinsert happen in one transaction, so readers never
    /// observe a half-loaded staging table.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; the previous contents are
    /// kept in that case.
    pub async fn replace_all(&self, records: &[CleanPriceRecord]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin staging transaction")?;

        sqlx::query("TRUNCATE TABLE gold_prices_staging")
            .execute(&mut *tx)
            .await
            .context("Failed to truncate staging table")?;

        let mut inserted = 0u64;
        for chunk in records.chunks(100) {
            for record in chunk {
                let result = sqlx::query(
                    r"
                    INSERT INTO gold_prices_staging (gold_type, buy_price, sell_price, update_time)
                    VALUES ($1, $2, $3, $4)
                    ",
                )
                .bind(&record.gold_type)
                .bind(record.buy_price)
                .bind(record.sell_price)
                .bind(record.update_time)
                .execute(&mut *tx)
                .await
                .context("Failed to insert staging record")?;

                inserted += result.rows_affected();
            }
        }

        tx.commit()
            .await
            .context("Failed to commit staging transaction")?;
        Ok(inserted)
    }

    /// Fetches the full staging contents in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn fetch_all(&self) -> Result<Vec<GoldPriceRow>> {
        let rows = sqlx::query_as::<_, GoldPriceRow>(
            r"
            SELECT gold_id, gold_type, buy_price, sell_price, update_time
            FROM gold_prices_staging
            ORDER BY gold_id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch staging rows")?;

        Ok(rows)
    }

    /// Counts the rows currently staged.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gold_prices_staging")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count staging rows")?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use gold_etl_transform::CleanPriceRecord;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn record(i: u32) -> CleanPriceRecord {
        CleanPriceRecord {
            gold_type: format!("type-{i}"),
            buy_price: dec!(100),
            sell_price: dec!(110),
            update_time: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_batch_chunking() {
        let records: Vec<CleanPriceRecord> = (0..250).map(record).collect();

        let chunks: Vec<_> = records.chunks(100).collect();
        assert_eq!(chunks.len(), 3); // 100 + 100 + 50
        assert_eq!(chunks[2].len(), 50);
    }

    // Insert/fetch round trips require a live database; the staging load is
    // exercised end-to-end by the pipeline against a provisioned warehouse.
}
