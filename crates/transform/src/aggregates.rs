//! Daily and monthly rollups over the fact set.
//!
//! Aggregates are always recomputed from the full fact set for the grain
//! and replace the prior rows wholesale; there is no incremental delta.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dimensions::DateDimensionRow;
use crate::facts::{round2, FactRow};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregateRow {
    pub date_key: i32,
    pub avg_buy_price: Decimal,
    pub min_buy_price: Decimal,
    pub max_buy_price: Decimal,
    pub avg_sell_price: Decimal,
    pub min_sell_price: Decimal,
    pub max_sell_price: Decimal,
    pub avg_price_difference: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAggregateRow {
    pub year: i32,
    pub month: u32,
    pub avg_buy_price: Decimal,
    pub min_buy_price: Decimal,
    pub max_buy_price: Decimal,
    pub avg_sell_price: Decimal,
    pub min_sell_price: Decimal,
    pub max_sell_price: Decimal,
    pub avg_price_difference: Decimal,
}

/// Running fold over one grain's facts.
#[derive(Debug, Clone)]
struct GrainStats {
    count: u32,
    buy_sum: Decimal,
    buy_min: Decimal,
    buy_max: Decimal,
    sell_sum: Decimal,
    sell_min: Decimal,
    sell_max: Decimal,
    difference_sum: Decimal,
}

impl GrainStats {
    fn seed(fact: &FactRow) -> Self {
        Self {
            count: 1,
            buy_sum: fact.buy_price,
            buy_min: fact.buy_price,
            buy_max: fact.buy_price,
            sell_sum: fact.sell_price,
            sell_min: fact.sell_price,
            sell_max: fact.sell_price,
            difference_sum: fact.price_difference,
        }
    }

    fn fold(&mut self, fact: &FactRow) {
        self.count += 1;
        self.buy_sum += fact.buy_price;
        self.buy_min = self.buy_min.min(fact.buy_price);
        self.buy_max = self.buy_max.max(fact.buy_price);
        self.sell_sum += fact.sell_price;
        self.sell_min = self.sell_min.min(fact.sell_price);
        self.sell_max = self.sell_max.max(fact.sell_price);
        self.difference_sum += fact.price_difference;
    }

    fn avg_buy(&self) -> Decimal {
        round2(self.buy_sum / Decimal::from(self.count))
    }

    fn avg_sell(&self) -> Decimal {
        round2(self.sell_sum / Decimal::from(self.count))
    }

    fn avg_difference(&self) -> Decimal {
        round2(self.difference_sum / Decimal::from(self.count))
    }
}

pub struct AggregateBuilder;

impl AggregateBuilder {
    /// Computes per-day aggregates, sorted by date key.
    #[must_use]
    pub fn build_daily(facts: &[FactRow]) -> Vec<DailyAggregateRow> {
        let mut grains: BTreeMap<i32, GrainStats> = BTreeMap::new();
        for fact in facts {
            grains
                .entry(fact.date_key)
                .and_modify(|stats| stats.fold(fact))
                .or_insert_with(|| GrainStats::seed(fact));
        }

        grains
            .into_iter()
            .map(|(date_key, stats)| DailyAggregateRow {
                date_key,
                avg_buy_price: stats.avg_buy(),
                min_buy_price: round2(stats.buy_min),
                max_buy_price: round2(stats.buy_max),
                avg_sell_price: stats.avg_sell(),
                min_sell_price: round2(stats.sell_min),
                max_sell_price: round2(stats.sell_max),
                avg_price_difference: stats.avg_difference(),
            })
            .collect()
    }

    /// Computes per-month aggregates by joining facts to the date dimension,
    /// sorted by (year, month). Facts whose date key is absent from the
    /// dimension are skipped with a warning; this cannot happen when both
    /// were built from the same batch.
    #[must_use]
    pub fn build_monthly(
        facts: &[FactRow],
        date_dim: &[DateDimensionRow],
    ) -> Vec<MonthlyAggregateRow> {
        let months: HashMap<i32, (i32, u32)> = date_dim
            .iter()
            .map(|row| (row.date_key, (row.year, row.month)))
            .collect();

        let mut grains: BTreeMap<(i32, u32), GrainStats> = BTreeMap::new();
        for fact in facts {
            let Some(&grain) = months.get(&fact.date_key) else {
                warn!(
                    "skipping fact with date key {} missing from date dimension",
                    fact.date_key
                );
                continue;
            };
            grains
                .entry(grain)
                .and_modify(|stats| stats.fold(fact))
                .or_insert_with(|| GrainStats::seed(fact));
        }

        grains
            .into_iter()
            .map(|((year, month), stats)| MonthlyAggregateRow {
                year,
                month,
                avg_buy_price: stats.avg_buy(),
                min_buy_price: round2(stats.buy_min),
                max_buy_price: round2(stats.buy_max),
                avg_sell_price: stats.avg_sell(),
                min_sell_price: round2(stats.sell_min),
                max_sell_price: round2(stats.sell_max),
                avg_price_difference: stats.avg_difference(),
            })
            .collect()
    }
}
