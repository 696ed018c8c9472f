//! Date and gold-type dimension derivation.

use std::collections::{BTreeMap, HashSet};

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::record::CleanPriceRecord;

/// One row per distinct calendar date seen in a batch. `date_key` is both
/// the surrogate and the natural key (`YYYYMMDD`); rows are immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateDimensionRow {
    pub date_key: i32,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub quarter: u32,
}

/// One row per distinct gold type string. The key produced here is a
/// batch-local ordinal; the warehouse loader remaps it to the persisted
/// surrogate key before any fact insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldTypeDimensionRow {
    pub gold_type_key: i32,
    pub gold_type: String,
    pub created_at: NaiveDateTime,
}

/// Formats a calendar date as the 8-digit `YYYYMMDD` dimension key.
#[must_use]
pub fn date_key_for(date: NaiveDate) -> i32 {
    date.year() * 10_000 + (date.month() * 100 + date.day()) as i32
}

pub struct DimensionBuilder {
    created_at: NaiveDateTime,
}

impl Default for DimensionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DimensionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            created_at: Local::now().naive_local(),
        }
    }

    #[must_use]
    pub fn with_created_at(created_at: NaiveDateTime) -> Self {
        Self { created_at }
    }

    /// Derives both dimensions from a batch of clean records.
    ///
    /// Date rows are deduplicated by key and sorted; gold types get a
    /// 1-based surrogate in first-seen order among distinct values.
    #[must_use]
    pub fn build(
        &self,
        records: &[CleanPriceRecord],
    ) -> (Vec<DateDimensionRow>, Vec<GoldTypeDimensionRow>) {
        let mut dates: BTreeMap<i32, DateDimensionRow> = BTreeMap::new();
        let mut seen_types: HashSet<&str> = HashSet::new();
        let mut gold_types: Vec<GoldTypeDimensionRow> = Vec::new();

        for record in records {
            let date = record.update_time.date();
            dates.entry(date_key_for(date)).or_insert_with(|| DateDimensionRow {
                date_key: date_key_for(date),
                date,
                year: date.year(),
                month: date.month(),
                day: date.day(),
                quarter: (date.month() + 2) / 3,
            });

            if seen_types.insert(record.gold_type.as_str()) {
                let next_key = i32::try_from(gold_types.len() + 1).unwrap_or(i32::MAX);
                gold_types.push(GoldTypeDimensionRow {
                    gold_type_key: next_key,
                    gold_type: record.gold_type.clone(),
                    created_at: self.created_at,
                });
            }
        }

        (dates.into_values().collect(), gold_types)
    }
}
