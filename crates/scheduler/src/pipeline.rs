//! Pipeline stage bodies.
//!
//! Stages hand data to each other through the store: extract jobs drop
//! normalized-shape batches into the staging directory, the staging load
//! fills the staging table, the transform builds the dimensional batch,
//! and the warehouse load merges and persists it. Every stage runs under
//! the job tracker.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use gold_etl_core::{EtlError, IngestConfig};
use gold_etl_data::models::{GoldPriceRow, LogLevel};
use gold_etl_data::{IncrementalMerger, Repositories};
use gold_etl_ingest::{list_files, Collector, CsvFileCollector, JsonFileCollector};
use gold_etl_transform::{
    AggregateBuilder, CleanPriceRecord, DateDimensionRow, DimensionBuilder, FactBuilder, FactRow,
    GoldTypeDimensionRow, RawPriceRecord, RecordNormalizer,
};
use sqlx::PgPool;
use tracing::{error, warn};

use crate::tracker::{JobOutcome, JobTracker, RunHandle};

pub const JOB_EXTRACT_WEB: &str = "extract_web";
pub const JOB_EXTRACT_FILE: &str = "extract_file";
pub const JOB_LOAD_STAGING: &str = "load_staging";
pub const JOB_TRANSFORM: &str = "transform";
pub const JOB_LOAD_WAREHOUSE: &str = "load_warehouse";
pub const JOB_BUILD_DAILY_MART: &str = "build_daily_mart";
pub const JOB_BUILD_MONTHLY_MART: &str = "build_monthly_mart";

/// All pipeline jobs in dependency order. Jobs due in the same scheduler
/// tick always run in this order.
pub const PIPELINE_JOBS: &[&str] = &[
    JOB_EXTRACT_WEB,
    JOB_EXTRACT_FILE,
    JOB_LOAD_STAGING,
    JOB_TRANSFORM,
    JOB_LOAD_WAREHOUSE,
    JOB_BUILD_DAILY_MART,
    JOB_BUILD_MONTHLY_MART,
];

/// Output of one transform run, held until the next warehouse load.
#[derive(Debug, Clone)]
pub struct TransformedBatch {
    pub dates: Vec<DateDimensionRow>,
    pub gold_types: Vec<GoldTypeDimensionRow>,
    pub facts: Vec<FactRow>,
}

/// Builds the dimensional batch for a set of clean records.
#[must_use]
pub fn build_batch(records: &[CleanPriceRecord]) -> TransformedBatch {
    let (dates, gold_types) = DimensionBuilder::new().build(records);
    let facts = FactBuilder::build(records, &gold_types);
    TransformedBatch {
        dates,
        gold_types,
        facts,
    }
}

/// Staged batch files are named `staging_<tag>_<timestamp>.json`.
#[must_use]
pub fn staging_file_name(tag: &str, at: DateTime<Local>) -> String {
    format!("staging_{tag}_{}.json", at.format("%Y%m%d_%H%M%S%3f"))
}

pub struct Pipeline {
    repos: Repositories,
    merger: IncrementalMerger,
    tracker: JobTracker,
    ingest: IngestConfig,
    pending: Option<TransformedBatch>,
}

impl Pipeline {
    #[must_use]
    pub fn new(pool: PgPool, ingest: IngestConfig) -> Self {
        let repos = Repositories::new(pool.clone());
        let tracker = JobTracker::new(repos.jobs.clone());
        Self {
            repos,
            merger: IncrementalMerger::new(pool),
            tracker,
            ingest,
            pending: None,
        }
    }

    /// Runs one named job wrapped in tracker start/end. The terminal status
    /// row is written on the failure path as well; no run is ever left
    /// RUNNING.
    ///
    /// # Errors
    /// Returns the job's error after it has been recorded, so the caller
    /// can decide whether to halt (single pass) or keep ticking (scheduler).
    pub async fn run_job(&mut self, job_name: &str) -> Result<()> {
        let handle = self.tracker.start(job_name).await?;

        match self.dispatch(job_name, &handle).await {
            Ok(records_processed) => {
                self.tracker
                    .end(&handle, job_name, &JobOutcome::Success { records_processed })
                    .await?;
                Ok(())
            }
            Err(err) => {
                let outcome = JobOutcome::Failed {
                    error_message: format!("{err:#}"),
                };
                if let Err(end_err) = self.tracker.end(&handle, job_name, &outcome).await {
                    error!("failed to close job {job_name}: {end_err:#}");
                }
                Err(err)
            }
        }
    }

    /// Runs the whole pipeline once, in order, stopping at the first
    /// failure.
    ///
    /// # Errors
    /// Returns the first failing job's error.
    pub async fn run_full(&mut self) -> Result<()> {
        for job_name in PIPELINE_JOBS {
            self.run_job(job_name).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, job_name: &str, handle: &RunHandle) -> Result<i64> {
        match job_name {
            JOB_EXTRACT_WEB => self.extract(handle, "web", "json").await,
            JOB_EXTRACT_FILE => self.extract(handle, "file", "csv").await,
            JOB_LOAD_STAGING => self.load_staging(handle).await,
            JOB_TRANSFORM => self.transform(handle).await,
            JOB_LOAD_WAREHOUSE => self.load_warehouse(handle).await,
            JOB_BUILD_DAILY_MART => self.build_daily_mart(handle).await,
            JOB_BUILD_MONTHLY_MART => self.build_monthly_mart(handle).await,
            other => anyhow::bail!("unknown job {other}"),
        }
    }

    /// Sweeps the data directory for dropped source files of one format and
    /// stages their raw records as a single batch file. The web scraper is
    /// an external collaborator; its JSON drops are picked up here.
    async fn extract(&self, handle: &RunHandle, tag: &str, extension: &str) -> Result<i64> {
        let data_dir = self.data_dir();
        let files = list_files(&data_dir, extension)?;
        if files.is_empty() {
            self.tracker
                .log(handle, &format!("No {extension} drops found"), LogLevel::Info)
                .await?;
            return Ok(0);
        }

        let mut records: Vec<RawPriceRecord> = Vec::new();
        for path in &files {
            let collected = if extension == "csv" {
                CsvFileCollector::new(path).collect()
            } else {
                JsonFileCollector::new(path).collect()
            };
            match collected {
                Ok(mut found) => {
                    self.tracker
                        .log(
                            handle,
                            &format!("Collected {} records from {}", found.len(), path.display()),
                            LogLevel::Info,
                        )
                        .await?;
                    records.append(&mut found);
                }
                Err(err) => warn!("skipping {}: {err:#}", path.display()),
            }
        }
        for path in &files {
            self.archive(path);
        }

        if records.is_empty() {
            return Err(EtlError::NoValidData.into());
        }

        let staged = self.write_staging_file(tag, &records)?;
        self.tracker
            .log(
                handle,
                &format!("Staged {} records to {}", records.len(), staged.display()),
                LogLevel::Info,
            )
            .await?;
        Ok(i64::try_from(records.len())?)
    }

    /// Loads every staged batch file into the staging table, replacing its
    /// previous contents.
    async fn load_staging(&self, handle: &RunHandle) -> Result<i64> {
        let staging_dir = self.staging_dir();
        let files = list_files(&staging_dir, "json")?;
        if files.is_empty() {
            self.tracker
                .log(handle, "No staged batches to load", LogLevel::Info)
                .await?;
            return Ok(0);
        }

        let mut raws: Vec<RawPriceRecord> = Vec::new();
        for path in &files {
            match JsonFileCollector::new(path).collect() {
                Ok(mut found) => raws.append(&mut found),
                Err(err) => warn!("skipping {}: {err:#}", path.display()),
            }
        }
        // Archive before validation so a poison batch cannot wedge the job
        // into failing on the same files forever.
        for path in &files {
            self.archive(path);
        }

        let clean = RecordNormalizer::new().normalize_batch(&raws)?;
        let inserted = self.repos.staging.replace_all(&clean).await?;
        self.tracker
            .log(
                handle,
                &format!("Loaded {inserted} records to staging"),
                LogLevel::Info,
            )
            .await?;
        Ok(i64::try_from(inserted)?)
    }

    /// Builds dimensions and facts from the staged rows and keeps them for
    /// the next warehouse load.
    async fn transform(&mut self, handle: &RunHandle) -> Result<i64> {
        let rows = self.repos.staging.fetch_all().await?;
        if rows.is_empty() {
            self.pending = None;
            self.tracker
                .log(handle, "No data in staging", LogLevel::Info)
                .await?;
            return Ok(0);
        }

        let records: Vec<CleanPriceRecord> = rows.iter().map(GoldPriceRow::to_clean).collect();
        let batch = build_batch(&records);
        self.tracker
            .log(
                handle,
                &format!(
                    "Transformation completed, {} records, {} dates, {} gold types",
                    records.len(),
                    batch.dates.len(),
                    batch.gold_types.len()
                ),
                LogLevel::Info,
            )
            .await?;

        let count = i64::try_from(records.len())?;
        self.pending = Some(batch);
        Ok(count)
    }

    /// Merges staging into canonical and persists the pending dimensional
    /// batch, remapping batch-local gold type keys to their warehouse
    /// values before the fact insert.
    async fn load_warehouse(&mut self, handle: &RunHandle) -> Result<i64> {
        // If the transform stage has not run since the last load (they are
        // scheduled independently), build the batch from staging now,
        // before the merge truncates it.
        let batch = match self.pending.take() {
            Some(batch) => Some(batch),
            None => {
                let rows = self.repos.staging.fetch_all().await?;
                if rows.is_empty() {
                    None
                } else {
                    let records: Vec<CleanPriceRecord> =
                        rows.iter().map(GoldPriceRow::to_clean).collect();
                    Some(build_batch(&records))
                }
            }
        };

        let outcome = self.merger.merge().await?;
        self.tracker
            .log(
                handle,
                &format!("Merge complete, {} new canonical rows", outcome.new_rows()),
                LogLevel::Info,
            )
            .await?;

        let Some(batch) = batch else {
            return Ok(0);
        };

        self.repos.warehouse.upsert_dates(&batch.dates).await?;
        let key_map = self
            .repos
            .warehouse
            .upsert_gold_types(&batch.gold_types)
            .await?;
        let facts_inserted = self
            .repos
            .warehouse
            .insert_facts(&batch.facts, &key_map)
            .await?;
        self.tracker
            .log(
                handle,
                &format!("Warehouse load completed, {facts_inserted} facts inserted"),
                LogLevel::Info,
            )
            .await?;
        Ok(i64::try_from(facts_inserted)?)
    }

    /// Rebuilds the daily aggregate mart from the full fact set.
    async fn build_daily_mart(&self, handle: &RunHandle) -> Result<i64> {
        let facts = self.repos.warehouse.fetch_facts().await?;
        let rows = AggregateBuilder::build_daily(&facts);
        self.repos.warehouse.replace_daily_aggregates(&rows).await?;
        self.tracker
            .log(
                handle,
                &format!("Daily mart rebuilt, {} grains", rows.len()),
                LogLevel::Info,
            )
            .await?;
        Ok(i64::try_from(rows.len())?)
    }

    /// Rebuilds the monthly aggregate mart from the full fact set joined to
    /// the date dimension.
    async fn build_monthly_mart(&self, handle: &RunHandle) -> Result<i64> {
        let facts = self.repos.warehouse.fetch_facts().await?;
        let date_dim = self.repos.warehouse.fetch_date_dimension().await?;
        let rows = AggregateBuilder::build_monthly(&facts, &date_dim);
        self.repos
            .warehouse
            .replace_monthly_aggregates(&rows)
            .await?;
        self.tracker
            .log(
                handle,
                &format!("Monthly mart rebuilt, {} grains", rows.len()),
                LogLevel::Info,
            )
            .await?;
        Ok(i64::try_from(rows.len())?)
    }

    fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.ingest.data_dir)
    }

    fn staging_dir(&self) -> PathBuf {
        self.data_dir().join("staging")
    }

    fn processed_dir(&self) -> PathBuf {
        self.data_dir().join("processed")
    }

    fn write_staging_file(&self, tag: &str, records: &[RawPriceRecord]) -> Result<PathBuf> {
        let staging_dir = self.staging_dir();
        std::fs::create_dir_all(&staging_dir)
            .with_context(|| format!("Failed to create {}", staging_dir.display()))?;

        let path = staging_dir.join(staging_file_name(tag, Local::now()));
        let body = serde_json::to_vec_pretty(records).context("Failed to serialize batch")?;
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    fn archive(&self, path: &Path) {
        let processed = self.processed_dir();
        if let Err(err) = std::fs::create_dir_all(&processed) {
            warn!("failed to create {}: {err}", processed.display());
            return;
        }
        let Some(name) = path.file_name() else {
            return;
        };
        if let Err(err) = std::fs::rename(path, processed.join(name)) {
            warn!("failed to archive {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn record(gold_type: &str, day: u32) -> CleanPriceRecord {
        CleanPriceRecord {
            gold_type: gold_type.to_string(),
            buy_price: dec!(100),
            sell_price: dec!(110),
            update_time: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_pipeline_order_matches_dependencies() {
        assert_eq!(
            PIPELINE_JOBS,
            &[
                "extract_web",
                "extract_file",
                "load_staging",
                "transform",
                "load_warehouse",
                "build_daily_mart",
                "build_monthly_mart",
            ]
        );
    }

    #[test]
    fn test_build_batch_is_internally_consistent() {
        let records = vec![
            record("SJC 1L", 15),
            record("PNJ 24K", 15),
            record("SJC 1L", 16),
        ];

        let batch = build_batch(&records);
        assert_eq!(batch.dates.len(), 2);
        assert_eq!(batch.gold_types.len(), 2);
        assert_eq!(batch.facts.len(), 3);

        // Every fact resolves against the batch dimensions.
        for fact in &batch.facts {
            assert!(batch.dates.iter().any(|d| d.date_key == fact.date_key));
            assert!(batch
                .gold_types
                .iter()
                .any(|g| g.gold_type_key == fact.gold_type_key));
        }
    }

    #[test]
    fn test_staging_file_name_format() {
        let at = Local.with_ymd_and_hms(2024, 1, 15, 9, 30, 5).unwrap();
        let name = staging_file_name("web", at);
        assert!(name.starts_with("staging_web_20240115_093005"));
        assert!(name.ends_with(".json"));
    }
}
