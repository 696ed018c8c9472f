//! Warehouse storage for the gold price pipeline.
//!
//! This crate provides:
//! - Database client for `PostgreSQL`
//! - Idempotent schema bootstrap for the staging, warehouse, and control tables
//! - Typed repositories for staging, warehouse, and job bookkeeping
//! - The incremental staging-to-canonical merge

pub mod database;
pub mod merge;
pub mod models;
pub mod repositories;
pub mod schema;

// Re-export commonly used types
pub use database::DatabaseClient;
pub use merge::{IncrementalMerger, MergeOutcome};

// Re-export models
pub use models::{
    GoldPriceRow, JobRun, JobScheduleRow, JobStatus, LogEntry, LogLevel, NotificationConfigRow,
};

// Re-export repositories
pub use repositories::{
    JobRepository, KeyMap, Repositories, StagingRepository, WarehouseRepository,
};
