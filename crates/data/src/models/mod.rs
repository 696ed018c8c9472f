//! Persisted row models.
//!
//! All monetary fields use `rust_decimal::Decimal`; rows that come back
//! from the database derive `sqlx::FromRow`.

pub mod job;
pub mod notification;
pub mod price;

pub use job::{JobRun, JobScheduleRow, JobStatus, LogEntry, LogLevel};
pub use notification::NotificationConfigRow;
pub use price::GoldPriceRow;
