//! Transform engine for the gold price warehouse.
//!
//! This crate is pure computation: it turns raw heterogeneous records into a
//! consistent dimensional model with derived metrics. No I/O happens here;
//! repositories in `gold-etl-data` persist what these builders produce.
//!
//! All monetary fields use `rust_decimal::Decimal` for financial precision.

pub mod aggregates;
pub mod dimensions;
pub mod facts;
pub mod normalizer;
pub mod record;

pub use aggregates::{AggregateBuilder, DailyAggregateRow, MonthlyAggregateRow};
pub use dimensions::{date_key_for, DateDimensionRow, DimensionBuilder, GoldTypeDimensionRow};
pub use facts::{FactBuilder, FactRow};
pub use normalizer::{RecordNormalizer, RejectReason};
pub use record::{CleanPriceRecord, RawPriceRecord};
