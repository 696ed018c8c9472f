//! Error taxonomy for the ETL pipeline.
//!
//! Per-row problems stay inside the transform engine as rejects; everything
//! that can abort a job is one of these variants. The scheduler never sees a
//! row-level error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// A malformed field that invalidated a whole operation (row-level
    /// rejects are handled inside the normalizer and never surface here).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The batch produced zero accepted records.
    #[error("batch produced no valid records")]
    NoValidData,

    /// Connection or lock failure talking to the store; eligible for retry.
    #[error("transient store failure: {0}")]
    TransientStore(String),

    /// Required columns missing from an input batch; fatal, never retried.
    #[error("schema mismatch: {0}")]
    Schema(String),

    /// Unexpected state during the backup/swap phase of a merge.
    #[error("merge integrity violation: {0}")]
    MergeIntegrity(String),
}

impl EtlError {
    /// Whether a retry could plausibly change the outcome.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}
