//! Job run tracking.
//!
//! Every pipeline stage invocation is wrapped in `start`/`end`: one
//! RUNNING row at start, exactly one terminal mutation at end, log entries
//! in between. Callers must reach `end` from their failure path too; the
//! pipeline guarantees that by funneling every stage through
//! [`Pipeline::run_job`](crate::pipeline::Pipeline::run_job).

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use gold_etl_core::RetryPolicy;
use gold_etl_data::models::{JobStatus, LogLevel};
use gold_etl_data::JobRepository;
use tracing::error;

/// Opaque handle for one tracked run.
#[derive(Debug, Clone, Copy)]
pub struct RunHandle {
    pub job_id: i32,
    pub status_id: i64,
}

/// Terminal outcome of a tracked run.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Success { records_processed: i64 },
    Failed { error_message: String },
}

impl JobOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn status(&self) -> JobStatus {
        match self {
            Self::Success { .. } => JobStatus::Success,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }

    fn records_processed(&self) -> i64 {
        match self {
            Self::Success { records_processed } => *records_processed,
            Self::Failed { .. } => 0,
        }
    }

    fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failed { error_message } => Some(error_message),
        }
    }

    fn completion_message(&self, job_name: &str) -> String {
        match self {
            Self::Success { .. } => format!("Job completed: {job_name}"),
            Self::Failed { error_message } => {
                format!("Job failed: {job_name} - {error_message}")
            }
        }
    }

    fn notification_message(&self, job_name: &str) -> String {
        match self {
            Self::Success { .. } => format!("Job {job_name} - Success"),
            Self::Failed { error_message } => {
                format!("Job {job_name} - Failed: {error_message}")
            }
        }
    }
}

pub struct JobTracker {
    jobs: JobRepository,
    log_retry: RetryPolicy,
}

impl JobTracker {
    #[must_use]
    pub fn new(jobs: JobRepository) -> Self {
        Self {
            jobs,
            log_retry: RetryPolicy::new(3, Duration::from_secs(2)),
        }
    }

    /// Opens a run: RUNNING status row plus the starting log entry.
    ///
    /// # Errors
    /// Returns an error if the control tables cannot be written.
    pub async fn start(&self, job_name: &str) -> Result<RunHandle> {
        let (job_id, status_id) = self.jobs.start(job_name).await?;
        Ok(RunHandle { job_id, status_id })
    }

    /// Appends a log entry to a running job, retrying transient store
    /// failures.
    ///
    /// # Errors
    /// Returns an error once retries are exhausted.
    pub async fn log(&self, handle: &RunHandle, message: &str, level: LogLevel) -> Result<()> {
        self.log_retry
            .run("write job log", || {
                self.jobs
                    .insert_log(handle.job_id, handle.status_id, message, level)
            })
            .await
    }

    /// Closes a run: the terminal status mutation, the completion log
    /// entry, and one queued notification per matching recipient.
    ///
    /// Must be called exactly once per `start`, from the failure path as
    /// well as the success path.
    ///
    /// # Errors
    /// Returns an error if the terminal update fails. A failed notification
    /// insert is logged and swallowed; it must not overwrite the job's own
    /// outcome.
    pub async fn end(&self, handle: &RunHandle, job_name: &str, outcome: &JobOutcome) -> Result<()> {
        self.jobs
            .end(
                handle.status_id,
                outcome.status(),
                Utc::now(),
                outcome.records_processed(),
                outcome.error_message(),
            )
            .await?;

        let level = if outcome.is_success() {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        self.log(handle, &outcome.completion_message(job_name), level)
            .await?;

        if let Err(err) = self.queue_notifications(handle, job_name, outcome).await {
            error!("failed to queue notifications for {job_name}: {err:#}");
        }
        Ok(())
    }

    async fn queue_notifications(
        &self,
        handle: &RunHandle,
        job_name: &str,
        outcome: &JobOutcome,
    ) -> Result<()> {
        let configs = self.jobs.notification_configs(handle.job_id).await?;
        let message = outcome.notification_message(job_name);

        for config in configs {
            if !config.matches(outcome.is_success()) {
                continue;
            }
            self.jobs
                .insert_notification(
                    handle.job_id,
                    handle.status_id,
                    &config.notification_type,
                    &config.email_recipient,
                    &message,
                )
                .await?;
        }
        Ok(())
    }
}
