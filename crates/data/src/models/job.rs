//! Job bookkeeping models.
//!
//! A job run goes `RUNNING -> SUCCESS | FAILED`, exactly one terminal
//! transition per run. History is append-only; nothing here is ever
//! deleted or re-opened.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    /// Returns the string representation stored in `job_status.status`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }

    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a run in this state is finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        }
    }
}

/// One row of `job_status`: a single execution instance of a named job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRun {
    pub status_id: i64,
    pub job_id: i32,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub records_processed: Option<i64>,
    pub error_message: Option<String>,
}

impl JobRun {
    #[must_use]
    pub fn parsed_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }
}

/// One row of `logs`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub log_id: i64,
    pub job_id: i32,
    pub status_id: i64,
    pub message: String,
    pub level: String,
    pub created_at: DateTime<Utc>,
}

/// An active `job_schedule` row joined to its job name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobScheduleRow {
    pub job_name: String,
    pub schedule_type: String,
    pub schedule_time: NaiveTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [JobStatus::Running, JobStatus::Success, JobStatus::Failed] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("PAUSED"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_level_as_str() {
        assert_eq!(LogLevel::Info.as_str(), "INFO");
        assert_eq!(LogLevel::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_job_run_parsed_status() {
        let run = JobRun {
            status_id: 1,
            job_id: 1,
            status: "FAILED".to_string(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            records_processed: Some(0),
            error_message: Some("batch produced no valid records".to_string()),
        };

        assert_eq!(run.parsed_status(), Some(JobStatus::Failed));
        assert!(run.error_message.is_some());
    }
}
