//! Control-table repository: jobs, runs, logs, schedules, notifications.
//!
//! Rows written here are append-only history. The only mutation ever
//! issued is the single terminal update of a `job_status` row.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::database::classify_store_error;
use crate::models::{JobRun, JobScheduleRow, JobStatus, LogLevel, NotificationConfigRow};

#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves a job name to its id, registering the job if it is new.
    ///
    /// # Errors
    /// Returns an error if the lookup or insert fails.
    pub async fn job_id(&self, job_name: &str) -> Result<i32> {
        let existing: Option<(i32,)> =
            sqlx::query_as("SELECT job_id FROM etl_jobs WHERE job_name = $1")
                .bind(job_name)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to look up job {job_name}"))?;

        if let Some((job_id,)) = existing {
            return Ok(job_id);
        }

        let (job_id,): (i32,) = sqlx::query_as(
            r"
            INSERT INTO etl_jobs (job_name, is_active)
            VALUES ($1, TRUE)
            RETURNING job_id
            ",
        )
        .bind(job_name)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to register job {job_name}"))?;

        Ok(job_id)
    }

    /// Opens a run for the named job: inserts a RUNNING `job_status` row and
    /// its starting log entry. Returns `(job_id, status_id)`.
    ///
    /// # Errors
    /// Returns an error if the inserts fail.
    pub async fn start(&self, job_name: &str) -> Result<(i32, i64)> {
        let job_id = self.job_id(job_name).await?;

        let (status_id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO job_status (job_id, status, start_time)
            VALUES ($1, $2, $3)
            RETURNING status_id
            ",
        )
        .bind(job_id)
        .bind(JobStatus::Running.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to open run for job {job_name}"))?;

        self.insert_log(
            job_id,
            status_id,
            &format!("Starting job: {job_name}"),
            LogLevel::Info,
        )
        .await?;

        Ok((job_id, status_id))
    }

    /// Appends a log entry for a run.
    ///
    /// # Errors
    /// Returns an error if the insert fails; connection-level failures are
    /// classified as transient so callers can retry.
    pub async fn insert_log(
        &self,
        job_id: i32,
        status_id: i64,
        message: &str,
        level: LogLevel,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO logs (job_id, status_id, message, level, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(job_id)
        .bind(status_id)
        .bind(message)
        .bind(level.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| classify_store_error(err, "insert log entry"))?;

        Ok(())
    }

    /// Writes the single terminal update for a run.
    ///
    /// # Errors
    /// Returns an error if the update fails or no row matched the id.
    pub async fn end(
        &self,
        status_id: i64,
        status: JobStatus,
        end_time: DateTime<Utc>,
        records_processed: i64,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE job_status
            SET status = $1, end_time = $2, records_processed = $3, error_message = $4
            WHERE status_id = $5
            ",
        )
        .bind(status.as_str())
        .bind(end_time)
        .bind(records_processed)
        .bind(error_message)
        .bind(status_id)
        .execute(&self.pool)
        .await
        .context("Failed to close job run")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("job run {status_id} not found while closing");
        }
        Ok(())
    }

    /// Fetches the notification recipients configured for a job.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn notification_configs(&self, job_id: i32) -> Result<Vec<NotificationConfigRow>> {
        let rows = sqlx::query_as::<_, NotificationConfigRow>(
            r"
            SELECT config_id, job_id, notification_type, email_recipient,
                   notify_on_success, notify_on_failure
            FROM notification_config
            WHERE job_id = $1
            ",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch notification configs")?;

        Ok(rows)
    }

    /// Queues one outbound notification row for the notification service.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_notification(
        &self,
        job_id: i32,
        status_id: i64,
        notification_type: &str,
        recipient: &str,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO job_notifications
            (job_id, status_id, notification_type, recipient, message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(job_id)
        .bind(status_id)
        .bind(notification_type)
        .bind(recipient)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to insert job notification")?;

        Ok(())
    }

    /// Fetches active schedules joined to their job names.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn active_schedules(&self) -> Result<Vec<JobScheduleRow>> {
        let rows = sqlx::query_as::<_, JobScheduleRow>(
            r"
            SELECT j.job_name, s.schedule_type, s.schedule_time
            FROM job_schedule s
            JOIN etl_jobs j ON s.job_id = j.job_id
            WHERE s.is_active = TRUE AND j.is_active = TRUE
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch job schedules")?;

        Ok(rows)
    }

    /// Fetches the most recent runs of a job, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recent_runs(&self, job_name: &str, limit: i64) -> Result<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRun>(
            r"
            SELECT s.status_id, s.job_id, s.status, s.start_time, s.end_time,
                   s.records_processed, s.error_message
            FROM job_status s
            JOIN etl_jobs j ON s.job_id = j.job_id
            WHERE j.job_name = $1
            ORDER BY s.status_id DESC
            LIMIT $2
            ",
        )
        .bind(job_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch job runs")?;

        Ok(rows)
    }
}
