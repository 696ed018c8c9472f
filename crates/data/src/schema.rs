//! Idempotent schema bootstrap.
//!
//! Tables are created on startup the same way the pipeline would find them
//! in a provisioned warehouse; re-running is a no-op. Backup tables are
//! created by the merge as needed and are not part of this set.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

const SCHEMA_STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS gold_prices (
        gold_id BIGSERIAL PRIMARY KEY,
        gold_type TEXT NOT NULL,
        buy_price NUMERIC NOT NULL,
        sell_price NUMERIC NOT NULL,
        update_time TIMESTAMP NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS gold_prices_staging (
        gold_id BIGSERIAL PRIMARY KEY,
        gold_type TEXT NOT NULL,
        buy_price NUMERIC NOT NULL,
        sell_price NUMERIC NOT NULL,
        update_time TIMESTAMP NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS dim_date (
        date_key INT PRIMARY KEY,
        date DATE NOT NULL,
        year INT NOT NULL,
        month INT NOT NULL,
        day INT NOT NULL,
        quarter INT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS dim_gold_type (
        gold_type_key SERIAL PRIMARY KEY,
        gold_type TEXT NOT NULL UNIQUE,
        created_at TIMESTAMP NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS fact_gold_prices (
        fact_id BIGSERIAL PRIMARY KEY,
        gold_type_key INT NOT NULL REFERENCES dim_gold_type (gold_type_key),
        date_key INT NOT NULL REFERENCES dim_date (date_key),
        buy_price NUMERIC NOT NULL,
        sell_price NUMERIC NOT NULL,
        price_difference NUMERIC NOT NULL,
        price_difference_percentage NUMERIC NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS agg_daily_gold_prices (
        date_key INT PRIMARY KEY,
        avg_buy_price NUMERIC NOT NULL,
        min_buy_price NUMERIC NOT NULL,
        max_buy_price NUMERIC NOT NULL,
        avg_sell_price NUMERIC NOT NULL,
        min_sell_price NUMERIC NOT NULL,
        max_sell_price NUMERIC NOT NULL,
        avg_price_difference NUMERIC NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS agg_monthly_gold_prices (
        year INT NOT NULL,
        month INT NOT NULL,
        avg_buy_price NUMERIC NOT NULL,
        min_buy_price NUMERIC NOT NULL,
        max_buy_price NUMERIC NOT NULL,
        avg_sell_price NUMERIC NOT NULL,
        min_sell_price NUMERIC NOT NULL,
        max_sell_price NUMERIC NOT NULL,
        avg_price_difference NUMERIC NOT NULL,
        PRIMARY KEY (year, month)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS etl_jobs (
        job_id SERIAL PRIMARY KEY,
        job_name TEXT NOT NULL UNIQUE,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS job_status (
        status_id BIGSERIAL PRIMARY KEY,
        job_id INT NOT NULL REFERENCES etl_jobs (job_id),
        status TEXT NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ,
        records_processed BIGINT,
        error_message TEXT
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS logs (
        log_id BIGSERIAL PRIMARY KEY,
        job_id INT NOT NULL,
        status_id BIGINT NOT NULL,
        message TEXT NOT NULL,
        level TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS job_schedule (
        schedule_id SERIAL PRIMARY KEY,
        job_id INT NOT NULL REFERENCES etl_jobs (job_id),
        schedule_type TEXT NOT NULL,
        schedule_time TIME NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS notification_config (
        config_id SERIAL PRIMARY KEY,
        job_id INT NOT NULL REFERENCES etl_jobs (job_id),
        notification_type TEXT NOT NULL,
        email_recipient TEXT NOT NULL,
        notify_on_success BOOLEAN NOT NULL DEFAULT FALSE,
        notify_on_failure BOOLEAN NOT NULL DEFAULT TRUE
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS job_notifications (
        notification_id BIGSERIAL PRIMARY KEY,
        job_id INT NOT NULL,
        status_id BIGINT NOT NULL,
        notification_type TEXT NOT NULL,
        recipient TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
];

/// Creates every pipeline table that does not exist yet.
///
/// # Errors
/// Returns an error if any DDL statement fails.
pub async fn initialize(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .context("Failed to apply schema statement")?;
    }
    info!("schema bootstrap complete ({} tables)", SCHEMA_STATEMENTS.len());
    Ok(())
}

/// Registers the named jobs in `etl_jobs`, leaving existing rows untouched.
///
/// # Errors
/// Returns an error if an insert fails.
pub async fn seed_jobs(pool: &PgPool, job_names: &[&str]) -> Result<()> {
    for job_name in job_names {
        sqlx::query(
            r"
            INSERT INTO etl_jobs (job_name, is_active)
            VALUES ($1, TRUE)
            ON CONFLICT (job_name) DO NOTHING
            ",
        )
        .bind(job_name)
        .execute(pool)
        .await
        .with_context(|| format!("Failed to seed job {job_name}"))?;
    }
    Ok(())
}
