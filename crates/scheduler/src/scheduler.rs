//! Tick-loop scheduler.
//!
//! Single-threaded cooperative polling: every tick the registry is asked
//! for due jobs, which run synchronously inline in pipeline order. A
//! long-running job blocks later ticks until it returns; Ctrl-C is only
//! observed between ticks and jobs.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Local, NaiveTime, Weekday};
use gold_etl_core::SchedulerConfig;
use gold_etl_data::models::JobScheduleRow;
use tracing::{error, info, warn};

use crate::pipeline::{
    Pipeline, JOB_BUILD_DAILY_MART, JOB_BUILD_MONTHLY_MART, JOB_EXTRACT_FILE, JOB_EXTRACT_WEB,
    JOB_LOAD_STAGING, JOB_LOAD_WAREHOUSE, JOB_TRANSFORM, PIPELINE_JOBS,
};

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSpec {
    EverySeconds(u64),
    Daily(NaiveTime),
    /// Fires on Mondays at the given time.
    Weekly(NaiveTime),
    /// Fires on the first day of the month at the given time.
    Monthly(NaiveTime),
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    job_name: &'static str,
    trigger: TriggerSpec,
    last_fired: Option<DateTime<Local>>,
}

impl ScheduleEntry {
    fn is_due(&self, now: DateTime<Local>) -> bool {
        match self.trigger {
            TriggerSpec::EverySeconds(seconds) => self.last_fired.is_none_or(|last| {
                now.signed_duration_since(last).num_seconds() >= i64::try_from(seconds).unwrap_or(i64::MAX)
            }),
            TriggerSpec::Daily(time) => now.time() >= time && !self.fired_today(now),
            TriggerSpec::Weekly(time) => {
                now.weekday() == Weekday::Mon && now.time() >= time && !self.fired_today(now)
            }
            TriggerSpec::Monthly(time) => {
                now.day() == 1 && now.time() >= time && !self.fired_today(now)
            }
        }
    }

    fn fired_today(&self, now: DateTime<Local>) -> bool {
        self.last_fired
            .is_some_and(|last| last.date_naive() == now.date_naive())
    }
}

/// The process-wide set of registered triggers, constructed once at startup
/// and owned by the run loop. Entries stay in pipeline order so jobs due in
/// the same tick run in dependency order.
#[derive(Debug, Clone)]
pub struct ScheduleRegistry {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleRegistry {
    /// Builds the registry from the scheduler configuration.
    ///
    /// # Errors
    /// Returns an error if a configured time of day does not parse.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        let daily_mart_time = parse_time(&config.daily_mart_time)
            .context("invalid daily_mart_time in scheduler config")?;
        let monthly_mart_time = parse_time(&config.monthly_mart_time)
            .context("invalid monthly_mart_time in scheduler config")?;

        let entries = vec![
            entry(JOB_EXTRACT_WEB, TriggerSpec::EverySeconds(config.extract_interval_seconds)),
            entry(JOB_EXTRACT_FILE, TriggerSpec::EverySeconds(config.extract_interval_seconds)),
            entry(JOB_LOAD_STAGING, TriggerSpec::EverySeconds(config.staging_interval_seconds)),
            entry(JOB_TRANSFORM, TriggerSpec::EverySeconds(config.transform_interval_seconds)),
            entry(JOB_LOAD_WAREHOUSE, TriggerSpec::EverySeconds(config.warehouse_interval_seconds)),
            entry(JOB_BUILD_DAILY_MART, TriggerSpec::Daily(daily_mart_time)),
            entry(JOB_BUILD_MONTHLY_MART, TriggerSpec::Monthly(monthly_mart_time)),
        ];

        Ok(Self { entries })
    }

    /// Overrides triggers with active `job_schedule` rows from the control
    /// database. Unknown job names and schedule types are skipped with a
    /// warning.
    pub fn apply_db_schedules(&mut self, rows: &[JobScheduleRow]) {
        for row in rows {
            let trigger = match row.schedule_type.as_str() {
                "DAILY" => TriggerSpec::Daily(row.schedule_time),
                "WEEKLY" => TriggerSpec::Weekly(row.schedule_time),
                "MONTHLY" => TriggerSpec::Monthly(row.schedule_time),
                other => {
                    warn!("unknown schedule type {other:?} for job {}", row.job_name);
                    continue;
                }
            };

            match self
                .entries
                .iter_mut()
                .find(|e| e.job_name == row.job_name)
            {
                Some(existing) => {
                    info!("schedule override for {}: {:?}", row.job_name, trigger);
                    existing.trigger = trigger;
                }
                None => warn!("schedule for unknown job {:?} ignored", row.job_name),
            }
        }
    }

    /// Returns the jobs due at `now`, in pipeline order, marking them fired.
    pub fn due_jobs(&mut self, now: DateTime<Local>) -> Vec<&'static str> {
        let mut due = Vec::new();
        for entry in &mut self.entries {
            if entry.is_due(now) {
                entry.last_fired = Some(now);
                due.push(entry.job_name);
            }
        }
        due
    }

    /// Marks every entry as fired at `now`; used after the startup pass so
    /// interval jobs wait one full interval before firing again.
    pub fn mark_all_fired(&mut self, now: DateTime<Local>) {
        for entry in &mut self.entries {
            entry.last_fired = Some(now);
        }
    }
}

fn entry(job_name: &'static str, trigger: TriggerSpec) -> ScheduleEntry {
    ScheduleEntry {
        job_name,
        trigger,
        last_fired: None,
    }
}

fn parse_time(text: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .with_context(|| format!("cannot parse time of day {text:?}"))
}

pub struct Scheduler {
    registry: ScheduleRegistry,
    pipeline: Pipeline,
    tick: Duration,
    cooldown: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: &SchedulerConfig, registry: ScheduleRegistry, pipeline: Pipeline) -> Self {
        Self {
            registry,
            pipeline,
            tick: Duration::from_secs(config.tick_seconds.max(1)),
            cooldown: Duration::from_secs(config.error_cooldown_seconds),
        }
    }

    /// Runs the scheduling loop until Ctrl-C.
    ///
    /// An immediate full pipeline pass runs at startup. Individual job
    /// failures are logged and never stop the loop; an unexpected loop
    /// error sleeps the cool-down interval and resumes.
    ///
    /// # Errors
    /// Infallible in practice; the signature leaves room for startup
    /// failures surfaced by the runtime.
    pub async fn run(mut self) -> Result<()> {
        info!("running startup pipeline pass");
        self.run_startup_pass().await;
        self.registry.mark_all_fired(Local::now());

        info!("scheduler started, ticking every {:?}", self.tick);
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
                () = tokio::time::sleep(self.tick) => {}
            }

            if let Err(err) = self.tick_once(Local::now()).await {
                error!(
                    "scheduler loop error: {err:#}; cooling down for {:?}",
                    self.cooldown
                );
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown requested during cool-down");
                        break;
                    }
                    () = tokio::time::sleep(self.cooldown) => {}
                }
            }
        }
        Ok(())
    }

    async fn run_startup_pass(&mut self) {
        for job_name in PIPELINE_JOBS {
            if let Err(err) = self.pipeline.run_job(job_name).await {
                error!("startup pass: job {job_name} failed: {err:#}");
            }
        }
    }

    async fn tick_once(&mut self, now: DateTime<Local>) -> Result<()> {
        for job_name in self.registry.due_jobs(now) {
            // One job's failure never halts the loop; it is already
            // recorded as a FAILED run by the tracker.
            if let Err(err) = self.pipeline.run_job(job_name).await {
                error!("job {job_name} failed: {err:#}");
            }
        }
        Ok(())
    }
}
