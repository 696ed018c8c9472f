use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Directory swept for incoming price files. Collectors drop raw files
    /// here; normalized batches pass through `<data_dir>/staging` and end
    /// up archived in `<data_dir>/processed`.
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Polling tick for the scheduler loop, in seconds.
    pub tick_seconds: u64,
    /// Sleep applied after an unexpected scheduler-loop error.
    pub error_cooldown_seconds: u64,
    pub extract_interval_seconds: u64,
    pub staging_interval_seconds: u64,
    pub transform_interval_seconds: u64,
    pub warehouse_interval_seconds: u64,
    /// Time of day (HH:MM) for the daily mart rebuild.
    pub daily_mart_time: String,
    /// Time of day (HH:MM) for the monthly mart rebuild; fires on day 1.
    pub monthly_mart_time: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/gold_etl".to_string(),
                max_connections: 10,
            },
            ingest: IngestConfig {
                data_dir: "data".to_string(),
            },
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_seconds: 1,
            error_cooldown_seconds: 300,
            extract_interval_seconds: 600,
            staging_interval_seconds: 600,
            transform_interval_seconds: 900,
            warehouse_interval_seconds: 900,
            daily_mart_time: "23:30".to_string(),
            monthly_mart_time: "23:45".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_complete() {
        let config = AppConfig::default();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.scheduler.tick_seconds, 1);
        assert_eq!(config.scheduler.error_cooldown_seconds, 300);
        assert_eq!(config.ingest.data_dir, "data");
    }

    #[test]
    fn test_mart_times_parse_as_times_of_day() {
        let config = SchedulerConfig::default();
        assert!(chrono::NaiveTime::parse_from_str(&config.daily_mart_time, "%H:%M").is_ok());
        assert!(chrono::NaiveTime::parse_from_str(&config.monthly_mart_time, "%H:%M").is_ok());
    }
}
