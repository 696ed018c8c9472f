use anyhow::Result;
use gold_etl_core::{DatabaseConfig, EtlError};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Creates a new database client connected to the specified `PostgreSQL` database.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Creates a client from the application's database configuration.
    ///
    /// # Errors
    /// Returns an error if the database connection cannot be established.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Wraps a driver error into the pipeline taxonomy: connection-level
/// failures become `TransientStore` (retry-eligible), anything else keeps
/// its original shape with context attached.
pub(crate) fn classify_store_error(err: sqlx::Error, what: &str) -> anyhow::Error {
    if matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    ) {
        anyhow::Error::new(EtlError::TransientStore(format!("{what}: {err}")))
    } else {
        anyhow::Error::new(err).context(what.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_classifies_as_transient() {
        let err = classify_store_error(sqlx::Error::PoolTimedOut, "write log");
        let etl = err.downcast_ref::<EtlError>().expect("typed error");
        assert!(etl.is_transient());
    }

    #[test]
    fn test_row_not_found_stays_untyped() {
        let err = classify_store_error(sqlx::Error::RowNotFound, "load job");
        assert!(err.downcast_ref::<EtlError>().is_none());
        assert!(format!("{err:#}").contains("load job"));
    }
}
