//! Database repositories for the gold price warehouse.
//!
//! Each repository provides typed access to one slice of the schema with
//! transaction-wrapped batch operations.

pub mod job_repo;
pub mod staging_repo;
pub mod warehouse_repo;

pub use job_repo::JobRepository;
pub use staging_repo::StagingRepository;
pub use warehouse_repo::{KeyMap, WarehouseRepository};

use sqlx::PgPool;

/// Creates all repositories from a single database pool.
pub struct Repositories {
    pub staging: StagingRepository,
    pub warehouse: WarehouseRepository,
    pub jobs: JobRepository,
}

impl Repositories {
    /// Creates a new set of repositories from a database pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            staging: StagingRepository::new(pool.clone()),
            warehouse: WarehouseRepository::new(pool.clone()),
            jobs: JobRepository::new(pool),
        }
    }
}
