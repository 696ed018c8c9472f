use clap::{Parser, Subcommand};
use tracing::info;

use gold_etl_core::{AppConfig, ConfigLoader};
use gold_etl_data::{schema, DatabaseClient};
use gold_etl_scheduler::{Pipeline, ScheduleRegistry, Scheduler, PIPELINE_JOBS};

#[derive(Parser)]
#[command(name = "gold-etl")]
#[command(about = "Gold price warehouse ETL pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler daemon (immediate full pass, then periodic jobs)
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Run one full pipeline pass and exit
    Once {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Create the warehouse and control tables and register the jobs
    InitDb {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_scheduler(&config).await?,
        Commands::Once { config } => run_once(&config).await?,
        Commands::InitDb { config } => init_db(&config).await?,
    }

    Ok(())
}

async fn setup(config_path: &str) -> anyhow::Result<(AppConfig, DatabaseClient)> {
    let config = ConfigLoader::load_from(config_path)?;
    let client = DatabaseClient::from_config(&config.database).await?;

    schema::initialize(client.pool()).await?;
    schema::seed_jobs(client.pool(), PIPELINE_JOBS).await?;

    Ok((config, client))
}

async fn run_scheduler(config_path: &str) -> anyhow::Result<()> {
    let (config, client) = setup(config_path).await?;
    let pipeline = Pipeline::new(client.pool().clone(), config.ingest.clone());

    let mut registry = ScheduleRegistry::from_config(&config.scheduler)?;
    let jobs = gold_etl_data::JobRepository::new(client.pool().clone());
    registry.apply_db_schedules(&jobs.active_schedules().await?);

    Scheduler::new(&config.scheduler, registry, pipeline)
        .run()
        .await
}

async fn run_once(config_path: &str) -> anyhow::Result<()> {
    let (config, client) = setup(config_path).await?;
    let mut pipeline = Pipeline::new(client.pool().clone(), config.ingest.clone());

    pipeline.run_full().await?;
    info!("pipeline pass completed");
    Ok(())
}

async fn init_db(config_path: &str) -> anyhow::Result<()> {
    let (_, _) = setup(config_path).await?;
    info!("database initialized");
    Ok(())
}
