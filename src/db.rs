use crate::config::AppConfig;
use metrics::{counter, gauge};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database.database_url.clone(),
            max_connections: cfg.database.max_connections,
            min_connections: cfg.database.min_connections,
            connect_timeout: Duration::from_secs(cfg.database.connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.database.idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.database.acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, DbErr> {
    debug!(
        max_connections = config.max_connections,
        "Configuring database connection"
    );

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    gauge!("zooticket_db.max_connections", config.max_connections as f64);

    let db_pool = Database::connect(opt).await?;
    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, DbErr> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None).await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), DbErr> {
    let start = Instant::now();
    let result = pool.ping().await;

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => {
            debug!("Database connection check successful in {:?}", elapsed);
            gauge!("zooticket_db.connection_latency", elapsed.as_millis() as f64);
        }
        Err(e) => {
            error!("Database connection check failed after {:?}: {}", elapsed, e);
            counter!("zooticket_db.connection_failures", 1);
        }
    }

    result
}
