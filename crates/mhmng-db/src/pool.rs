//! Connection pooling, schema migrations and database bootstrap for the plan
//! store.
//!
//! `mhmng serve` opens one pool for the HTTP API and migrates it before
//! accepting requests; `mhmng db-init` additionally creates the database and
//! reports how many plans each table holds.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

use crate::config::DbConfig;
use crate::models::PlanKind;

/// Migrations creating the `vanning_plan` and `devanning_plan` tables,
/// embedded from `crates/mhmng-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Connections shared by all API handlers. Each upsert holds one for the
/// length of its transaction.
const POOL_SIZE: u32 = 5;

/// How long a request waits for a free connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the pool the plan API serves requests from.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(POOL_SIZE)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the plan database")
}

/// Bring the plan tables up to the embedded schema. Already-applied
/// migrations are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to migrate the plan tables")?;

    info!(migrations = MIGRATOR.iter().count(), "plan schema up to date");
    Ok(())
}

/// Create the database named in `config` on its server if it is missing.
///
/// Returns `true` when the database was created by this call.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<bool> {
    let db_name = config
        .database_name()
        .with_context(|| format!("no database name in {}", config.database_url))?;
    if !is_plain_identifier(db_name) {
        anyhow::bail!("database name {db_name:?} must be ASCII letters, digits or '_'");
    }

    let maintenance = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.maintenance_url())
        .await
        .context("failed to connect to the postgres maintenance database")?;

    let created = create_if_missing(&maintenance, db_name).await;
    maintenance.close().await;

    let created = created?;
    if created {
        info!(db = db_name, "plan database created");
    } else {
        debug!(db = db_name, "plan database already present");
    }
    Ok(created)
}

async fn create_if_missing(maintenance: &PgPool, db_name: &str) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(maintenance)
            .await
            .context("failed to look up pg_database")?;
    if exists {
        return Ok(false);
    }

    // CREATE DATABASE takes no bind parameters; the name was checked above.
    maintenance
        .execute(format!("CREATE DATABASE {db_name}").as_str())
        .await
        .with_context(|| format!("failed to create database {db_name}"))?;
    Ok(true)
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Number of stored plans of each kind, vanning first.
pub async fn plan_counts(pool: &PgPool) -> Result<Vec<(PlanKind, i64)>> {
    let mut counts = Vec::with_capacity(PlanKind::ALL.len());
    for kind in PlanKind::ALL {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count {kind} plans"))?;
        counts.push((kind, count));
    }
    Ok(counts)
}
