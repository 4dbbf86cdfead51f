mod api;
mod config;
#[cfg(test)]
mod test_util;

use clap::{Parser, Subcommand};

use mhmng_db::pool;

use config::MhmngConfig;

#[derive(Parser)]
#[command(
    name = "mhmng",
    version,
    about = "Mobility Hub vanning/devanning plan management service"
)]
struct Cli {
    /// Database URL (overrides MHMNG_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an mhmng config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/mhmng")]
        db_url: String,
        /// Hub time zone as a UTC offset, e.g. +09:00
        #[arg(long)]
        utc_offset: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the mhmng database
    DbInit,
    /// Run the HTTP API server
    Serve {
        /// Address to bind (overrides MHMNG_BIND, default 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
        /// Port to listen on (overrides MHMNG_PORT, default 80)
        #[arg(long)]
        port: Option<u16>,
    },
}

// -----------------------------------------------------------------------
// Command implementations
// -----------------------------------------------------------------------

fn cmd_init(db_url: &str, utc_offset: Option<String>, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(ref offset) = utc_offset {
        if mhmng_core::plan::parse_utc_offset(offset).is_none() {
            anyhow::bail!("invalid UTC offset {offset:?} (expected e.g. +09:00)");
        }
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        server: config::ServerSection {
            utc_offset,
            ..Default::default()
        },
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    if let Some(ref offset) = cfg.server.utc_offset {
        println!("  server.utc_offset = {offset}");
    }
    println!();
    println!("Next: run `mhmng db-init` to create and migrate the database.");

    Ok(())
}

async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = MhmngConfig::resolve(cli_db_url, None, None)?;

    println!("Initializing mhmng database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database.");
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::plan_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (kind, count) in &counts {
        println!("  {}: {count} rows", kind.table());
    }

    db_pool.close().await;

    println!("mhmng db-init complete.");
    Ok(())
}

async fn cmd_serve(
    cli_db_url: Option<&str>,
    bind: Option<&str>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let resolved = MhmngConfig::resolve(cli_db_url, bind, port)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        utc_offset = %resolved.time_zone,
        "starting Mobility Hub management service"
    );

    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let state = api::AppState {
        pool: db_pool.clone(),
        time_zone: resolved.time_zone,
    };
    let result = api::run_serve(state, &resolved.bind, resolved.port).await;
    db_pool.close().await;
    result
}

// -----------------------------------------------------------------------
// Main
// -----------------------------------------------------------------------

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
        Commands::Init {
            db_url,
            utc_offset,
            force,
        } => {
            cmd_init(&db_url, utc_offset, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Serve { bind, port } => {
            cmd_serve(cli.database_url.as_deref(), bind.as_deref(), port).await?;
        }
    }

    Ok(())
}
