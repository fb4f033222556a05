//! Database CLI subcommands for cairnd.
//!
//! Provides `db migrate` and `db status`.

use anyhow::{anyhow, Result};
use cairn_store::PgStore;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::env;
use tracing::{info, warn};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `cairnd db migrate` - Run pending migrations
/// - `cairnd db status` - Check connectivity and migration status
pub async fn run_db_command(args: Vec<String>) -> Result<()> {
    if args.len() < 3 {
        return Err(anyhow!("Usage: cairnd db <migrate|status>"));
    }

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let store = PgStore::connect(&database_url).await?;

    match args[2].as_str() {
        "migrate" => {
            info!("Running database migrations...");
            store.migrate().await?;
            info!("Migrations completed successfully");
        },
        "status" => status(&store).await?,
        other => {
            return Err(anyhow!("Unknown db command: {}. Use migrate or status", other));
        },
    }

    Ok(())
}

/// Check connectivity and list the latest applied migrations.
async fn status(store: &PgStore) -> Result<()> {
    let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(store.pool()).await?;
    if result != 1 {
        return Err(anyhow!("Database connectivity check failed"));
    }
    info!("Database connectivity: OK");

    let rows = sqlx::query(
        r#"
        SELECT version, description, installed_on, success
        FROM _sqlx_migrations
        ORDER BY version DESC
        LIMIT 10
        "#,
    )
    .fetch_all(store.pool())
    .await;

    match rows {
        Ok(migrations) if !migrations.is_empty() => {
            info!("Latest migrations:");
            for migration in migrations {
                let version: i64 = migration.try_get("version")?;
                let description: String = migration.try_get("description")?;
                let installed_on: DateTime<Utc> = migration.try_get("installed_on")?;
                let success: bool = migration.try_get("success")?;

                info!(
                    version,
                    description = %description,
                    installed_on = %installed_on,
                    success,
                    "Migration"
                );
            }
        },
        Ok(_) => {
            warn!("No migrations found in database (run `cairnd db migrate` first)");
        },
        Err(e) => {
            // Table might not exist yet
            if e.to_string().contains("_sqlx_migrations") {
                warn!("Migration table not found (run `cairnd db migrate` first)");
            } else {
                return Err(e.into());
            }
        },
    }

    Ok(())
}
