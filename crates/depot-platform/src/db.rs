use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

pub async fn connect_database(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to postgres")?;

    Ok(pool)
}

/// Creates missing tables and indexes. Safe to run on every start.
pub async fn bootstrap_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply database schema")?;
    info!("database schema ready");
    Ok(())
}
