use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => bail!("unsupported DEPOT_STORE value: {other}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub http_addr: String,
    pub database_max_connections: u32,
    pub lookup_cache_ttl: Duration,
    pub posting_max_attempts: u32,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let store = match var("DEPOT_STORE") {
            Some(value) => value.parse().context("DEPOT_STORE is invalid")?,
            None => StoreBackend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            bail!("DATABASE_URL is required when DEPOT_STORE=postgres");
        }
        let redis_url = var("REDIS_URL");
        let http_addr = var("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());

        let database_max_connections = parse_number(var("DATABASE_MAX_CONNECTIONS"), 10)
            .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?;
        let lookup_cache_ttl_secs = parse_number(var("LOOKUP_CACHE_TTL_SECS"), 300)
            .context("LOOKUP_CACHE_TTL_SECS must be a positive integer")?;
        let posting_max_attempts = parse_number(var("POSTING_MAX_ATTEMPTS"), 3)
            .context("POSTING_MAX_ATTEMPTS must be a positive integer")?;

        Ok(Self {
            store,
            database_url,
            redis_url,
            http_addr,
            database_max_connections: u32::try_from(database_max_connections)?,
            lookup_cache_ttl: Duration::from_secs(lookup_cache_ttl_secs),
            posting_max_attempts: u32::try_from(posting_max_attempts)?,
        })
    }
}

fn parse_number(value: Option<String>, default: u64) -> Result<u64> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed: u64 = value.trim().parse()?;
    if parsed == 0 {
        bail!("zero is not allowed");
    }
    Ok(parsed)
}
