use std::{env, fmt::Display, str::FromStr};

use anyhow::{Result, anyhow};
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            database_url: try_load("DATABASE_URL", "sqlite://canteen.db?mode=rwc")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    parse(key, &raw)
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        anyhow!("Environment misconfigured: {key}={raw}: {e}")
    })
}
