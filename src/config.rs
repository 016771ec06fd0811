use std::env;

use crate::error::ConfigError;

#[derive(Clone, Debug)]
pub struct Config {
    /// Canvas base URL without the `/api/v1` suffix, e.g. `https://canvas.example.edu`.
    pub canvas_api_url: String,
    pub canvas_api_key: String,
    pub database_url: String,
    /// Page size requested from paginated Canvas endpoints (Canvas caps this, usually at 100).
    pub max_per_page: u32,
    pub worker_concurrency: usize,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            canvas_api_url: required(&lookup, "CANVAS_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            canvas_api_key: required(&lookup, "CANVAS_API_KEY")?,
            database_url: required(&lookup, "DATABASE_URL")?,
            max_per_page: number(&lookup, "MAX_PER_PAGE", 100)?,
            worker_concurrency: number(&lookup, "WORKER_CONCURRENCY", 4)?,
            port: number(&lookup, "PORT", 8081)?,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber { name, value }),
        _ => Ok(default),
    }
}
