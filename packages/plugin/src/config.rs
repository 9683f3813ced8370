//! Plugin configuration loaded from environment variables.

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use jobcomp_wire::TimeFormat;
use std::env;
use std::str::FromStr;

/// Knobs fixed at process start. TTLs are seconds; zero disables expiry
/// for that key family.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub password: Option<String>,
    /// Optional location the controller scopes this store under; becomes
    /// the `<location>:job` key prefix.
    pub location: Option<String>,
    pub job_ttl: u64,
    pub query_ttl: u64,
    /// Jobs requested per `FETCH` call while draining a match set.
    pub fetch_count: u32,
    pub id_cache_size: usize,
    pub id_cache_ttl: u64,
    /// Store instants as ISO-8601 UTC instead of epoch seconds.
    pub use_iso8601: bool,
    pub abi: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            redis_url: env::var("JOBCOMP_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            password: env::var("JOBCOMP_REDIS_PASSWORD").ok(),
            location: env::var("JOBCOMP_REDIS_LOCATION").ok(),
            job_ttl: parse_or("JOBCOMP_JOB_TTL", 0)?,
            query_ttl: parse_or("JOBCOMP_QUERY_TTL", 60)?,
            fetch_count: parse_or("JOBCOMP_FETCH_COUNT", 100)?,
            id_cache_size: parse_or("JOBCOMP_ID_CACHE_SIZE", 64)?,
            id_cache_ttl: parse_or("JOBCOMP_ID_CACHE_TTL", 120)?,
            use_iso8601: flag_or("JOBCOMP_USE_ISO8601", true)?,
            abi: parse_or("SLURM_REDIS_ABI", jobcomp_wire::SLURM_REDIS_ABI)?,
        })
    }

    pub fn time_format(&self) -> TimeFormat {
        if self.use_iso8601 {
            TimeFormat::Iso8601
        } else {
            TimeFormat::Epoch
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            password: None,
            location: None,
            job_ttl: 0,
            query_ttl: 60,
            fetch_count: 100,
            id_cache_size: 64,
            id_cache_ttl: 120,
            use_iso8601: true,
            abi: jobcomp_wire::SLURM_REDIS_ABI,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

fn flag_or(key: &str, default: bool) -> Result<bool> {
    match env::var(key) {
        Ok(value) => match value.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => bail!("{key} must be a boolean, got '{other}'"),
        },
        Err(_) => Ok(default),
    }
}
