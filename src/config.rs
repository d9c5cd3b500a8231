use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub static_dir: String,
    pub stats_refresh_interval: Duration,
    pub assignment_sweep_interval: Duration,
    pub staleness_sweep_interval: Duration,
    pub staleness_threshold: Duration,
    pub min_password_length: usize,
    pub default_page_limit: usize,
    pub admin_username: String,
    pub admin_password: String,
    pub password_hash_memory_kib: u32,
    pub password_hash_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 8080,
            log_level: "info".to_string(),
            log_json: false,
            static_dir: "static".to_string(),
            stats_refresh_interval: Duration::from_secs(10),
            assignment_sweep_interval: Duration::from_secs(30),
            staleness_sweep_interval: Duration::from_secs(5 * 60),
            staleness_threshold: Duration::from_secs(10 * 60),
            min_password_length: 4,
            default_page_limit: 10,
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
            password_hash_memory_kib: argon2::Params::DEFAULT_M_COST,
            password_hash_iterations: argon2::Params::DEFAULT_T_COST,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format == "json"),
            static_dir: env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
            stats_refresh_interval: secs_or_default(
                "STATS_REFRESH_SECS",
                defaults.stats_refresh_interval,
            )?,
            assignment_sweep_interval: secs_or_default(
                "ASSIGNMENT_SWEEP_SECS",
                defaults.assignment_sweep_interval,
            )?,
            staleness_sweep_interval: secs_or_default(
                "STALENESS_SWEEP_SECS",
                defaults.staleness_sweep_interval,
            )?,
            staleness_threshold: secs_or_default(
                "STALENESS_THRESHOLD_SECS",
                defaults.staleness_threshold,
            )?,
            min_password_length: parse_or_default(
                "MIN_PASSWORD_LENGTH",
                defaults.min_password_length,
            )?,
            default_page_limit: parse_or_default("DEFAULT_PAGE_LIMIT", defaults.default_page_limit)?,
            admin_username: env::var("ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            password_hash_memory_kib: parse_or_default(
                "PASSWORD_HASH_MEMORY_KIB",
                defaults.password_hash_memory_kib,
            )?,
            password_hash_iterations: parse_or_default(
                "PASSWORD_HASH_ITERATIONS",
                defaults.password_hash_iterations,
            )?,
        })
    }
}

fn secs_or_default(key: &str, default: Duration) -> Result<Duration, AppError> {
    let secs = parse_or_default(key, default.as_secs())?;
    if secs == 0 {
        return Err(AppError::Internal(format!("invalid {key}: must be > 0")));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
