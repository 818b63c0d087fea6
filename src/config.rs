// src/config.rs

use std::env;

use anyhow::{Context, Result, ensure};
use dotenvy::dotenv;

/// Default passing threshold for exams that do not set their own.
pub const DEFAULT_PASSING_SCORE: i64 = 60;

/// Trailing window (minutes) in which an `in_progress` attempt may be resumed.
pub const DEFAULT_RESUME_WINDOW_MINUTES: i64 = 120;

/// Tolerance past an attempt deadline before a submission counts as late.
pub const DEFAULT_SUBMIT_GRACE_SECONDS: i64 = 60;

/// One week.
pub const MAX_RESUME_WINDOW_MINUTES: i64 = 10_080;

pub const MAX_SUBMIT_GRACE_SECONDS: i64 = 3_600;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub cors_origin: String,
    pub resume_window_minutes: i64,
    pub submit_grace_seconds: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_or("JWT_EXPIRATION", 86_400)?,
            rust_log,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port: parse_or("PORT", 3000)?,
            cors_origin: env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            resume_window_minutes: parse_or("RESUME_WINDOW_MINUTES", DEFAULT_RESUME_WINDOW_MINUTES)?,
            submit_grace_seconds: parse_or("SUBMIT_GRACE_SECONDS", DEFAULT_SUBMIT_GRACE_SECONDS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects timing values outside the ranges attempt handling supports.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_RESUME_WINDOW_MINUTES).contains(&self.resume_window_minutes),
            "RESUME_WINDOW_MINUTES must be between 1 and {MAX_RESUME_WINDOW_MINUTES}, got {}",
            self.resume_window_minutes
        );
        ensure!(
            (0..=MAX_SUBMIT_GRACE_SECONDS).contains(&self.submit_grace_seconds),
            "SUBMIT_GRACE_SECONDS must be between 0 and {MAX_SUBMIT_GRACE_SECONDS}, got {}",
            self.submit_grace_seconds
        );
        Ok(())
    }

    /// Configuration for tests and tools that never read the environment.
    pub fn for_database(database_url: &str, jwt_secret: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            jwt_secret: jwt_secret.to_string(),
            jwt_expiration: 600,
            rust_log: "error".to_string(),
            admin_email: None,
            admin_password: None,
            port: 0,
            cors_origin: "http://localhost:5173".to_string(),
            resume_window_minutes: DEFAULT_RESUME_WINDOW_MINUTES,
            submit_grace_seconds: DEFAULT_SUBMIT_GRACE_SECONDS,
        }
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::for_database("sqlite::memory:", "secret").validate().is_ok());
    }

    #[test]
    fn test_timing_bounds() {
        let mut config = Config::for_database("sqlite::memory:", "secret");
        config.resume_window_minutes = i64::MAX;
        assert!(config.validate().is_err());

        config.resume_window_minutes = 0;
        assert!(config.validate().is_err());

        config.resume_window_minutes = MAX_RESUME_WINDOW_MINUTES;
        config.submit_grace_seconds = -1;
        assert!(config.validate().is_err());

        config.submit_grace_seconds = i64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUBMIT_GRACE_SECONDS"));

        config.submit_grace_seconds = 0;
        assert!(config.validate().is_ok());
    }
}
