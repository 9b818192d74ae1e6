// crates/server/src/config.rs
//! Environment-driven configuration.
//!
//! Required in production: `SECRET_KEY` (≥ 32 chars). Everything else has
//! a sensible default. `Config::default()` is a development profile used
//! by tests; `from_env` is what the binary loads.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file; `:memory:` selects an in-memory database.
    pub database_path: PathBuf,
    pub database_pool_size: u32,
    pub port: u16,
    pub secret_key: String,
    pub frontend_url: String,
    pub backend_url: String,
    pub pricing_url: String,
    /// Requests per minute per client; 0 disables rate limiting.
    pub rate_limit_per_minute: u32,
    pub log_level: String,
    pub log_json: bool,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(":memory:"),
            database_pool_size: 5,
            port: 8000,
            secret_key: "dev-secret-key-not-for-production!!".into(),
            frontend_url: "http://localhost:3000".into(),
            backend_url: "http://localhost:8000".into(),
            pricing_url: burntop_db::DEFAULT_PRICING_URL.into(),
            rate_limit_per_minute: 0,
            log_level: "info".into(),
            log_json: false,
            github_client_id: None,
            github_client_secret: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let secret_key = std::env::var("SECRET_KEY").context("SECRET_KEY is required")?;
        if secret_key.len() < MIN_SECRET_LEN {
            bail!("SECRET_KEY must be at least {MIN_SECRET_LEN} characters");
        }

        let env_or = |name: &str, fallback: String| std::env::var(name).unwrap_or(fallback);

        Ok(Self {
            database_path: PathBuf::from(env_or(
                "BURNTOP_DATABASE_PATH",
                "burntop.db".to_string(),
            )),
            database_pool_size: parse_env("DATABASE_POOL_SIZE", defaults.database_pool_size)?,
            port: std::env::var("BURNTOP_PORT")
                .or_else(|_| std::env::var("PORT"))
                .ok()
                .map(|p| p.parse().context("invalid port"))
                .transpose()?
                .unwrap_or(defaults.port),
            secret_key,
            frontend_url: env_or("FRONTEND_URL", defaults.frontend_url),
            backend_url: env_or("BACKEND_URL", defaults.backend_url),
            pricing_url: env_or("PRICING_URL", defaults.pricing_url),
            rate_limit_per_minute: parse_env(
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            )?,
            log_level: env_or("LOG_LEVEL", defaults.log_level),
            log_json: std::env::var("LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.log_json),
            github_client_id: std::env::var("GITHUB_CLIENT_ID").ok(),
            github_client_secret: std::env::var("GITHUB_CLIENT_SECRET").ok(),
        })
    }

    /// GitHub OAuth is on only when both credentials are configured.
    pub fn github_oauth_enabled(&self) -> bool {
        self.github_client_id.is_some() && self.github_client_secret.is_some()
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, fallback: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value.parse().with_context(|| format!("invalid {name}")),
        Err(_) => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_test_friendly() {
        let config = Config::default();
        assert!(config.secret_key.len() >= MIN_SECRET_LEN);
        assert_eq!(config.rate_limit_per_minute, 0);
        assert!(!config.github_oauth_enabled());
    }

    #[test]
    fn oauth_enabled_requires_both_credentials() {
        let mut config = Config::default();
        config.github_client_id = Some("id".into());
        assert!(!config.github_oauth_enabled());
        config.github_client_secret = Some("secret".into());
        assert!(config.github_oauth_enabled());
    }
}
