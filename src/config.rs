//! Runtime configuration
//!
//! Settings are read from the process environment (after `.env` is loaded
//! by the binaries). Every key has a default except `SECRET_KEY`, which is
//! only optional in development.

use crate::error::PlatformError;
use crate::Result;
use std::env;
use tracing::warn;

const DEV_SECRET_KEY: &str = "dev-insecure-secret-change-me";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,

    // Security
    pub secret_key: String,
    pub algorithm: String,
    pub access_token_expire_minutes: i64,

    // API keys
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub market_data_api_key: String,
    pub market_data_secret_key: Option<String>,
    pub news_api_key: String,

    pub market_data_provider: String,

    // Application
    pub environment: String,
    pub debug: bool,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Settings {
    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let is_dev = environment.eq_ignore_ascii_case("development");

        let secret_key = match get("SECRET_KEY") {
            Some(key) => key,
            None if is_dev => {
                warn!("SECRET_KEY not set; using an insecure development key");
                DEV_SECRET_KEY.to_string()
            }
            None => {
                return Err(PlatformError::Config(
                    "SECRET_KEY must be set outside development".to_string(),
                ))
            }
        };

        let algorithm = get("ALGORITHM").unwrap_or_else(|| "HS256".to_string());
        if !matches!(algorithm.as_str(), "HS256" | "HS384" | "HS512") {
            return Err(PlatformError::Config(format!(
                "Unsupported token algorithm: {}",
                algorithm
            )));
        }

        let access_token_expire_minutes = parse_or(&get, "ACCESS_TOKEN_EXPIRE_MINUTES", 30i64)?;

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| PlatformError::Config(format!("Invalid PORT '{}': {}", raw, e)))?,
            None => 8000,
        };

        let debug = get("DEBUG")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(true);

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:8501".to_string(),
                    "http://localhost:3000".to_string(),
                ]
            });

        Ok(Self {
            database_url: get("DATABASE_URL"),
            secret_key,
            algorithm,
            access_token_expire_minutes,
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            market_data_api_key: get("MARKET_DATA_API_KEY").unwrap_or_default(),
            market_data_secret_key: get("MARKET_DATA_SECRET_KEY"),
            news_api_key: get("NEWS_API_KEY").unwrap_or_default(),
            market_data_provider: get("MARKET_DATA_PROVIDER")
                .unwrap_or_else(|| "alpaca".to_string())
                .to_lowercase(),
            environment,
            debug,
            port,
            allowed_origins,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Default tracing filter when RUST_LOG is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.debug {
            "debug,hyper=info,sqlx=warn"
        } else {
            "info"
        }
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| PlatformError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
