//! Server configuration management

use std::env;

use anyhow::{Context, Result, ensure};
use gqlorm::graphql::PaginationConfig;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (for generating URLs)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite database URL, e.g. `sqlite::memory:` or `sqlite://data/gqlorm.db?mode=rwc`
    pub database_url: String,

    /// Maximum pooled database connections
    pub database_max_connections: u32,

    /// Page size used by connections when neither `first` nor `last` is given
    pub graphql_default_limit: i64,

    /// Upper bound for `first` and `last`
    pub graphql_max_limit: i64,

    /// Emit JSON log lines (`LOG_FORMAT=json`, the default) or compact text
    pub log_json: bool,

    /// Insert demo rows at startup
    pub seed_demo_data: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string()),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            graphql_default_limit: env::var("GRAPHQL_DEFAULT_LIMIT")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .context("Invalid GRAPHQL_DEFAULT_LIMIT")?,

            graphql_max_limit: env::var("GRAPHQL_MAX_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .context("Invalid GRAPHQL_MAX_LIMIT")?,

            log_json: env::var("LOG_FORMAT")
                .map(|v| !v.eq_ignore_ascii_case("compact"))
                .unwrap_or(true),

            seed_demo_data: env::var("SEED_DEMO_DATA")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        };

        ensure!(
            config.graphql_default_limit > 0 && config.graphql_default_limit <= config.graphql_max_limit,
            "GRAPHQL_DEFAULT_LIMIT must be between 1 and GRAPHQL_MAX_LIMIT"
        );

        Ok(config)
    }

    pub fn pagination(&self) -> PaginationConfig {
        PaginationConfig {
            default_limit: self.graphql_default_limit,
            max_limit: self.graphql_max_limit,
        }
    }

    /// Public address of the server
    pub fn base_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.host.as_deref().unwrap_or("localhost"),
            self.port
        )
    }
}
