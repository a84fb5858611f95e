use serde::Deserialize;
use std::time::Duration;

use crate::services::batch::RateLimit;

/// Application configuration loaded from environment variables
///
/// Credentials are optional here on purpose: a missing key is reported as a
/// configuration error by the integration that needs it, at call time.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    #[serde(default)]
    pub database_url: Option<String>,

    /// Redis connection URL; response caching is disabled when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Game metadata catalog API key
    #[serde(default)]
    pub catalog_api_key: Option<String>,

    #[serde(default = "default_catalog_api_url")]
    pub catalog_api_url: String,

    /// Client credentials for the time-to-beat service
    #[serde(default)]
    pub playtime_client_id: Option<String>,

    #[serde(default)]
    pub playtime_client_secret: Option<String>,

    #[serde(default = "default_playtime_api_url")]
    pub playtime_api_url: String,

    #[serde(default = "default_playtime_token_url")]
    pub playtime_token_url: String,

    /// Storefront store API (search, price overview)
    #[serde(default = "default_storefront_api_url")]
    pub storefront_api_url: String,

    /// Storefront web API (account resolution, owned products)
    #[serde(default = "default_storefront_web_api_url")]
    pub storefront_web_api_url: String,

    #[serde(default)]
    pub storefront_web_api_key: Option<String>,

    /// Community compatibility-report service
    #[serde(default = "default_compatibility_api_url")]
    pub compatibility_api_url: String,

    /// Recommendation oracle base URL
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    #[serde(default)]
    pub oracle_api_key: Option<String>,

    #[serde(default = "default_catalog_batch_size")]
    pub catalog_batch_size: usize,

    #[serde(default = "default_batch_delay_ms")]
    pub catalog_batch_delay_ms: u64,

    #[serde(default = "default_playtime_search_batch_size")]
    pub playtime_search_batch_size: usize,

    #[serde(default = "default_batch_delay_ms")]
    pub playtime_search_batch_delay_ms: u64,

    #[serde(default = "default_playtime_query_batch_size")]
    pub playtime_query_batch_size: usize,

    #[serde(default = "default_batch_delay_ms")]
    pub playtime_query_batch_delay_ms: u64,

    #[serde(default = "default_storefront_batch_size")]
    pub storefront_batch_size: usize,

    #[serde(default = "default_storefront_batch_delay_ms")]
    pub storefront_batch_delay_ms: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_catalog_api_url() -> String {
    "https://api.rawg.io/api".to_string()
}

fn default_playtime_api_url() -> String {
    "https://api.igdb.com/v4".to_string()
}

fn default_playtime_token_url() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_storefront_api_url() -> String {
    "https://store.steampowered.com".to_string()
}

fn default_storefront_web_api_url() -> String {
    "https://api.steampowered.com".to_string()
}

fn default_compatibility_api_url() -> String {
    "https://www.protondb.com".to_string()
}

fn default_oracle_url() -> String {
    "http://localhost:3400".to_string()
}

fn default_catalog_batch_size() -> usize {
    10
}

fn default_playtime_search_batch_size() -> usize {
    4
}

fn default_playtime_query_batch_size() -> usize {
    10
}

fn default_storefront_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_storefront_batch_delay_ms() -> u64 {
    1100
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn catalog_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.catalog_batch_size,
            Duration::from_millis(self.catalog_batch_delay_ms),
        )
    }

    pub fn playtime_search_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.playtime_search_batch_size,
            Duration::from_millis(self.playtime_search_batch_delay_ms),
        )
    }

    pub fn playtime_query_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.playtime_query_batch_size,
            Duration::from_millis(self.playtime_query_batch_delay_ms),
        )
    }

    pub fn storefront_rate_limit(&self) -> RateLimit {
        RateLimit::new(
            self.storefront_batch_size,
            Duration::from_millis(self.storefront_batch_delay_ms),
        )
    }
}
