/// Game metadata catalog provider (RAWG-compatible API)
///
/// API Flow:
/// 1. Search: /games?search=... → ranked candidates with genres, cover art,
///    release date, a coarse playtime and supported platforms
/// 2. Best match: exact case-insensitive name, else the top-ranked candidate
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::AppResult,
    models::{CatalogEntry, Platform},
    services::{
        batch::RateLimit,
        providers::{absorb, check_status, pick_best_match, require_key, CatalogProvider},
    },
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::num::NonZeroU32;

const SEARCH_CACHE_TTL: u64 = 86400; // 1 day
const SEARCH_PAGE_SIZE: &str = "5";
const PROVIDER: &str = "catalog";

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    results: Vec<ApiGame>,
}

#[derive(Debug, Deserialize)]
struct ApiGame {
    id: u64,
    name: String,
    #[serde(default)]
    background_image: Option<String>,
    #[serde(default)]
    genres: Vec<ApiNamed>,
    #[serde(default)]
    released: Option<String>,
    #[serde(default)]
    playtime: Option<u32>,
    #[serde(default)]
    platforms: Option<Vec<ApiPlatformEntry>>,
}

#[derive(Debug, Deserialize)]
struct ApiNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPlatformEntry {
    platform: ApiNamed,
}

impl From<ApiGame> for CatalogEntry {
    fn from(game: ApiGame) -> Self {
        let mut platforms: Vec<Platform> = Vec::new();
        for entry in game.platforms.unwrap_or_default() {
            let platform = Platform::from_catalog_name(&entry.platform.name);
            if !platforms.contains(&platform) {
                platforms.push(platform);
            }
        }

        CatalogEntry {
            id: game.id,
            name: game.name,
            image_url: game.background_image.filter(|url| !url.is_empty()),
            genres: game.genres.into_iter().map(|g| g.name).collect(),
            release_date: game.released,
            base_playtime: game.playtime.and_then(NonZeroU32::new),
            platforms,
        }
    }
}

#[derive(Clone)]
pub struct RawgCatalog {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    cache: Cache,
    rate_limit: RateLimit,
}

impl RawgCatalog {
    pub fn new(cache: Cache, api_key: Option<String>, api_url: String, rate_limit: RateLimit) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url,
            cache,
            rate_limit,
        }
    }

    /// Ranked candidates for `title`. Only successful responses are cached.
    async fn search(&self, title: &str) -> AppResult<Vec<CatalogEntry>> {
        let api_key = require_key(&self.api_key, "CATALOG_API_KEY")?;

        cached!(
            self.cache,
            CacheKey::CatalogSearch(title.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let url = format!("{}/games", self.api_url);
                let response = self
                    .http_client
                    .get(&url)
                    .query(&[
                        ("key", api_key),
                        ("search", title),
                        ("page_size", SEARCH_PAGE_SIZE),
                    ])
                    .send()
                    .await?;
                let response = check_status(response, PROVIDER).await?;

                let body: ApiSearchResponse = response.json().await?;
                let entries: Vec<CatalogEntry> =
                    body.results.into_iter().map(CatalogEntry::from).collect();

                tracing::info!(
                    title = %title,
                    results = entries.len(),
                    provider = PROVIDER,
                    "Catalog search completed"
                );

                Ok::<_, crate::error::AppError>(entries)
            }
        )
    }
}

#[async_trait::async_trait]
impl CatalogProvider for RawgCatalog {
    async fn resolve_by_title(&self, title: &str) -> AppResult<Option<CatalogEntry>> {
        if title.trim().is_empty() {
            return Ok(None);
        }

        let result = self
            .search(title)
            .await
            .map(|candidates| pick_best_match(candidates, title, |c| c.name.as_str()));

        absorb(PROVIDER, title, result)
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }
}
