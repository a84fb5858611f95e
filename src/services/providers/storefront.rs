/// PC storefront provider (Steam-compatible APIs)
///
/// Endpoints:
/// - Store search: /api/storesearch/?term=... → products by name
/// - Price overview: /api/appdetails?appids=a,b&filters=price_overview
/// - Compatibility: {compat}/api/v1/reports/summaries/{id}.json → tier
/// - Web API: ResolveVanityURL and GetOwnedGames (require a key)
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{CompatibilityTier, Discount, OwnedProduct, StorefrontProduct},
    services::{
        batch::RateLimit,
        providers::{absorb, check_status, pick_best_match, require_key, StorefrontProvider},
    },
};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;

const SEARCH_CACHE_TTL: u64 = 86400; // 1 day
const COMPAT_CACHE_TTL: u64 = 604800; // 1 week
const PROVIDER: &str = "storefront";
const ACCOUNT_ID_LEN: usize = 17;

#[derive(Debug, Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    items: Vec<ApiSearchItem>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchItem {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCompatibilitySummary {
    #[serde(default)]
    tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAppDetails {
    #[serde(default)]
    success: bool,
    /// An object when the product has details; some products return `[]`
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiPriceData {
    #[serde(default)]
    price_overview: Option<ApiPriceOverview>,
}

#[derive(Debug, Deserialize)]
struct ApiPriceOverview {
    #[serde(default)]
    discount_percent: u32,
    #[serde(default)]
    final_formatted: String,
}

#[derive(Debug, Deserialize)]
struct ApiVanityResponse {
    response: ApiVanityResult,
}

#[derive(Debug, Deserialize)]
struct ApiVanityResult {
    success: u8,
    #[serde(default)]
    steamid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiOwnedResponse {
    response: ApiOwnedGames,
}

#[derive(Debug, Deserialize)]
struct ApiOwnedGames {
    #[serde(default)]
    games: Vec<ApiOwnedGame>,
}

#[derive(Debug, Deserialize)]
struct ApiOwnedGame {
    appid: u64,
    #[serde(default)]
    name: String,
}

/// What the user typed to identify their storefront account
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountInput {
    Id(String),
    Vanity(String),
}

impl AccountInput {
    /// Accepts a 17-digit id, a `/profiles/<id>` URL, an `/id/<vanity>` URL or a bare vanity name.
    pub fn parse(input: &str) -> AppResult<AccountInput> {
        let input = input.trim().trim_end_matches('/');
        if input.is_empty() {
            return Err(AppError::InvalidInput(
                "Storefront account cannot be empty".to_string(),
            ));
        }

        if is_account_id(input) {
            return Ok(AccountInput::Id(input.to_string()));
        }
        if let Some(rest) = path_segment_after(input, "/profiles/") {
            return Ok(AccountInput::Id(rest.to_string()));
        }
        if let Some(rest) = path_segment_after(input, "/id/") {
            return Ok(AccountInput::Vanity(rest.to_string()));
        }
        Ok(AccountInput::Vanity(input.to_string()))
    }
}

fn is_account_id(value: &str) -> bool {
    value.len() == ACCOUNT_ID_LEN && value.chars().all(|c| c.is_ascii_digit())
}

fn path_segment_after<'a>(input: &'a str, marker: &str) -> Option<&'a str> {
    let start = input.find(marker)? + marker.len();
    input[start..].split('/').next().filter(|s| !s.is_empty())
}

/// Keeps only products with a positive discount.
fn parse_discounts(details: HashMap<String, ApiAppDetails>) -> HashMap<u64, Discount> {
    details
        .into_iter()
        .filter_map(|(id, entry)| {
            let id = id.parse::<u64>().ok()?;
            if !entry.success {
                return None;
            }
            let data: ApiPriceData = serde_json::from_value(entry.data?).ok()?;
            let price = data.price_overview?;
            (price.discount_percent > 0).then_some((
                id,
                Discount {
                    discount_percent: price.discount_percent,
                    price_label: price.final_formatted,
                },
            ))
        })
        .collect()
}

/// Storefront URLs and the optional web API key
#[derive(Debug, Clone)]
pub struct StorefrontEndpoints {
    pub store_url: String,
    pub web_api_url: String,
    pub web_api_key: Option<String>,
    pub compatibility_url: String,
}

#[derive(Clone)]
pub struct SteamStorefront {
    http_client: HttpClient,
    endpoints: StorefrontEndpoints,
    cache: Cache,
    rate_limit: RateLimit,
}

impl SteamStorefront {
    pub fn new(cache: Cache, endpoints: StorefrontEndpoints, rate_limit: RateLimit) -> Self {
        Self {
            http_client: HttpClient::new(),
            endpoints,
            cache,
            rate_limit,
        }
    }

    fn web_api_key(&self) -> AppResult<&str> {
        require_key(&self.endpoints.web_api_key, "STOREFRONT_WEB_API_KEY")
    }

    async fn search(&self, title: &str) -> AppResult<Vec<StorefrontProduct>> {
        cached!(
            self.cache,
            CacheKey::StorefrontSearch(title.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let url = format!("{}/api/storesearch/", self.endpoints.store_url);
                let response = self
                    .http_client
                    .get(&url)
                    .query(&[("term", title), ("l", "english"), ("cc", "US")])
                    .send()
                    .await?;
                let response = check_status(response, PROVIDER).await?;

                let body: ApiSearchResponse = response.json().await?;
                let products: Vec<StorefrontProduct> = body
                    .items
                    .into_iter()
                    .map(|item| StorefrontProduct {
                        product_id: item.id,
                        name: item.name,
                    })
                    .collect();

                tracing::info!(
                    title = %title,
                    results = products.len(),
                    provider = PROVIDER,
                    "Storefront search completed"
                );

                Ok::<_, AppError>(products)
            }
        )
    }

    async fn fetch_compatibility(&self, product_id: u64) -> AppResult<CompatibilityTier> {
        cached!(
            self.cache,
            CacheKey::Compatibility(product_id),
            COMPAT_CACHE_TTL,
            async move {
                let url = format!(
                    "{}/api/v1/reports/summaries/{}.json",
                    self.endpoints.compatibility_url, product_id
                );
                let response = self.http_client.get(&url).send().await?;
                let response = check_status(response, "compatibility").await?;

                let summary: ApiCompatibilitySummary = response.json().await?;
                Ok::<_, AppError>(
                    summary
                        .tier
                        .as_deref()
                        .map(CompatibilityTier::parse)
                        .unwrap_or(CompatibilityTier::Unknown),
                )
            }
        )
    }

    async fn fetch_discounts(&self, product_ids: &[u64]) -> AppResult<HashMap<u64, Discount>> {
        let ids = product_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let url = format!("{}/api/appdetails", self.endpoints.store_url);
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("appids", ids.as_str()),
                ("cc", "us"),
                ("filters", "price_overview"),
            ])
            .send()
            .await?;
        let response = check_status(response, PROVIDER).await?;

        let details: HashMap<String, ApiAppDetails> = response.json().await?;
        Ok(parse_discounts(details))
    }
}

#[async_trait::async_trait]
impl StorefrontProvider for SteamStorefront {
    async fn resolve_product(&self, title: &str) -> AppResult<Option<StorefrontProduct>> {
        if title.trim().is_empty() {
            return Ok(None);
        }

        let result = self
            .search(title)
            .await
            .map(|products| pick_best_match(products, title, |p| p.name.as_str()));

        absorb(PROVIDER, title, result)
    }

    async fn resolve_compatibility(&self, product_id: u64) -> CompatibilityTier {
        match self.fetch_compatibility(product_id).await {
            Ok(tier) => tier,
            Err(AppError::RateLimited(detail)) => {
                tracing::warn!(product_id, detail = %detail, "Compatibility lookup rate limited, using unknown");
                CompatibilityTier::Unknown
            }
            Err(e) => {
                tracing::debug!(product_id, error = %e, "No compatibility report, using unknown");
                CompatibilityTier::Unknown
            }
        }
    }

    async fn resolve_discounts(&self, product_ids: &[u64]) -> HashMap<u64, Discount> {
        if product_ids.is_empty() {
            return HashMap::new();
        }

        match self.fetch_discounts(product_ids).await {
            Ok(discounts) => {
                tracing::info!(
                    requested = product_ids.len(),
                    discounted = discounts.len(),
                    provider = PROVIDER,
                    "Discount lookup completed"
                );
                discounts
            }
            Err(e) => {
                tracing::warn!(error = %e, provider = PROVIDER, "Discount lookup failed");
                HashMap::new()
            }
        }
    }

    async fn resolve_account(&self, input: &str) -> AppResult<String> {
        let api_key = self.web_api_key()?;

        let vanity = match AccountInput::parse(input)? {
            AccountInput::Id(id) => return Ok(id),
            AccountInput::Vanity(vanity) => vanity,
        };

        let url = format!(
            "{}/ISteamUser/ResolveVanityURL/v1/",
            self.endpoints.web_api_url
        );
        let response = self
            .http_client
            .get(&url)
            .query(&[("key", api_key), ("vanityurl", vanity.as_str())])
            .send()
            .await?;
        let response = check_status(response, PROVIDER).await?;

        let body: ApiVanityResponse = response.json().await?;
        match (body.response.success, body.response.steamid) {
            (1, Some(id)) => Ok(id),
            _ => Err(AppError::NotFound(format!(
                "No storefront account named {}",
                vanity
            ))),
        }
    }

    async fn owned_products(&self, account_id: &str) -> AppResult<Vec<OwnedProduct>> {
        let api_key = self.web_api_key()?;

        let url = format!(
            "{}/IPlayerService/GetOwnedGames/v0001/",
            self.endpoints.web_api_url
        );
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("key", api_key),
                ("steamid", account_id),
                ("include_appinfo", "1"),
                ("format", "json"),
            ])
            .send()
            .await?;
        let response = check_status(response, PROVIDER).await?;

        let body: ApiOwnedResponse = response.json().await?;
        let products: Vec<OwnedProduct> = body
            .response
            .games
            .into_iter()
            .map(|g| OwnedProduct {
                product_id: g.appid,
                name: g.name,
            })
            .collect();

        tracing::info!(
            account = %account_id,
            products = products.len(),
            provider = PROVIDER,
            "Fetched owned products"
        );

        Ok(products)
    }

    fn rate_limit(&self) -> RateLimit {
        self.rate_limit
    }
}
