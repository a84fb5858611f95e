#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};

use questlog_api::{
    api::{create_router, AppState, Collaborators},
    db::MemoryStore,
    error::{AppError, AppResult},
    models::{
        CatalogEntry, ChallengeIdea, CompatibilityTier, Discount, OracleRequest, OwnedProduct,
        Platform, PlaytimeEstimate, RawDiscovery, RawSuggestion, StorefrontProduct,
    },
    services::{
        batch::RateLimit,
        clock::Clock,
        providers::{CatalogProvider, PlaytimeProvider, StorefrontProvider},
        RecommendationOracle,
    },
};

pub const USER: &str = "player-one";
pub const ACCOUNT_ID: &str = "76561197960287930";

fn instant() -> RateLimit {
    RateLimit::new(10, Duration::ZERO)
}

pub struct StaticClock(pub DateTime<Utc>);

impl Clock for StaticClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub fn clock() -> Arc<StaticClock> {
    Arc::new(StaticClock(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
}

/// Catalog that knows a fixed set of titles, matched case-insensitively
#[derive(Default)]
pub struct FakeCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl FakeCatalog {
    pub fn with(mut self, entry: CatalogEntry) -> Self {
        self.entries.insert(entry.name.to_lowercase(), entry);
        self
    }
}

#[async_trait::async_trait]
impl CatalogProvider for FakeCatalog {
    async fn resolve_by_title(&self, title: &str) -> AppResult<Option<CatalogEntry>> {
        Ok(self.entries.get(&title.trim().to_lowercase()).cloned())
    }

    fn rate_limit(&self) -> RateLimit {
        instant()
    }
}

pub fn catalog_entry(id: u64, name: &str, genres: &[&str], platforms: &[Platform]) -> CatalogEntry {
    CatalogEntry {
        id,
        name: name.to_string(),
        image_url: Some(format!("https://img.example/{}.jpg", id)),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        release_date: Some("2020-09-17".to_string()),
        base_playtime: NonZeroU32::new(20),
        platforms: platforms.to_vec(),
    }
}

/// Every title takes ten hours, or forty for completionists
pub struct FakePlaytime;

fn estimate() -> PlaytimeEstimate {
    PlaytimeEstimate::from_seconds(Some(36_000), Some(144_000))
}

#[async_trait::async_trait]
impl PlaytimeProvider for FakePlaytime {
    async fn resolve(&self, _title: &str) -> AppResult<PlaytimeEstimate> {
        Ok(estimate())
    }

    async fn resolve_batch(
        &self,
        titles: &[String],
    ) -> AppResult<HashMap<String, PlaytimeEstimate>> {
        Ok(titles.iter().map(|t| (t.clone(), estimate())).collect())
    }
}

#[derive(Default)]
pub struct FakeStorefront {
    products: HashMap<String, u64>,
    tiers: HashMap<u64, CompatibilityTier>,
    discounts: HashMap<u64, Discount>,
    owned: Vec<OwnedProduct>,
}

impl FakeStorefront {
    pub fn product(mut self, title: &str, product_id: u64) -> Self {
        self.products.insert(title.to_lowercase(), product_id);
        self
    }

    pub fn tier(mut self, product_id: u64, tier: CompatibilityTier) -> Self {
        self.tiers.insert(product_id, tier);
        self
    }

    pub fn discount(mut self, product_id: u64, percent: u32) -> Self {
        self.discounts.insert(
            product_id,
            Discount {
                discount_percent: percent,
                price_label: "$9.99".to_string(),
            },
        );
        self
    }

    pub fn owns(mut self, product_id: u64, name: &str) -> Self {
        self.owned.push(OwnedProduct {
            product_id,
            name: name.to_string(),
        });
        self
    }
}

#[async_trait::async_trait]
impl StorefrontProvider for FakeStorefront {
    async fn resolve_product(&self, title: &str) -> AppResult<Option<StorefrontProduct>> {
        Ok(self
            .products
            .get(&title.to_lowercase())
            .map(|&product_id| StorefrontProduct {
                product_id,
                name: title.to_string(),
            }))
    }

    async fn resolve_compatibility(&self, product_id: u64) -> CompatibilityTier {
        self.tiers
            .get(&product_id)
            .copied()
            .unwrap_or(CompatibilityTier::Unknown)
    }

    async fn resolve_discounts(&self, product_ids: &[u64]) -> HashMap<u64, Discount> {
        product_ids
            .iter()
            .filter_map(|id| self.discounts.get(id).map(|d| (*id, d.clone())))
            .collect()
    }

    async fn resolve_account(&self, input: &str) -> AppResult<String> {
        match input {
            "playerone" | ACCOUNT_ID => Ok(ACCOUNT_ID.to_string()),
            other => Err(AppError::NotFound(format!("No storefront account named {}", other))),
        }
    }

    async fn owned_products(&self, _account_id: &str) -> AppResult<Vec<OwnedProduct>> {
        Ok(self.owned.clone())
    }

    fn rate_limit(&self) -> RateLimit {
        instant()
    }
}

/// Oracle that recommends the first library game plus one id that does not exist
pub struct FakeOracle;

impl FakeOracle {
    fn picks(request: &OracleRequest) -> Vec<RawSuggestion> {
        let mut picks: Vec<RawSuggestion> = request
            .game_library
            .iter()
            .take(1)
            .map(|g| RawSuggestion {
                game_id: g.id.to_string(),
                reason: format!("{} fits tonight", g.title),
            })
            .collect();
        picks.push(RawSuggestion {
            game_id: "ghost-id".to_string(),
            reason: "not in the library".to_string(),
        });
        picks
    }
}

#[async_trait::async_trait]
impl RecommendationOracle for FakeOracle {
    async fn mood_recommendations(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>> {
        Ok(Self::picks(request))
    }

    async fn up_next(&self, request: &OracleRequest) -> AppResult<Vec<RawSuggestion>> {
        Ok(Self::picks(request))
    }

    async fn external_discovery(&self, _request: &OracleRequest) -> AppResult<RawDiscovery> {
        Ok(RawDiscovery {
            title: "Outer Wilds".to_string(),
            reason: "You like exploration".to_string(),
            genres: vec!["Adventure".to_string()],
        })
    }

    async fn challenge_ideas(&self, _request: &OracleRequest) -> AppResult<Vec<ChallengeIdea>> {
        Ok(vec![
            ChallengeIdea {
                title: "Indie Sprint".to_string(),
                description: "Finish Indie games".to_string(),
                goal: 9,
            },
            ChallengeIdea {
                title: "Nothing".to_string(),
                description: "Finish no games".to_string(),
                goal: 0,
            },
        ])
    }
}

pub fn default_catalog() -> FakeCatalog {
    FakeCatalog::default()
        .with(catalog_entry(
            1,
            "Known Game",
            &["Action", "RPG"],
            &[Platform::Pc, Platform::PlayStation],
        ))
        .with(catalog_entry(2, "Hades", &["Action", "Indie"], &[Platform::Pc]))
        .with(catalog_entry(
            3,
            "Celeste",
            &["Platformer", "Indie"],
            &[Platform::NintendoSwitch],
        ))
}

pub fn default_storefront() -> FakeStorefront {
    FakeStorefront::default()
        .product("Known Game", 100)
        .product("Hades", 200)
        .tier(200, CompatibilityTier::Platinum)
        .discount(200, 40)
}

pub fn test_state(catalog: FakeCatalog, storefront: FakeStorefront) -> AppState {
    AppState::new(Collaborators {
        store: Arc::new(MemoryStore::new()),
        catalog: Arc::new(catalog),
        playtime: Arc::new(FakePlaytime),
        storefront: Arc::new(storefront),
        oracle: Arc::new(FakeOracle),
        clock: clock(),
    })
}

/// Test server whose requests all carry the default user header
pub fn create_test_server() -> TestServer {
    create_server_with(default_catalog(), default_storefront())
}

pub fn create_server_with(catalog: FakeCatalog, storefront: FakeStorefront) -> TestServer {
    let mut server = TestServer::new(create_router(test_state(catalog, storefront))).unwrap();
    server.add_header(
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_static(USER),
    );
    server
}
