use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use questlog_api::{
    db::{Cache, LibrarySnapshot},
    error::AppError,
    models::{CompatibilityTier, Platform, UserPreferences},
    services::{
        batch::RateLimit,
        clock::SystemClock,
        credentials::InMemoryTokenCache,
        providers::{
            playtime::PlaytimeCredentials, storefront::StorefrontEndpoints, CatalogProvider,
            IgdbPlaytime, PlaytimeProvider, RawgCatalog, SteamStorefront, StorefrontProvider,
        },
        recommendations::build_request,
        HttpOracle, RecommendationOracle,
    },
};

/// Serves `app` on an ephemeral local port and returns its base URL
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn instant() -> RateLimit {
    RateLimit::new(10, Duration::ZERO)
}

// ============================================================================
// Catalog
// ============================================================================

async fn catalog_search(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("key").map(String::as_str) != Some("catalog-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    match params.get("search").map(String::as_str) {
        Some("hades") => (
            StatusCode::OK,
            Json(json!({
                "results": [
                    { "id": 9, "name": "Hades II", "genres": [{ "name": "Action" }] },
                    {
                        "id": 2,
                        "name": "Hades",
                        "background_image": "https://img.example/hades.jpg",
                        "genres": [{ "name": "Action" }, { "name": "Indie" }],
                        "released": "2020-09-17",
                        "playtime": 21,
                        "platforms": [
                            { "platform": { "name": "PC" } },
                            { "platform": { "name": "Nintendo Switch" } },
                            { "platform": { "name": "PlayStation 4" } }
                        ]
                    }
                ]
            })),
        ),
        Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))),
        _ => (StatusCode::OK, Json(json!({ "results": [] }))),
    }
}

#[tokio::test]
async fn test_catalog_prefers_exact_name_match() {
    let base = serve(Router::new().route("/games", get(catalog_search))).await;
    let catalog = RawgCatalog::new(
        Cache::disabled(),
        Some("catalog-key".to_string()),
        base,
        instant(),
    );

    let entry = catalog.resolve_by_title("hades").await.unwrap().unwrap();
    assert_eq!(entry.id, 2);
    assert_eq!(entry.name, "Hades");
    assert_eq!(entry.genres, vec!["Action", "Indie"]);
    assert_eq!(
        entry.platforms,
        vec![Platform::Pc, Platform::NintendoSwitch, Platform::OthersRoms]
    );
    assert_eq!(entry.base_playtime.map(|h| h.get()), Some(21));
}

#[tokio::test]
async fn test_catalog_batch_isolates_failures() {
    let base = serve(Router::new().route("/games", get(catalog_search))).await;
    let catalog = RawgCatalog::new(
        Cache::disabled(),
        Some("catalog-key".to_string()),
        base,
        instant(),
    );

    let titles = vec!["hades".to_string(), "broken".to_string(), "nothing".to_string()];
    let results = catalog.resolve_batch_by_titles(&titles).await.unwrap();

    assert_eq!(results.len(), 3);
    assert!(results["hades"].is_some());
    assert!(results["broken"].is_none());
    assert!(results["nothing"].is_none());
}

#[tokio::test]
async fn test_catalog_rejected_key_is_fatal() {
    let base = serve(Router::new().route("/games", get(catalog_search))).await;
    let catalog = RawgCatalog::new(Cache::disabled(), Some("wrong".to_string()), base, instant());

    let result = catalog.resolve_by_title("hades").await;
    assert!(matches!(result, Err(AppError::AuthConfiguration(_))));
}

// ============================================================================
// Playtime
// ============================================================================

#[derive(Clone, Default)]
struct PlaytimeUpstream {
    token_requests: Arc<AtomicUsize>,
    multiquery_bodies: Arc<Mutex<Vec<String>>>,
}

async fn issue_token(
    State(upstream): State<PlaytimeUpstream>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    upstream.token_requests.fetch_add(1, Ordering::SeqCst);
    if params.get("client_secret").map(String::as_str) != Some("secret") {
        return (StatusCode::BAD_REQUEST, Json(json!({ "message": "invalid client secret" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "access_token": "tok", "expires_in": 3600 })),
    )
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer tok")
        && headers.get("client-id").and_then(|v| v.to_str().ok()) == Some("client")
}

async fn search_games(headers: HeaderMap, body: String) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!([])));
    }
    let lowered = body.to_lowercase();
    let hits = if lowered.contains("\"hades\"") {
        json!([{ "id": 7, "name": "Hades" }, { "id": 8, "name": "Hades II" }])
    } else if lowered.contains("\"celeste\"") {
        json!([{ "id": 3, "name": "Celeste" }])
    } else {
        json!([])
    };
    (StatusCode::OK, Json(hits))
}

async fn multiquery(
    State(upstream): State<PlaytimeUpstream>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!([])));
    }
    upstream.multiquery_bodies.lock().unwrap().push(body);
    (
        StatusCode::OK,
        Json(json!([
            { "name": "ttb_7", "result": [{ "normally": 72000, "completely": 180000 }] },
            { "name": "ttb_3", "result": [{ "normally": 28800 }] }
        ])),
    )
}

async fn playtime_provider(secret: &str) -> (IgdbPlaytime, PlaytimeUpstream) {
    let upstream = PlaytimeUpstream::default();
    let app = Router::new()
        .route("/token", post(issue_token))
        .route("/v4/games", post(search_games))
        .route("/v4/multiquery", post(multiquery))
        .with_state(upstream.clone());
    let base = serve(app).await;

    let provider = IgdbPlaytime::new(
        PlaytimeCredentials {
            client_id: Some("client".to_string()),
            client_secret: Some(secret.to_string()),
        },
        format!("{}/v4", base),
        format!("{}/token", base),
        Arc::new(InMemoryTokenCache::new()),
        Arc::new(SystemClock),
        // One search at a time so only the first request exchanges a token.
        RateLimit::new(1, Duration::ZERO),
        instant(),
    );
    (provider, upstream)
}

#[tokio::test]
async fn test_playtime_batch_queries_each_game_once() {
    let (provider, upstream) = playtime_provider("secret").await;

    let titles = vec![
        "Hades".to_string(),
        "HADES".to_string(),
        "Celeste".to_string(),
        "Missing".to_string(),
    ];
    let estimates = provider.resolve_batch(&titles).await.unwrap();

    assert_eq!(estimates.len(), 4);
    assert_eq!(estimates["Hades"].playtime_normally.map(|h| h.get()), Some(20));
    assert_eq!(estimates["Hades"].playtime_completely.map(|h| h.get()), Some(50));
    assert_eq!(estimates["HADES"], estimates["Hades"]);
    assert_eq!(estimates["Celeste"].playtime_normally.map(|h| h.get()), Some(8));
    assert!(estimates["Celeste"].playtime_completely.is_none());
    assert!(estimates["Missing"].is_empty());

    assert_eq!(upstream.token_requests.load(Ordering::SeqCst), 1);
    let bodies = upstream.multiquery_bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0].matches("\"ttb_7\"").count(), 1);
    assert_eq!(bodies[0].matches("\"ttb_3\"").count(), 1);
}

#[tokio::test]
async fn test_playtime_token_is_reused() {
    let (provider, upstream) = playtime_provider("secret").await;

    provider.resolve("Hades").await.unwrap();
    provider.resolve("Celeste").await.unwrap();

    assert_eq!(upstream.token_requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_playtime_rejected_credentials_are_fatal() {
    let (provider, _) = playtime_provider("wrong").await;

    let result = provider.resolve("Hades").await;
    assert!(matches!(result, Err(AppError::AuthConfiguration(_))));
}

// ============================================================================
// Storefront
// ============================================================================

async fn store_search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("term").map(String::as_str) {
        Some("Hades") => Json(json!({
            "items": [{ "id": 1145360, "name": "Hades" }, { "id": 1145350, "name": "Hades II" }]
        })),
        _ => Json(json!({ "items": [] })),
    }
}

async fn app_details() -> Json<Value> {
    Json(json!({
        "10": { "success": true, "data": { "price_overview": { "discount_percent": 0, "final_formatted": "$19.99" } } },
        "20": { "success": true, "data": { "price_overview": { "discount_percent": 25, "final_formatted": "$14.99" } } },
        "30": { "success": true, "data": [] }
    }))
}

async fn compatibility_summary(Path(file): Path<String>) -> (StatusCode, Json<Value>) {
    match file.as_str() {
        "1145360.json" => (StatusCode::OK, Json(json!({ "tier": "platinum" }))),
        "413150.json" => (StatusCode::TOO_MANY_REQUESTS, Json(json!({}))),
        _ => (StatusCode::NOT_FOUND, Json(json!({}))),
    }
}

async fn resolve_vanity(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    match params.get("vanityurl").map(String::as_str) {
        Some("playerone") => Json(json!({
            "response": { "success": 1, "steamid": "76561197960287930" }
        })),
        _ => Json(json!({ "response": { "success": 42, "message": "No match" } })),
    }
}

async fn owned_games(Query(params): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    if params.get("key").map(String::as_str) != Some("web-key") {
        return (StatusCode::FORBIDDEN, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "response": {
                "game_count": 2,
                "games": [
                    { "appid": 1145360, "name": "Hades" },
                    { "appid": 504230, "name": "Celeste" }
                ]
            }
        })),
    )
}

async fn storefront(web_api_key: &str) -> SteamStorefront {
    let app = Router::new()
        .route("/api/storesearch/", get(store_search))
        .route("/api/appdetails", get(app_details))
        .route("/api/v1/reports/summaries/:file", get(compatibility_summary))
        .route("/ISteamUser/ResolveVanityURL/v1/", get(resolve_vanity))
        .route("/IPlayerService/GetOwnedGames/v0001/", get(owned_games));
    let base = serve(app).await;

    SteamStorefront::new(
        Cache::disabled(),
        StorefrontEndpoints {
            store_url: base.clone(),
            web_api_url: base.clone(),
            web_api_key: Some(web_api_key.to_string()),
            compatibility_url: base,
        },
        instant(),
    )
}

#[tokio::test]
async fn test_storefront_products_with_compatibility() {
    let storefront = storefront("web-key").await;

    let titles = vec!["Hades".to_string(), "Unlisted".to_string()];
    let details = storefront.resolve_products(&titles, true).await.unwrap();

    assert_eq!(details.len(), 1);
    assert_eq!(details["Hades"].product_id, 1145360);
    assert_eq!(
        details["Hades"].compatibility_tier,
        Some(CompatibilityTier::Platinum)
    );

    assert_eq!(
        storefront.resolve_compatibility(504230).await,
        CompatibilityTier::Unknown
    );
}

#[tokio::test]
async fn test_storefront_rate_limited_compatibility_is_unknown() {
    let storefront = storefront("web-key").await;

    assert_eq!(
        storefront.resolve_compatibility(413150).await,
        CompatibilityTier::Unknown
    );
    assert_eq!(
        storefront.resolve_compatibility(1145360).await,
        CompatibilityTier::Platinum
    );
}

#[tokio::test]
async fn test_storefront_keeps_only_positive_discounts() {
    let storefront = storefront("web-key").await;

    let discounts = storefront.resolve_discounts(&[10, 20, 30]).await;

    assert_eq!(discounts.len(), 1);
    assert_eq!(discounts[&20].discount_percent, 25);
    assert_eq!(discounts[&20].price_label, "$14.99");
}

#[tokio::test]
async fn test_storefront_account_lookup() {
    let storefront = storefront("web-key").await;

    let account = storefront
        .resolve_account("https://steamcommunity.com/id/playerone/")
        .await
        .unwrap();
    assert_eq!(account, "76561197960287930");

    let missing = storefront.resolve_account("nobody-here").await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    let owned = storefront.owned_products(&account).await.unwrap();
    assert_eq!(owned.len(), 2);
    assert_eq!(owned[1].product_id, 504230);
    assert_eq!(owned[1].name, "Celeste");
}

#[tokio::test]
async fn test_storefront_rejected_web_key_is_fatal() {
    let storefront = storefront("stale-key").await;

    let result = storefront.owned_products("76561197960287930").await;
    assert!(matches!(result, Err(AppError::AuthConfiguration(_))));
}

// ============================================================================
// Oracle
// ============================================================================

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer oracle-key")
}

async fn oracle_recommendations(headers: HeaderMap, Json(request): Json<Value>) -> (StatusCode, Json<Value>) {
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    let mood = request["moodText"].as_str().unwrap_or_default().to_string();
    (
        StatusCode::OK,
        Json(json!({
            "recommendations": [{ "gameId": "g-1", "reason": format!("Matches {}", mood) }]
        })),
    )
}

async fn oracle_discovery() -> Json<Value> {
    Json(json!({ "title": "Outer Wilds", "reason": "Space mysteries", "genres": ["Adventure"] }))
}

async fn oracle_ideas() -> Json<Value> {
    Json(json!({
        "ideas": [{ "title": "Retro Run", "description": "Finish 3 Platformer games", "goal": 3 }]
    }))
}

async fn oracle_unavailable() -> StatusCode {
    StatusCode::BAD_GATEWAY
}

async fn oracle() -> HttpOracle {
    let app = Router::new()
        .route("/game-recommendations", post(oracle_recommendations))
        .route("/external-recommendation", post(oracle_discovery))
        .route("/challenge-ideas", post(oracle_ideas))
        .route("/up-next-suggestions", post(oracle_unavailable));
    let base = serve(app).await;
    HttpOracle::new(format!("{}/", base), Some("oracle-key".to_string()))
}

#[tokio::test]
async fn test_oracle_flows_unwrap_envelopes() {
    let oracle = oracle().await;
    let request = build_request(
        &LibrarySnapshot::default(),
        &UserPreferences::new(),
        false,
        Some("cozy".to_string()),
    );

    let picks = oracle.mood_recommendations(&request).await.unwrap();
    assert_eq!(picks.len(), 1);
    assert_eq!(picks[0].game_id, "g-1");
    assert_eq!(picks[0].reason, "Matches cozy");

    let discovery = oracle.external_discovery(&request).await.unwrap();
    assert_eq!(discovery.title, "Outer Wilds");

    let ideas = oracle.challenge_ideas(&request).await.unwrap();
    assert_eq!(ideas[0].goal, 3);
}

#[tokio::test]
async fn test_oracle_failure_surfaces_as_external_error() {
    let oracle = oracle().await;
    let request = build_request(&LibrarySnapshot::default(), &UserPreferences::new(), false, None);

    let result = oracle.up_next(&request).await;
    assert!(matches!(result, Err(AppError::ExternalApi(_))));
}
