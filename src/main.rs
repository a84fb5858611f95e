use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use questlog_api::{
    api::{create_router, AppState, Collaborators},
    config::Config,
    db::{create_pool, create_redis_client, Cache, GameStore, MemoryStore, PgStore},
    services::{
        clock::{Clock, SystemClock},
        credentials::InMemoryTokenCache,
        providers::{
            playtime::PlaytimeCredentials, storefront::StorefrontEndpoints, IgdbPlaytime,
            RawgCatalog, SteamStorefront,
        },
        HttpOracle,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("questlog_api=info,tower_http=info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn GameStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            tracing::info!("Using Postgres document store");
            Arc::new(PgStore::new(pool).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; library data lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let (cache, cache_writer) = match &config.redis_url {
        Some(url) => {
            let (cache, handle) = Cache::new(create_redis_client(url)?).await;
            (cache, Some(handle))
        }
        None => {
            tracing::info!("REDIS_URL not set; response cache disabled");
            (Cache::disabled(), None)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let catalog = RawgCatalog::new(
        cache.clone(),
        config.catalog_api_key.clone(),
        config.catalog_api_url.clone(),
        config.catalog_rate_limit(),
    );
    let playtime = IgdbPlaytime::new(
        PlaytimeCredentials {
            client_id: config.playtime_client_id.clone(),
            client_secret: config.playtime_client_secret.clone(),
        },
        config.playtime_api_url.clone(),
        config.playtime_token_url.clone(),
        Arc::new(InMemoryTokenCache::new()),
        clock.clone(),
        config.playtime_search_rate_limit(),
        config.playtime_query_rate_limit(),
    );
    let storefront = SteamStorefront::new(
        cache,
        StorefrontEndpoints {
            store_url: config.storefront_api_url.clone(),
            web_api_url: config.storefront_web_api_url.clone(),
            web_api_key: config.storefront_web_api_key.clone(),
            compatibility_url: config.compatibility_api_url.clone(),
        },
        config.storefront_rate_limit(),
    );
    let oracle = HttpOracle::new(config.oracle_url.clone(), config.oracle_api_key.clone());

    let state = AppState::new(Collaborators {
        store,
        catalog: Arc::new(catalog),
        playtime: Arc::new(playtime),
        storefront: Arc::new(storefront),
        oracle: Arc::new(oracle),
        clock,
    });

    let app = create_router(state).layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "questlog-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_writer {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
