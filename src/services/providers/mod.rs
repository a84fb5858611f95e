//! External data sources for game metadata.
//!
//! Each resolver turns a free-text title into structured data from one
//! service. Resolvers absorb not-found, rate-limit and transport failures into
//! `None` (or an empty/default value); only configuration failures escape as
//! errors, so callers can tell "no data" apart from "cannot work at all".

use reqwest::{Response, StatusCode};
use std::collections::HashMap;

use crate::{
    error::{AppError, AppResult},
    models::{
        CatalogEntry, CompatibilityTier, Discount, OwnedProduct, PlaytimeEstimate,
        StorefrontDetails, StorefrontProduct,
    },
    services::batch::{fetch_in_chunks, RateLimit},
};

pub mod catalog;
pub mod playtime;
pub mod storefront;

pub use catalog::RawgCatalog;
pub use playtime::IgdbPlaytime;
pub use storefront::SteamStorefront;

/// Game metadata catalog search
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Best catalog match for `title`, or `None` when there is none or the
    /// lookup degraded.
    async fn resolve_by_title(&self, title: &str) -> AppResult<Option<CatalogEntry>>;

    fn rate_limit(&self) -> RateLimit;

    /// Resolves every title under this catalog's rate limit.
    ///
    /// One title failing never blocks the others.
    async fn resolve_batch_by_titles(
        &self,
        titles: &[String],
    ) -> AppResult<HashMap<String, Option<CatalogEntry>>> {
        let outcomes = fetch_in_chunks("catalog", titles, self.rate_limit(), |title| {
            self.resolve_by_title(title)
        })
        .await?;

        Ok(titles.iter().cloned().zip(outcomes).collect())
    }
}

/// Time-to-beat estimates
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PlaytimeProvider: Send + Sync {
    /// Estimate for one title; empty when nothing is known.
    async fn resolve(&self, title: &str) -> AppResult<PlaytimeEstimate>;

    /// Estimates keyed by input title. Titles without data map to an empty estimate.
    async fn resolve_batch(&self, titles: &[String])
        -> AppResult<HashMap<String, PlaytimeEstimate>>;
}

/// PC storefront search, pricing, account data and handheld compatibility
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StorefrontProvider: Send + Sync {
    async fn resolve_product(&self, title: &str) -> AppResult<Option<StorefrontProduct>>;

    /// Community compatibility tier; `Unknown` on any failure.
    async fn resolve_compatibility(&self, product_id: u64) -> CompatibilityTier;

    /// Products currently on sale. Products without a positive discount are absent.
    async fn resolve_discounts(&self, product_ids: &[u64]) -> HashMap<u64, Discount>;

    /// Resolves an account id from a numeric id, a profile URL or a vanity name.
    async fn resolve_account(&self, input: &str) -> AppResult<String>;

    async fn owned_products(&self, account_id: &str) -> AppResult<Vec<OwnedProduct>>;

    fn rate_limit(&self) -> RateLimit;

    /// Storefront data for each title that has a product, keyed by title.
    ///
    /// Compatibility is looked up only when `with_compatibility` is set.
    async fn resolve_products(
        &self,
        titles: &[String],
        with_compatibility: bool,
    ) -> AppResult<HashMap<String, StorefrontDetails>> {
        let outcomes = fetch_in_chunks("storefront", titles, self.rate_limit(), |title| async move {
            let Some(product) = self.resolve_product(title).await? else {
                return Ok::<_, AppError>(None);
            };
            let compatibility_tier = if with_compatibility {
                Some(self.resolve_compatibility(product.product_id).await)
            } else {
                None
            };
            Ok(Some(StorefrontDetails {
                product_id: product.product_id,
                compatibility_tier,
            }))
        })
        .await?;

        Ok(titles
            .iter()
            .cloned()
            .zip(outcomes)
            .filter_map(|(title, details)| details.map(|d| (title, d)))
            .collect())
    }

    /// Compatibility tiers for many products under the storefront rate limit
    async fn resolve_compatibility_batch(
        &self,
        product_ids: &[u64],
    ) -> AppResult<HashMap<u64, CompatibilityTier>> {
        let outcomes = fetch_in_chunks("compatibility", product_ids, self.rate_limit(), |id| async move {
            Ok::<_, AppError>(Some(self.resolve_compatibility(*id).await))
        })
        .await?;

        Ok(product_ids
            .iter()
            .copied()
            .zip(outcomes)
            .filter_map(|(id, tier)| tier.map(|t| (id, t)))
            .collect())
    }
}

/// Picks the candidate whose name equals `query` ignoring case, else the first.
pub fn pick_best_match<T>(
    candidates: Vec<T>,
    query: &str,
    name: impl Fn(&T) -> &str,
) -> Option<T> {
    let wanted = query.trim().to_lowercase();
    let exact = candidates
        .iter()
        .position(|c| name(c).to_lowercase() == wanted);

    let index = exact.unwrap_or(0);
    candidates.into_iter().nth(index)
}

/// Passes successful responses through and classifies the rest.
///
/// 401/403 mean the configured credentials are wrong (fatal); 429/503 are
/// rate limits; anything else is a plain upstream failure.
pub(crate) async fn check_status(response: Response, provider: &str) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::AuthConfiguration(format!(
            "{} rejected the configured credentials (status {})",
            provider, status
        )),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            AppError::RateLimited(format!("{} (status {})", provider, status))
        }
        _ => AppError::ExternalApi(format!(
            "{} API returned status {}: {}",
            provider, status, body
        )),
    })
}

/// Degrades a non-fatal lookup failure to `None` with a warning.
pub(crate) fn absorb<T>(
    provider: &'static str,
    title: &str,
    result: AppResult<Option<T>>,
) -> AppResult<Option<T>> {
    match result {
        Ok(Some(value)) => Ok(Some(value)),
        Ok(None) => {
            tracing::debug!(title = %title, provider, "No match");
            Ok(None)
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(AppError::RateLimited(detail)) => {
            tracing::warn!(title = %title, provider, detail = %detail, "Rate limited, skipping item");
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(title = %title, provider, error = %e, "Lookup failed, skipping item");
            Ok(None)
        }
    }
}

/// Fails with a configuration error when a required key is unset.
pub(crate) fn require_key<'a>(key: &'a Option<String>, name: &str) -> AppResult<&'a str> {
    key.as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::AuthConfiguration(format!("{} is not set", name)))
}
