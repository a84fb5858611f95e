//! Merges catalog, playtime and storefront data into canonical game records.
//!
//! Single-title flow:
//! 1. Catalog lookup by the user's title
//! 2. Platform: explicit choice, else detected from the catalog entry and the
//!    user's owned platforms
//! 3. Playtime and (PC only) storefront lookups, concurrently, by the
//!    catalog's name when there is one
//! 4. Field-by-field merge
//!
//! The batch flow resolves the whole catalog batch first and spends playtime
//! and storefront calls only on titles the catalog recognised.

use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        CanonicalGame, CatalogEntry, GameList, NewGame, OwnedProduct, Platform, PlaytimeEstimate,
        Rating, StorefrontDetails, StorefrontLink, UserPreferences,
    },
    services::providers::{CatalogProvider, PlaytimeProvider, StorefrontProvider},
};

fn default_list() -> GameList {
    GameList::Backlog
}

/// User-entered game fields, as submitted from an add or edit form
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameDraft {
    pub title: String,
    /// Explicit platform choice; detected when absent
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Target list; new games land in the backlog and edits keep their list
    /// when absent
    #[serde(default)]
    pub list: Option<GameList>,
    /// Custom genres on top of the catalog's
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub rating: Option<Rating>,
    /// The user picked this title from catalog search; the stored title then
    /// follows the catalog's canonical name.
    #[serde(default)]
    pub searching: bool,
}

impl GameDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            platform: None,
            list: None,
            genres: Vec::new(),
            rating: None,
            searching: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default = "default_list")]
    pub list: GameList,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            platform: None,
            list: default_list(),
        }
    }
}

/// Records ready to persist, plus the inputs that had no catalog match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub records: Vec<NewGame>,
    pub failed: Vec<String>,
}

/// Picks a platform for a game from what the catalog says it runs on.
///
/// The favorite platform wins when the game supports it and the user owns it;
/// otherwise the first owned platform (in the user's order) the game supports.
pub fn detect_platform(supported: &[Platform], preferences: &UserPreferences) -> Platform {
    let owned_and_supported = |p: &Platform| preferences.platforms.contains(p) && supported.contains(p);

    preferences
        .favorite_platform
        .filter(owned_and_supported)
        .or_else(|| preferences.platforms.iter().copied().find(owned_and_supported))
        .unwrap_or(Platform::OthersRoms)
}

/// Catalog genres first, then extras not already present (case-insensitive)
pub fn merge_genres(catalog: &[String], extra: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(catalog.len() + extra.len());
    for genre in catalog.iter().chain(extra) {
        let genre = genre.trim();
        if genre.is_empty() {
            continue;
        }
        let lowered = genre.to_lowercase();
        if !merged.iter().any(|g| g.to_lowercase() == lowered) {
            merged.push(genre.to_string());
        }
    }
    merged
}

/// Builds a record from already-resolved source data.
///
/// Absent catalog data leaves the raw title, no image and only the draft's
/// own genres. The time-to-beat service's main-story estimate wins over the
/// catalog's coarse one.
pub fn merge(
    draft: &GameDraft,
    platform: Platform,
    catalog: Option<&CatalogEntry>,
    playtime: PlaytimeEstimate,
    storefront: Option<StorefrontDetails>,
) -> NewGame {
    let title = match catalog {
        Some(entry) if draft.searching => entry.name.clone(),
        _ => draft.title.trim().to_string(),
    };

    let mut record = NewGame::new(title, platform, draft.list.unwrap_or_else(default_list));
    record.rating = draft.rating;
    record.genres = merge_genres(
        catalog.map(|c| c.genres.as_slice()).unwrap_or_default(),
        &draft.genres,
    );
    if let Some(entry) = catalog {
        record.image_url = entry.image_url.clone();
        record.release_date = entry.release_date.clone();
    }
    record.playtime_normally = playtime
        .playtime_normally
        .or_else(|| catalog.and_then(|c| c.base_playtime));
    record.playtime_completely = playtime.playtime_completely;
    record.set_storefront(storefront.map(|s| StorefrontLink {
        product_id: s.product_id,
        compatibility_tier: s.compatibility_tier,
    }));

    record
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    catalog: Arc<dyn CatalogProvider>,
    playtime: Arc<dyn PlaytimeProvider>,
    storefront: Arc<dyn StorefrontProvider>,
}

impl ReconciliationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        playtime: Arc<dyn PlaytimeProvider>,
        storefront: Arc<dyn StorefrontProvider>,
    ) -> Self {
        Self {
            catalog,
            playtime,
            storefront,
        }
    }

    /// Storefront data for one title, with compatibility when requested
    async fn storefront_details(
        &self,
        title: &str,
        with_compatibility: bool,
    ) -> AppResult<Option<StorefrontDetails>> {
        let Some(product) = self.storefront.resolve_product(title).await? else {
            return Ok(None);
        };

        let compatibility_tier = if with_compatibility {
            Some(self.storefront.resolve_compatibility(product.product_id).await)
        } else {
            None
        };

        Ok(Some(StorefrontDetails {
            product_id: product.product_id,
            compatibility_tier,
        }))
    }

    /// Resolves one user-entered title into a full record
    pub async fn reconcile(
        &self,
        draft: &GameDraft,
        preferences: &UserPreferences,
    ) -> AppResult<NewGame> {
        let raw_title = draft.title.trim();
        if raw_title.is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }

        let catalog = self.catalog.resolve_by_title(raw_title).await?;
        let platform = draft.platform.unwrap_or_else(|| {
            detect_platform(
                catalog.as_ref().map(|c| c.platforms.as_slice()).unwrap_or_default(),
                preferences,
            )
        });
        let lookup_name = catalog.as_ref().map(|c| c.name.as_str()).unwrap_or(raw_title);

        let storefront = async {
            if platform == Platform::Pc {
                self.storefront_details(lookup_name, preferences.plays_on_handheld)
                    .await
            } else {
                Ok(None)
            }
        };
        let (playtime, storefront) =
            tokio::try_join!(self.playtime.resolve(lookup_name), storefront)?;

        tracing::info!(
            title = %raw_title,
            matched = catalog.is_some(),
            platform = %platform,
            has_playtime = !playtime.is_empty(),
            has_storefront = storefront.is_some(),
            "Reconciled title"
        );

        Ok(merge(draft, platform, catalog.as_ref(), playtime, storefront))
    }

    /// Applies an edit to an existing game.
    ///
    /// A searching edit re-runs full reconciliation but keeps the game's list,
    /// history and replay count; list changes are applied separately by the
    /// caller. A plain edit replaces title, genres and rating as entered and
    /// never touches catalog-sourced fields. Storefront data is re-resolved
    /// whenever the resulting platform is PC.
    pub async fn reconcile_edit(
        &self,
        existing: &CanonicalGame,
        draft: &GameDraft,
        preferences: &UserPreferences,
    ) -> AppResult<CanonicalGame> {
        let mut updated = existing.clone();

        if draft.searching {
            let mut record = self.reconcile(draft, preferences).await?;
            record.list = existing.record.list;
            record.replay_count = existing.record.replay_count;
            updated.record = record;
            return Ok(updated);
        }

        let title = draft.title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("title must not be empty".to_string()));
        }
        let renamed = title != existing.record.title;

        updated.record.title = title.to_string();
        updated.record.genres = merge_genres(&draft.genres, &[]);
        updated.record.rating = draft.rating;
        if let Some(platform) = draft.platform {
            updated.record.set_platform(platform);
        }

        if updated.platform() == Platform::Pc {
            let fresh = self
                .storefront_details(title, preferences.plays_on_handheld)
                .await?
                .map(|s| StorefrontLink {
                    product_id: s.product_id,
                    compatibility_tier: s.compatibility_tier,
                });
            let kept = if renamed { None } else { existing.record.storefront() };
            updated.record.set_storefront(fresh.or(kept));
        }

        Ok(updated)
    }

    /// Resolves many titles, skipping enrichment for catalog misses
    pub async fn reconcile_batch(
        &self,
        titles: &[String],
        options: BatchOptions,
        preferences: &UserPreferences,
    ) -> AppResult<BatchOutcome> {
        let mut unique: Vec<String> = Vec::with_capacity(titles.len());
        for title in titles {
            let title = title.trim();
            if !title.is_empty() && !unique.iter().any(|t| t == title) {
                unique.push(title.to_string());
            }
        }

        let mut catalog = self.catalog.resolve_batch_by_titles(&unique).await?;

        let mut outcome = BatchOutcome::default();
        let mut resolved: Vec<(CatalogEntry, Platform)> = Vec::new();
        for title in unique {
            match catalog.remove(&title).flatten() {
                Some(entry) => {
                    let platform = options
                        .platform
                        .unwrap_or_else(|| detect_platform(&entry.platforms, preferences));
                    resolved.push((entry, platform));
                }
                None => outcome.failed.push(title),
            }
        }

        let names: Vec<String> = resolved.iter().map(|(e, _)| e.name.clone()).collect();
        let pc_names: Vec<String> = resolved
            .iter()
            .filter(|(_, platform)| *platform == Platform::Pc)
            .map(|(e, _)| e.name.clone())
            .collect();

        let (playtimes, storefront) = tokio::try_join!(
            self.playtime.resolve_batch(&names),
            self.storefront
                .resolve_products(&pc_names, preferences.plays_on_handheld),
        )?;

        outcome.records = resolved
            .iter()
            .map(|(entry, platform)| {
                let draft = GameDraft {
                    title: entry.name.clone(),
                    platform: Some(*platform),
                    list: Some(options.list),
                    genres: Vec::new(),
                    rating: None,
                    searching: true,
                };
                merge(
                    &draft,
                    *platform,
                    Some(entry),
                    playtimes.get(&entry.name).copied().unwrap_or_default(),
                    storefront.get(&entry.name).copied(),
                )
            })
            .collect();

        tracing::info!(
            requested = titles.len(),
            resolved = outcome.records.len(),
            failed = outcome.failed.len(),
            "Batch reconciliation complete"
        );

        Ok(outcome)
    }

    /// Resolves products owned on the storefront into Backlog PC games.
    ///
    /// The product id is already known, so only catalog, playtime and
    /// (optionally) compatibility lookups run.
    pub async fn reconcile_owned(
        &self,
        products: &[OwnedProduct],
        preferences: &UserPreferences,
    ) -> AppResult<BatchOutcome> {
        let names: Vec<String> = products.iter().map(|p| p.name.clone()).collect();
        let catalog = self.catalog.resolve_batch_by_titles(&names).await?;

        let mut outcome = BatchOutcome::default();
        let mut resolved: Vec<(&OwnedProduct, CatalogEntry)> = Vec::new();
        for product in products {
            match catalog.get(&product.name).cloned().flatten() {
                Some(entry) => resolved.push((product, entry)),
                None => outcome.failed.push(product.name.clone()),
            }
        }

        let resolved_names: Vec<String> = resolved.iter().map(|(_, e)| e.name.clone()).collect();
        let product_ids: Vec<u64> = if preferences.plays_on_handheld {
            resolved.iter().map(|(p, _)| p.product_id).collect()
        } else {
            Vec::new()
        };

        let (playtimes, tiers) = tokio::try_join!(
            self.playtime.resolve_batch(&resolved_names),
            self.storefront.resolve_compatibility_batch(&product_ids),
        )?;

        outcome.records = resolved
            .iter()
            .map(|(product, entry)| {
                let draft = GameDraft {
                    title: entry.name.clone(),
                    platform: Some(Platform::Pc),
                    list: Some(GameList::Backlog),
                    genres: Vec::new(),
                    rating: None,
                    searching: true,
                };
                merge(
                    &draft,
                    Platform::Pc,
                    Some(entry),
                    playtimes.get(&entry.name).copied().unwrap_or_default(),
                    Some(StorefrontDetails {
                        product_id: product.product_id,
                        compatibility_tier: tiers.get(&product.product_id).copied(),
                    }),
                )
            })
            .collect();

        Ok(outcome)
    }
}
