use serde::Serialize;
use std::sync::Arc;

use crate::{
    db::{GameStore, LibrarySnapshot, WriteBatch, WriteOp},
    error::{AppError, AppResult},
    models::{
        CanonicalGame, Challenge, ChallengeIdea, CompatibilityTier, Discount, GameId, GameList,
        Platform, StorefrontLink, UserId, UserPreferences,
    },
    services::{
        challenges::{record_completion, Vocabulary},
        clock::Clock,
        providers::StorefrontProvider,
        reconciliation::{BatchOptions, GameDraft, ReconciliationEngine},
    },
};

/// Result of a list move: the game plus any challenges it advanced
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MoveOutcome {
    pub game: CanonicalGame,
    pub challenges: Vec<Challenge>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchAddReport {
    pub added: Vec<CanonicalGame>,
    pub failed: Vec<String>,
}

/// A wishlisted PC game that is currently discounted
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Deal {
    pub game: CanonicalGame,
    pub discount: Discount,
}

/// Game lifecycle operations over one user's library
pub struct LibraryService {
    store: Arc<dyn GameStore>,
    engine: ReconciliationEngine,
    storefront: Arc<dyn StorefrontProvider>,
    clock: Arc<dyn Clock>,
}

impl LibraryService {
    pub fn new(
        store: Arc<dyn GameStore>,
        engine: ReconciliationEngine,
        storefront: Arc<dyn StorefrontProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            storefront,
            clock,
        }
    }

    pub async fn snapshot(&self, user: &UserId) -> AppResult<LibrarySnapshot> {
        self.store.snapshot(user).await
    }

    pub async fn game(&self, user: &UserId, id: &GameId) -> AppResult<CanonicalGame> {
        self.store.game(user, id).await
    }

    pub async fn add_game(&self, user: &UserId, draft: GameDraft) -> AppResult<CanonicalGame> {
        let profile = self.store.profile(user).await?;
        let record = self.engine.reconcile(&draft, &profile.preferences).await?;
        let now = self.clock.now();

        let mut batch = WriteBatch::new();
        batch
            .add_genres(record.genres.clone())
            .create_game(record.clone(), now);
        let receipt = self.store.commit(user, batch).await?;

        let id = receipt
            .games
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("store returned no id for new game".to_string()))?;

        tracing::info!(user = %user, game = %id, title = %record.title, "Game added");
        Ok(CanonicalGame::from_new(id, record, now))
    }

    pub async fn edit_game(
        &self,
        user: &UserId,
        id: &GameId,
        draft: GameDraft,
    ) -> AppResult<MoveOutcome> {
        let snapshot = self.store.snapshot(user).await?;
        let existing = snapshot
            .game(id)
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))?;
        let profile = self.store.profile(user).await?;

        let mut game = self
            .engine
            .reconcile_edit(existing, &draft, &profile.preferences)
            .await?;

        let now = self.clock.now();
        let completed = match draft.list {
            Some(list) => game.move_to(list, now),
            None => false,
        };
        let challenges = if completed {
            let vocabulary = Vocabulary::from_library(&snapshot.games, &profile);
            record_completion(&snapshot.challenges, &game, &vocabulary, now)
        } else {
            Vec::new()
        };

        let mut batch = WriteBatch::new();
        batch
            .add_genres(game.record.genres.clone())
            .update_game(game.clone());
        for challenge in &challenges {
            batch.update_challenge(challenge.clone());
        }
        self.store.commit(user, batch).await?;

        Ok(MoveOutcome { game, challenges })
    }

    /// Moves a game between lists.
    ///
    /// Entering Recently Played is a completion event: challenge progress from
    /// it commits in the same batch as the game.
    pub async fn move_game(
        &self,
        user: &UserId,
        id: &GameId,
        list: GameList,
    ) -> AppResult<MoveOutcome> {
        let snapshot = self.store.snapshot(user).await?;
        let mut game = snapshot
            .game(id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("game {}", id)))?;

        if game.record.list == list {
            return Ok(MoveOutcome {
                game,
                challenges: Vec::new(),
            });
        }

        let now = self.clock.now();
        let completed = game.move_to(list, now);

        let challenges = if completed {
            let profile = self.store.profile(user).await?;
            let vocabulary = Vocabulary::from_library(&snapshot.games, &profile);
            record_completion(&snapshot.challenges, &game, &vocabulary, now)
        } else {
            Vec::new()
        };

        let mut batch = WriteBatch::new();
        batch.update_game(game.clone());
        for challenge in &challenges {
            batch.update_challenge(challenge.clone());
        }
        self.store.commit(user, batch).await?;

        tracing::info!(
            user = %user,
            game = %game.id,
            list = %list,
            challenges_updated = challenges.len(),
            "Game moved"
        );

        Ok(MoveOutcome { game, challenges })
    }

    pub async fn delete_game(&self, user: &UserId, id: &GameId) -> AppResult<()> {
        self.store.game(user, id).await?;

        let mut batch = WriteBatch::new();
        batch.delete_game(id.clone());
        self.store.commit(user, batch).await?;

        tracing::info!(user = %user, game = %id, "Game deleted");
        Ok(())
    }

    /// Adds every title the catalog recognises in one atomic write
    pub async fn batch_add(
        &self,
        user: &UserId,
        titles: &[String],
        options: BatchOptions,
    ) -> AppResult<BatchAddReport> {
        if titles.iter().all(|t| t.trim().is_empty()) {
            return Err(AppError::InvalidInput("no titles given".to_string()));
        }

        let profile = self.store.profile(user).await?;
        let outcome = self
            .engine
            .reconcile_batch(titles, options, &profile.preferences)
            .await?;

        if outcome.records.is_empty() {
            return Ok(BatchAddReport {
                added: Vec::new(),
                failed: outcome.failed,
            });
        }

        let now = self.clock.now();
        let mut batch = WriteBatch::new();
        batch.add_genres(
            outcome
                .records
                .iter()
                .flat_map(|r| r.genres.iter().cloned())
                .collect(),
        );
        for record in &outcome.records {
            batch.create_game(record.clone(), now);
        }
        let receipt = self.store.commit(user, batch).await?;

        let added: Vec<CanonicalGame> = receipt
            .games
            .into_iter()
            .zip(outcome.records)
            .map(|(id, record)| CanonicalGame::from_new(id, record, now))
            .collect();

        tracing::info!(
            user = %user,
            added = added.len(),
            failed = outcome.failed.len(),
            "Batch add complete"
        );

        Ok(BatchAddReport {
            added,
            failed: outcome.failed,
        })
    }

    /// Appends a custom genre and returns the whole vocabulary
    pub async fn add_genre(&self, user: &UserId, genre: &str) -> AppResult<Vec<String>> {
        let genre = genre.trim();
        if genre.is_empty() {
            return Err(AppError::InvalidInput("genre must not be empty".to_string()));
        }

        let mut batch = WriteBatch::new();
        batch.add_genres(vec![genre.to_string()]);
        self.store.commit(user, batch).await?;

        Ok(self.store.profile(user).await?.genres)
    }

    pub async fn genres(&self, user: &UserId) -> AppResult<Vec<String>> {
        Ok(self.store.profile(user).await?.genres)
    }

    pub async fn add_challenge(&self, user: &UserId, idea: ChallengeIdea) -> AppResult<Challenge> {
        if idea.title.trim().is_empty() {
            return Err(AppError::InvalidInput("challenge title must not be empty".to_string()));
        }
        if idea.goal == 0 {
            return Err(AppError::InvalidInput("challenge goal must be at least 1".to_string()));
        }

        let now = self.clock.now();
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::CreateChallenge {
            idea: idea.clone(),
            created_at: now,
        });
        let receipt = self.store.commit(user, batch).await?;

        let id = receipt.challenges.into_iter().next().ok_or_else(|| {
            AppError::Internal("store returned no id for new challenge".to_string())
        })?;
        Ok(Challenge::new(id, idea, now))
    }

    /// Discounted games from the wishlist
    pub async fn find_deals(&self, user: &UserId) -> AppResult<Vec<Deal>> {
        let snapshot = self.store.snapshot(user).await?;
        let wishlist: Vec<&CanonicalGame> = snapshot
            .games
            .iter()
            .filter(|g| g.record.list == GameList::Wishlist && g.product_id().is_some())
            .collect();

        if wishlist.is_empty() {
            return Ok(Vec::new());
        }

        let mut product_ids: Vec<u64> = wishlist.iter().filter_map(|g| g.product_id()).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let mut discounts = self.storefront.resolve_discounts(&product_ids).await;

        Ok(wishlist
            .into_iter()
            .filter_map(|game| {
                let discount = game.product_id().and_then(|id| discounts.remove(&id))?;
                Some(Deal {
                    game: game.clone(),
                    discount,
                })
            })
            .collect())
    }

    /// Re-queries compatibility for every PC game with a product id.
    ///
    /// Only changed tiers are written. An `Unknown` answer never replaces a
    /// known tier. Returns the number of games updated.
    pub async fn refresh_compatibility(&self, user: &UserId) -> AppResult<usize> {
        let snapshot = self.store.snapshot(user).await?;
        let pc_games: Vec<&CanonicalGame> = snapshot
            .games
            .iter()
            .filter(|g| g.platform() == Platform::Pc && g.product_id().is_some())
            .collect();

        let mut product_ids: Vec<u64> = pc_games.iter().filter_map(|g| g.product_id()).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let tiers = self
            .storefront
            .resolve_compatibility_batch(&product_ids)
            .await?;

        let mut batch = WriteBatch::new();
        for game in pc_games {
            let Some(link) = game.record.storefront() else {
                continue;
            };
            let Some(&tier) = tiers.get(&link.product_id) else {
                continue;
            };
            let unknown = tier == CompatibilityTier::Unknown;
            if link.compatibility_tier == Some(tier) || (unknown && link.compatibility_tier.is_some()) {
                continue;
            }

            let mut updated = game.clone();
            updated.record.set_storefront(Some(StorefrontLink {
                product_id: link.product_id,
                compatibility_tier: Some(tier),
            }));
            batch.update_game(updated);
        }

        let changed = batch.len();
        if !batch.is_empty() {
            self.store.commit(user, batch).await?;
        }

        tracing::info!(user = %user, checked = product_ids.len(), changed, "Compatibility refreshed");
        Ok(changed)
    }

    pub async fn preferences(&self, user: &UserId) -> AppResult<UserPreferences> {
        Ok(self.store.profile(user).await?.preferences)
    }

    pub async fn set_preferences(
        &self,
        user: &UserId,
        preferences: UserPreferences,
    ) -> AppResult<UserPreferences> {
        if let Some(favorite) = preferences.favorite_platform {
            if !preferences.platforms.contains(&favorite) {
                return Err(AppError::InvalidInput(format!(
                    "favorite platform {} is not among the owned platforms",
                    favorite
                )));
            }
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetPreferences(preferences.clone()));
        self.store.commit(user, batch).await?;

        Ok(preferences)
    }
}
