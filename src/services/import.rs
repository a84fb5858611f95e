//! Detached bulk import.
//!
//! `start` records a `pending` status and returns at once; the import itself
//! runs on its own task and reports only through the per-user status record.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{
    db::{GameStore, WriteBatch, WriteOp},
    error::{AppError, AppResult},
    models::{
        ImportMode, ImportNotification, ImportRequest, ImportState, OwnedProduct, Platform, UserId,
        UserPreferences,
    },
    services::{
        clock::Clock,
        providers::StorefrontProvider,
        reconciliation::{BatchOptions, BatchOutcome, ReconciliationEngine},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        format!(
            "Imported {} games. Failed to find data for {} games.",
            self.imported, self.failed
        )
    }
}

/// A pending status this old belongs to an import that never reported back
const STALE_PENDING_MINUTES: i64 = 30;

pub struct ImportService {
    store: Arc<dyn GameStore>,
    engine: ReconciliationEngine,
    storefront: Arc<dyn StorefrontProvider>,
    clock: Arc<dyn Clock>,
}

impl ImportService {
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

    fn notification(&self, status: ImportState, message: impl Into<String>) -> ImportNotification {
        ImportNotification {
            status,
            message: message.into(),
            timestamp: self.clock.now(),
        }
    }

    fn stale_before(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now() - chrono::Duration::minutes(STALE_PENDING_MINUTES)
    }

    /// Reports a stale pending status as failed, e.g. after a restart killed
    /// the import task.
    fn settle(&self, status: ImportNotification) -> ImportNotification {
        if status.status == ImportState::Pending && !status.is_in_progress(self.stale_before()) {
            return ImportNotification {
                status: ImportState::Failed,
                message: "Import was interrupted before it finished".to_string(),
                ..status
            };
        }
        status
    }

    async fn write_status(&self, user: &UserId, status: ImportNotification) -> AppResult<()> {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetImportStatus(status));
        self.store.commit(user, batch).await?;
        Ok(())
    }

    /// Validates the request, marks the import pending and spawns it.
    ///
    /// Errors here are synchronous. Once this returns, the outcome is only
    /// visible through [`ImportService::status`].
    pub async fn start(
        self: &Arc<Self>,
        user: &UserId,
        request: ImportRequest,
    ) -> AppResult<JoinHandle<()>> {
        match &request {
            ImportRequest::Titles { titles } if titles.iter().all(|t| t.trim().is_empty()) => {
                return Err(AppError::InvalidInput("no titles given".to_string()));
            }
            ImportRequest::StorefrontAccount { account, .. } if account.trim().is_empty() => {
                return Err(AppError::InvalidInput("account must not be empty".to_string()));
            }
            _ => {}
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::BeginImport {
            status: self.notification(ImportState::Pending, "Import started"),
            stale_before: self.stale_before(),
        });
        self.store.commit(user, batch).await?;
        tracing::info!(user = %user, "Import started");

        let service = Arc::clone(self);
        let user = user.clone();
        Ok(tokio::spawn(async move {
            service.run(&user, request).await;
        }))
    }

    async fn run(&self, user: &UserId, request: ImportRequest) {
        let status = match self.import(user, request).await {
            Ok(summary) => {
                tracing::info!(
                    user = %user,
                    imported = summary.imported,
                    failed = summary.failed,
                    "Import completed"
                );
                self.notification(ImportState::Completed, summary.message())
            }
            Err(e) => {
                tracing::error!(user = %user, error = %e, "Import failed");
                self.notification(ImportState::Failed, e.to_string())
            }
        };

        if let Err(e) = self.write_status(user, status).await {
            tracing::error!(user = %user, error = %e, "Failed to record import outcome");
        }
    }

    async fn import(&self, user: &UserId, request: ImportRequest) -> AppResult<ImportSummary> {
        let preferences = self.store.profile(user).await?.preferences;

        let mut batch = WriteBatch::new();
        let outcome = match request {
            ImportRequest::Titles { titles } => {
                self.engine
                    .reconcile_batch(&titles, BatchOptions::default(), &preferences)
                    .await?
            }
            ImportRequest::StorefrontAccount { account, mode } => {
                self.import_account(user, &account, mode, &preferences, &mut batch)
                    .await?
            }
        };

        let now = self.clock.now();
        batch.add_genres(
            outcome
                .records
                .iter()
                .flat_map(|r| r.genres.iter().cloned())
                .collect(),
        );
        let imported = outcome.records.len();
        for record in outcome.records {
            batch.create_game(record, now);
        }

        if !batch.is_empty() {
            self.store.commit(user, batch).await?;
        }

        Ok(ImportSummary {
            imported,
            failed: outcome.failed.len(),
        })
    }

    /// Resolves the account's owned products. In `Full` mode the existing PC
    /// games are queued for deletion in `batch`.
    async fn import_account(
        &self,
        user: &UserId,
        account: &str,
        mode: ImportMode,
        preferences: &UserPreferences,
        batch: &mut WriteBatch,
    ) -> AppResult<BatchOutcome> {
        let account_id = self.storefront.resolve_account(account).await?;
        let owned = self.storefront.owned_products(&account_id).await?;
        let snapshot = self.store.snapshot(user).await?;

        let products: Vec<OwnedProduct> = match mode {
            ImportMode::New => {
                let existing: HashSet<u64> =
                    snapshot.games.iter().filter_map(|g| g.product_id()).collect();
                owned
                    .into_iter()
                    .filter(|p| !existing.contains(&p.product_id))
                    .collect()
            }
            ImportMode::Full => {
                for game in snapshot.games.iter().filter(|g| g.platform() == Platform::Pc) {
                    batch.delete_game(game.id.clone());
                }
                owned
            }
        };

        tracing::info!(
            user = %user,
            account = %account_id,
            products = products.len(),
            mode = ?mode,
            "Resolving owned products"
        );

        self.engine.reconcile_owned(&products, preferences).await
    }

    pub async fn status(&self, user: &UserId) -> AppResult<Option<ImportNotification>> {
        Ok(self
            .store
            .import_status(user)
            .await?
            .map(|status| self.settle(status)))
    }

    /// Marks the current status as seen
    pub async fn acknowledge(&self, user: &UserId) -> AppResult<ImportNotification> {
        let current = self
            .status(user)
            .await?
            .ok_or_else(|| AppError::NotFound("no import status".to_string()))?;

        if current.status == ImportState::Pending {
            return Err(AppError::InvalidInput(
                "an import still in progress cannot be acknowledged".to_string(),
            ));
        }

        let acknowledged = ImportNotification {
            status: ImportState::Acknowledged,
            ..current
        };
        self.write_status(user, acknowledged.clone()).await?;
        Ok(acknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{CatalogEntry, GameList, NewGame, StorefrontLink};
    use crate::services::clock::fake::FixedClock;
    use crate::services::providers::{MockCatalogProvider, MockPlaytimeProvider, MockStorefrontProvider};
    use chrono::Utc;
    use std::collections::HashMap;

    fn catalog_knowing(known: &'static [&'static str]) -> MockCatalogProvider {
        let mut catalog = MockCatalogProvider::new();
        catalog.expect_resolve_batch_by_titles().returning(move |titles| {
            Ok(titles
                .iter()
                .map(|t| {
                    let hit = known.contains(&t.as_str()).then(|| CatalogEntry {
                        id: 1,
                        name: t.clone(),
                        image_url: None,
                        genres: vec!["Adventure".to_string()],
                        release_date: None,
                        base_playtime: None,
                        platforms: vec![Platform::Pc],
                    });
                    (t.clone(), hit)
                })
                .collect())
        });
        catalog
    }

    fn quiet_playtime() -> MockPlaytimeProvider {
        let mut playtime = MockPlaytimeProvider::new();
        playtime
            .expect_resolve_batch()
            .returning(|_| Ok(HashMap::new()));
        playtime
    }

    fn service(
        store: Arc<MemoryStore>,
        catalog: MockCatalogProvider,
        storefront: MockStorefrontProvider,
    ) -> Arc<ImportService> {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        service_at(store, catalog, storefront, clock)
    }

    fn service_at(
        store: Arc<MemoryStore>,
        catalog: MockCatalogProvider,
        storefront: MockStorefrontProvider,
        clock: Arc<FixedClock>,
    ) -> Arc<ImportService> {
        let storefront: Arc<dyn StorefrontProvider> = Arc::new(storefront);
        let engine = ReconciliationEngine::new(
            Arc::new(catalog),
            Arc::new(quiet_playtime()),
            storefront.clone(),
        );
        Arc::new(ImportService::new(
            store,
            engine,
            storefront,
            clock,
        ))
    }

    fn account_storefront(owned: Vec<OwnedProduct>) -> MockStorefrontProvider {
        let mut storefront = MockStorefrontProvider::new();
        storefront
            .expect_resolve_account()
            .returning(|_| Ok("76561197960287930".to_string()));
        storefront
            .expect_owned_products()
            .returning(move |_| Ok(owned.clone()));
        storefront
            .expect_resolve_products()
            .returning(|_, _| Ok(HashMap::new()));
        storefront
            .expect_resolve_compatibility_batch()
            .returning(|_| Ok(HashMap::new()));
        storefront
    }

    fn owned(product_id: u64, name: &str) -> OwnedProduct {
        OwnedProduct {
            product_id,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_title_import_reports_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut storefront = MockStorefrontProvider::new();
        storefront
            .expect_resolve_products()
            .returning(|_, _| Ok(HashMap::new()));
        let imports = service(store.clone(), catalog_knowing(&["Outer Wilds"]), storefront);
        let user = UserId::from("u1");

        let handle = imports
            .start(
                &user,
                ImportRequest::Titles {
                    titles: vec!["Outer Wilds".to_string(), "zzzz".to_string()],
                },
            )
            .await
            .unwrap();
        handle.await.unwrap();

        let status = imports.status(&user).await.unwrap().unwrap();
        assert_eq!(status.status, ImportState::Completed);
        assert_eq!(
            status.message,
            "Imported 1 games. Failed to find data for 1 games."
        );
        assert_eq!(store.snapshot(&user).await.unwrap().games.len(), 1);
    }

    #[tokio::test]
    async fn test_new_mode_skips_owned_products_already_in_library() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::from("u1");
        let mut existing = NewGame::new("Portal 2", Platform::Pc, GameList::RecentlyPlayed);
        existing.set_storefront(Some(StorefrontLink {
            product_id: 620,
            compatibility_tier: None,
        }));
        let mut batch = WriteBatch::new();
        batch.create_game(existing, Utc::now());
        store.commit(&user, batch).await.unwrap();

        let storefront = account_storefront(vec![owned(620, "Portal 2"), owned(400, "Portal")]);
        let imports = service(store.clone(), catalog_knowing(&["Portal 2", "Portal"]), storefront);

        imports
            .start(
                &user,
                ImportRequest::StorefrontAccount {
                    account: "https://steamcommunity.com/id/gabe".to_string(),
                    mode: ImportMode::New,
                },
            )
            .await
            .unwrap()
            .await
            .unwrap();

        let snapshot = store.snapshot(&user).await.unwrap();
        assert_eq!(snapshot.games.len(), 2);
        let portal_2 = snapshot
            .games
            .iter()
            .find(|g| g.product_id() == Some(620))
            .unwrap();
        assert_eq!(portal_2.record.list, GameList::RecentlyPlayed);
        assert_eq!(
            imports.status(&user).await.unwrap().unwrap().message,
            "Imported 1 games. Failed to find data for 0 games."
        );
    }

    #[tokio::test]
    async fn test_full_mode_replaces_pc_games_only() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::from("u1");
        let mut batch = WriteBatch::new();
        batch
            .create_game(NewGame::new("Old PC Game", Platform::Pc, GameList::Backlog), Utc::now())
            .create_game(NewGame::new("Zelda", Platform::NintendoSwitch, GameList::Backlog), Utc::now());
        store.commit(&user, batch).await.unwrap();

        let storefront = account_storefront(vec![owned(400, "Portal")]);
        let imports = service(store.clone(), catalog_knowing(&["Portal"]), storefront);

        imports
            .start(
                &user,
                ImportRequest::StorefrontAccount {
                    account: "76561197960287930".to_string(),
                    mode: ImportMode::Full,
                },
            )
            .await
            .unwrap()
            .await
            .unwrap();

        let mut titles: Vec<String> = store
            .snapshot(&user)
            .await
            .unwrap()
            .games
            .into_iter()
            .map(|g| g.record.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Portal", "Zelda"]);
    }

    #[tokio::test]
    async fn test_configuration_error_becomes_failed_status() {
        let store = Arc::new(MemoryStore::new());
        let mut storefront = MockStorefrontProvider::new();
        storefront.expect_resolve_account().returning(|_| {
            Err(AppError::AuthConfiguration(
                "STOREFRONT_WEB_API_KEY is not set".to_string(),
            ))
        });
        let imports = service(store.clone(), MockCatalogProvider::new(), storefront);
        let user = UserId::from("u1");

        imports
            .start(
                &user,
                ImportRequest::StorefrontAccount {
                    account: "gabe".to_string(),
                    mode: ImportMode::New,
                },
            )
            .await
            .unwrap()
            .await
            .unwrap();

        let status = imports.status(&user).await.unwrap().unwrap();
        assert_eq!(status.status, ImportState::Failed);
        assert!(status.message.contains("STOREFRONT_WEB_API_KEY"));
        assert!(store.snapshot(&user).await.unwrap().games.is_empty());

        let acknowledged = imports.acknowledge(&user).await.unwrap();
        assert_eq!(acknowledged.status, ImportState::Acknowledged);
        assert_eq!(acknowledged.message, status.message);
    }

    #[tokio::test]
    async fn test_start_rejects_empty_input_and_concurrent_imports() {
        let store = Arc::new(MemoryStore::new());
        let imports = service(
            store.clone(),
            MockCatalogProvider::new(),
            MockStorefrontProvider::new(),
        );
        let user = UserId::from("u1");

        let empty = imports
            .start(&user, ImportRequest::Titles { titles: vec![" ".to_string()] })
            .await;
        assert!(matches!(empty, Err(AppError::InvalidInput(_))));

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetImportStatus(ImportNotification {
            status: ImportState::Pending,
            message: "Import started".to_string(),
            timestamp: Utc::now(),
        }));
        store.commit(&user, batch).await.unwrap();

        let second = imports
            .start(&user, ImportRequest::Titles { titles: vec!["Hades".to_string()] })
            .await;
        assert!(matches!(second, Err(AppError::InvalidInput(_))));
        assert!(imports.acknowledge(&user).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_pending_import_no_longer_blocks() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let mut storefront = MockStorefrontProvider::new();
        storefront
            .expect_resolve_products()
            .returning(|_, _| Ok(HashMap::new()));
        let imports = service_at(
            store.clone(),
            catalog_knowing(&["Hades"]),
            storefront,
            clock.clone(),
        );
        let user = UserId::from("u1");

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetImportStatus(ImportNotification {
            status: ImportState::Pending,
            message: "Import started".to_string(),
            timestamp: clock.now(),
        }));
        store.commit(&user, batch).await.unwrap();

        let titles = || ImportRequest::Titles {
            titles: vec!["Hades".to_string()],
        };
        assert!(matches!(
            imports.start(&user, titles()).await,
            Err(AppError::InvalidInput(_))
        ));

        clock.advance(chrono::Duration::minutes(STALE_PENDING_MINUTES + 1));

        let interrupted = imports.status(&user).await.unwrap().unwrap();
        assert_eq!(interrupted.status, ImportState::Failed);
        let acknowledged = imports.acknowledge(&user).await.unwrap();
        assert_eq!(acknowledged.status, ImportState::Acknowledged);

        // A leftover from a crashed run is taken over by the next start.
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetImportStatus(ImportNotification {
            status: ImportState::Pending,
            message: "Import started".to_string(),
            timestamp: clock.now() - chrono::Duration::minutes(STALE_PENDING_MINUTES + 1),
        }));
        store.commit(&user, batch).await.unwrap();

        imports.start(&user, titles()).await.unwrap().await.unwrap();
        let status = imports.status(&user).await.unwrap().unwrap();
        assert_eq!(status.status, ImportState::Completed);
        assert_eq!(store.snapshot(&user).await.unwrap().games.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_starts_admit_one_import() {
        let store = Arc::new(MemoryStore::new());
        let mut storefront = MockStorefrontProvider::new();
        storefront
            .expect_resolve_products()
            .returning(|_, _| Ok(HashMap::new()));
        let imports = service(store.clone(), catalog_knowing(&["Hades"]), storefront);
        let user = UserId::from("u1");
        let titles = || ImportRequest::Titles {
            titles: vec!["Hades".to_string()],
        };

        let (first, second) = tokio::join!(
            imports.start(&user, titles()),
            imports.start(&user, titles())
        );

        let started: Vec<JoinHandle<()>> = [first, second].into_iter().flatten().collect();
        assert_eq!(started.len(), 1);
        for handle in started {
            handle.await.unwrap();
        }
        assert_eq!(store.snapshot(&user).await.unwrap().games.len(), 1);
    }
}
