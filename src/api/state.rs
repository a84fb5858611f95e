use std::sync::Arc;

use crate::{
    db::GameStore,
    services::{
        clock::Clock,
        providers::{CatalogProvider, PlaytimeProvider, StorefrontProvider},
        ImportService, LibraryService, RecommendationAssembler, RecommendationOracle,
        ReconciliationEngine,
    },
};

/// External collaborators the services are built from
pub struct Collaborators {
    pub store: Arc<dyn GameStore>,
    pub catalog: Arc<dyn CatalogProvider>,
    pub playtime: Arc<dyn PlaytimeProvider>,
    pub storefront: Arc<dyn StorefrontProvider>,
    pub oracle: Arc<dyn RecommendationOracle>,
    pub clock: Arc<dyn Clock>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<LibraryService>,
    pub imports: Arc<ImportService>,
    pub recommendations: Arc<RecommendationAssembler>,
    pub store: Arc<dyn GameStore>,
}

impl AppState {
    pub fn new(deps: Collaborators) -> Self {
        let engine = ReconciliationEngine::new(deps.catalog, deps.playtime, deps.storefront.clone());

        Self {
            library: Arc::new(LibraryService::new(
                deps.store.clone(),
                engine.clone(),
                deps.storefront.clone(),
                deps.clock.clone(),
            )),
            imports: Arc::new(ImportService::new(
                deps.store.clone(),
                engine,
                deps.storefront,
                deps.clock,
            )),
            recommendations: Arc::new(RecommendationAssembler::new(
                deps.store.clone(),
                deps.oracle,
            )),
            store: deps.store,
        }
    }
}
