pub mod batch;
pub mod challenges;
pub mod clock;
pub mod credentials;
pub mod import;
pub mod library;
pub mod providers;
pub mod reconciliation;
pub mod recommendations;

pub use import::ImportService;
pub use library::LibraryService;
pub use reconciliation::ReconciliationEngine;
pub use recommendations::{HttpOracle, RecommendationAssembler, RecommendationOracle};
