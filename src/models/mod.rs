use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod catalog;
pub mod challenge;
pub mod game;
pub mod import;
pub mod recommendation;
pub mod user_preferences;

pub use catalog::{
    seconds_to_hours, CatalogEntry, Discount, OwnedProduct, PlaytimeEstimate, StorefrontDetails,
    StorefrontProduct,
};
pub use challenge::{Challenge, ChallengeIdea, ChallengeStatus};
pub use game::{
    CanonicalGame, CompatibilityTier, GameList, Hours, NewGame, Platform, Rating, StorefrontLink,
};
pub use import::{ImportMode, ImportNotification, ImportRequest, ImportState};
pub use recommendation::{
    Discovery, OracleChallenge, OracleGame, OraclePreferences, OracleRequest, RawDiscovery,
    RawSuggestion, Suggestion,
};
pub use user_preferences::{UserPreferences, UserProfile};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random identifier
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque game identifier, assigned by the store on creation
    GameId
);
string_id!(
    /// Opaque challenge identifier
    ChallengeId
);
string_id!(
    /// Owner of a per-user collection
    UserId
);
