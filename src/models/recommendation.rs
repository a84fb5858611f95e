use serde::{Deserialize, Serialize};

use super::{CanonicalGame, Challenge, CompatibilityTier, GameId, Platform, UserPreferences};

// ============================================================================
// Oracle request
// ============================================================================

/// Library entry as the oracle sees it
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OracleGame {
    pub id: GameId,
    pub title: String,
    pub platform: String,
    pub genres: Vec<String>,
    pub list: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playtime_normally: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playtime_completely: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_tier: Option<CompatibilityTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    pub date_added: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_completed: Option<String>,
    pub replay_count: u32,
}

impl From<&CanonicalGame> for OracleGame {
    fn from(game: &CanonicalGame) -> Self {
        let record = &game.record;
        Self {
            id: game.id.clone(),
            title: record.title.clone(),
            platform: record.platform().display_name().to_string(),
            genres: record.genres.clone(),
            list: record.list.to_string(),
            rating: record.rating.map(|r| r.value()),
            playtime_normally: record.playtime_normally.map(|h| h.get()),
            playtime_completely: record.playtime_completely.map(|h| h.get()),
            compatibility_tier: record.storefront().and_then(|s| s.compatibility_tier),
            release_date: record.release_date.clone(),
            date_added: game.date_added.to_rfc3339(),
            date_completed: game.date_completed.map(|d| d.to_rfc3339()),
            replay_count: record.replay_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OracleChallenge {
    pub title: String,
    pub description: String,
    pub goal: u32,
    pub progress: u32,
}

impl From<&Challenge> for OracleChallenge {
    fn from(challenge: &Challenge) -> Self {
        Self {
            title: challenge.title.clone(),
            description: challenge.description.clone(),
            goal: challenge.goal,
            progress: challenge.progress,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OraclePreferences {
    pub platforms: Vec<String>,
    pub track_completionist_playtime: bool,
    pub plays_on_handheld: bool,
}

impl From<&UserPreferences> for OraclePreferences {
    fn from(prefs: &UserPreferences) -> Self {
        Self {
            platforms: prefs
                .platforms
                .iter()
                .map(|p: &Platform| p.display_name().to_string())
                .collect(),
            track_completionist_playtime: prefs.track_completionist_playtime,
            plays_on_handheld: prefs.plays_on_handheld,
        }
    }
}

/// Complete, self-consistent snapshot handed to the oracle
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub game_library: Vec<OracleGame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_challenges: Option<Vec<OracleChallenge>>,
    pub user_preferences: OraclePreferences,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood_text: Option<String>,
}

// ============================================================================
// Oracle responses (untrusted)
// ============================================================================

/// Suggestion as returned by the oracle; the id may not exist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawSuggestion {
    pub game_id: String,
    pub reason: String,
}

/// A game outside the library proposed by the oracle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawDiscovery {
    pub title: String,
    pub reason: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

// ============================================================================
// Validated results
// ============================================================================

/// A suggestion mapped back onto a library record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Suggestion {
    pub game: CanonicalGame,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    pub title: String,
    pub reason: String,
    pub genres: Vec<String>,
    /// Set when the oracle proposed a title already in the library
    pub low_confidence: bool,
}
