use serde::{Deserialize, Serialize};

use super::Platform;

/// Per-user platform and feature preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Platforms the user owns
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub favorite_platform: Option<Platform>,
    #[serde(default)]
    pub notify_discounts: bool,
    /// Whether compatibility tiers for the handheld PC should be looked up
    #[serde(default)]
    pub plays_on_handheld: bool,
    #[serde(default)]
    pub track_completionist_playtime: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self::new()
    }
}

impl UserPreferences {
    /// Creates empty user preferences
    pub fn new() -> Self {
        Self {
            platforms: Vec::new(),
            favorite_platform: None,
            notify_discounts: false,
            plays_on_handheld: false,
            track_completionist_playtime: false,
        }
    }

    /// Adds an owned platform
    pub fn add_platform(&mut self, platform: Platform) {
        if !self.platforms.contains(&platform) {
            self.platforms.push(platform);
        }
    }
}

/// Per-user profile document: preferences plus the custom genre vocabulary
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub preferences: UserPreferences,
    /// Append-only, case-insensitively unique
    #[serde(default)]
    pub genres: Vec<String>,
}

impl UserProfile {
    /// Appends genres not already present (case-insensitive). Returns how many were added.
    pub fn add_genres<I, S>(&mut self, genres: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for genre in genres {
            let genre = genre.as_ref().trim();
            if genre.is_empty() {
                continue;
            }
            let lowered = genre.to_lowercase();
            if !self.genres.iter().any(|g| g.to_lowercase() == lowered) {
                self.genres.push(genre.to_string());
                added += 1;
            }
        }
        added
    }
}
